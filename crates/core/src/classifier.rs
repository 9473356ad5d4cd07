use async_trait::async_trait;
use tracing::debug;

use crate::domain::Intent;
use crate::errors::ClassificationError;

/// Language-model side of intent classification: returns a raw label.
#[async_trait]
pub trait IntentModel: Send + Sync {
    async fn classify(&self, query: &str) -> Result<String, ClassificationError>;
}

/// Classifies `query` into the closed label set. A collaborator error is
/// fatal; an unrecognised label is not and degrades to `Multiple`.
pub async fn classify_intent(
    model: &dyn IntentModel,
    request_id: &str,
    query: &str,
) -> Result<Intent, ClassificationError> {
    let label = model.classify(query).await?;
    let intent = Intent::from_label(&label);

    if intent == Intent::Multiple && !label.trim().eq_ignore_ascii_case("multiple") {
        debug!(
            event_name = "classifier.label_degraded",
            correlation_id = request_id,
            raw_label = %label.trim(),
            "unrecognised intent label routed to all resolvers"
        );
    }

    Ok(intent)
}
