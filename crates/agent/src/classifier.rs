//! Intent classification collaborators: the model-backed one and the offline
//! keyword heuristic.

use std::sync::Arc;

use async_trait::async_trait;
use triage_core::classifier::IntentModel;
use triage_core::domain::Intent;
use triage_core::errors::ClassificationError;

use crate::llm::LlmClient;

const CLASSIFIER_SYSTEM_PROMPT: &str = "You route customer-support questions. \
Reply with exactly one word from this list: catalog, order, payment, multiple. \
Use catalog for product questions, order for shipping and delivery, payment for \
charges and refunds, and multiple when the question spans more than one of these.";

/// Asks the model for a single label. Normalisation of the reply happens in
/// the core, so any text the model returns is passed through.
#[derive(Clone)]
pub struct LlmIntentModel {
    client: Arc<dyn LlmClient>,
}

impl LlmIntentModel {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntentModel for LlmIntentModel {
    async fn classify(&self, query: &str) -> Result<String, ClassificationError> {
        self.client.complete(CLASSIFIER_SYSTEM_PROMPT, query).await.map_err(|error| {
            ClassificationError::new(format!("{} request failed: {error:#}", self.client.provider()))
        })
    }
}

const CATALOG_KEYWORDS: &[&str] = &[
    "product", "products", "price", "cost", "costs", "stock", "available", "availability",
    "size", "colour", "color", "warranty", "spec", "specs", "model",
];
const ORDER_KEYWORDS: &[&str] = &[
    "order", "orders", "delivery", "deliver", "delivered", "shipping", "shipped", "ship",
    "tracking", "track", "arrive", "arrived", "late", "delayed", "delay", "package", "parcel",
];
const PAYMENT_KEYWORDS: &[&str] = &[
    "payment", "pay", "paid", "charge", "charged", "refund", "refunded", "card", "billing",
    "billed", "invoice", "money", "declined", "failed",
];

/// Offline stand-in for the model: counts domain keywords and answers with
/// the single matching label, or `multiple`.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordIntentModel;

impl KeywordIntentModel {
    pub fn label_for(query: &str) -> Intent {
        let lowered = query.to_lowercase();
        let tokens = lowered
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>();
        let mentions = |keywords: &[&str]| tokens.iter().any(|token| keywords.contains(token));

        let matched = [
            (Intent::Catalog, mentions(CATALOG_KEYWORDS)),
            (Intent::Order, mentions(ORDER_KEYWORDS)),
            (Intent::Payment, mentions(PAYMENT_KEYWORDS)),
        ]
        .into_iter()
        .filter_map(|(intent, hit)| hit.then_some(intent))
        .collect::<Vec<_>>();

        match matched.as_slice() {
            [single] => *single,
            _ => Intent::Multiple,
        }
    }
}

#[async_trait]
impl IntentModel for KeywordIntentModel {
    async fn classify(&self, query: &str) -> Result<String, ClassificationError> {
        Ok(Self::label_for(query).as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use triage_core::classifier::IntentModel;
    use triage_core::domain::Intent;

    use super::{KeywordIntentModel, LlmIntentModel};
    use crate::llm::LlmClient;

    struct CannedClient(Option<&'static str>);

    #[async_trait]
    impl LlmClient for CannedClient {
        fn provider(&self) -> &'static str {
            "canned"
        }

        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            self.0.map(str::to_string).ok_or_else(|| anyhow!("connection refused"))
        }
    }

    #[test]
    fn keyword_model_picks_single_domain() {
        assert_eq!(KeywordIntentModel::label_for("Where is my order #123?"), Intent::Order);
        assert_eq!(KeywordIntentModel::label_for("Was my card charged twice?"), Intent::Payment);
        assert_eq!(KeywordIntentModel::label_for("Is this product in stock?"), Intent::Catalog);
    }

    #[test]
    fn keyword_model_falls_back_to_multiple() {
        assert_eq!(
            KeywordIntentModel::label_for("my order is late and the payment failed"),
            Intent::Multiple
        );
        assert_eq!(KeywordIntentModel::label_for("hello there"), Intent::Multiple);
    }

    #[tokio::test]
    async fn llm_model_passes_raw_label_through() {
        let model = LlmIntentModel::new(Arc::new(CannedClient(Some(" Payment.\n"))));
        assert_eq!(model.classify("refund?").await.expect("label"), " Payment.\n");
    }

    #[tokio::test]
    async fn llm_failure_becomes_classification_error() {
        let model = LlmIntentModel::new(Arc::new(CannedClient(None)));
        let error = model.classify("refund?").await.expect_err("client failure");
        assert!(error.to_string().contains("connection refused"), "{error}");
    }
}
