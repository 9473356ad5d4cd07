use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use triage_core::config::{LlmConfig, LlmProvider};

#[derive(Clone)]
pub struct HealthState {
    provider: LlmProvider,
    model: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub llm: HealthCheck,
    pub checked_at: String,
}

pub fn router(llm: &LlmConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { provider: llm.provider, model: llm.model.clone() })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "triage-server runtime initialized".to_string(),
        },
        llm: llm_check(&state),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

fn llm_check(state: &HealthState) -> HealthCheck {
    match state.provider {
        LlmProvider::Offline => HealthCheck {
            status: "offline",
            detail: "keyword classifier and template writer in use".to_string(),
        },
        provider => HealthCheck {
            status: "configured",
            detail: format!("provider `{}` with model `{}`", provider.as_str(), state.model),
        },
    }
}
