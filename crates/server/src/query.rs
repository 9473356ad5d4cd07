//! `POST /api/v1/query`: one customer question in, one answer out.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use triage_agent::runtime::AgentRuntime;
use triage_core::domain::{RequestState, ResolverKind};
use triage_core::errors::{ApplicationError, InterfaceError};
use triage_core::flows::WorkflowRun;
use triage_core::policy::PolicyResult;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_QUERY_CHARS: usize = 4_000;

#[derive(Clone)]
pub struct QueryState {
    runtime: AgentRuntime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolverOutcome {
    pub resolver: ResolverKind,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryResponse {
    pub request_id: String,
    pub intent: Option<String>,
    pub answer: String,
    pub resolvers: Vec<ResolverOutcome>,
    pub policy: Option<PolicyResult>,
    pub degraded: bool,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryError {
    pub error: String,
    pub kind: &'static str,
    pub correlation_id: String,
}

pub fn router(runtime: AgentRuntime) -> Router {
    Router::new().route("/api/v1/query", post(answer_query)).with_state(QueryState { runtime })
}

async fn answer_query(
    State(state): State<QueryState>,
    headers: HeaderMap,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, (StatusCode, Json<QueryError>)> {
    let upstream_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let correlation_id = upstream_id.unwrap_or("unassigned").to_string();
            warn!(
                event_name = "server.query.rejected",
                correlation_id = %correlation_id,
                error = %rejection.body_text(),
                "query body rejected"
            );
            let error = ApplicationError::InvalidRequest(rejection.body_text())
                .into_interface(correlation_id);
            return Err(error_response(error, "invalid_body"));
        }
    };

    if request.query.chars().count() > MAX_QUERY_CHARS {
        let correlation_id = upstream_id.unwrap_or("unassigned").to_string();
        let error = ApplicationError::InvalidRequest(format!(
            "query exceeds {MAX_QUERY_CHARS} characters"
        ))
        .into_interface(correlation_id);
        return Err(error_response(error, "query_too_long"));
    }

    let outcome = match upstream_id {
        Some(request_id) => state.runtime.handle_query_with_id(request_id, &request.query).await,
        None => state.runtime.handle_query(&request.query).await,
    };

    match outcome {
        Ok(run) => {
            info!(
                event_name = "server.query.answered",
                correlation_id = run.state.request_id(),
                elapsed_ms = run.elapsed.as_millis() as u64,
                "query answered"
            );
            Ok(Json(QueryResponse::from_run(&run)))
        }
        Err(failure) => {
            let kind = failure.error.kind();
            warn!(
                event_name = "server.query.failed",
                correlation_id = failure.state.request_id(),
                error_kind = kind,
                error = %failure.error,
                "query failed"
            );
            let error = ApplicationError::Workflow(failure.error)
                .into_interface(failure.state.request_id());
            Err(error_response(error, kind))
        }
    }
}

fn error_response(error: InterfaceError, kind: &'static str) -> (StatusCode, Json<QueryError>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::BAD_GATEWAY,
        InterfaceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(QueryError {
            error: error.user_message().to_string(),
            kind,
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

impl QueryResponse {
    fn from_run(run: &WorkflowRun) -> Self {
        Self {
            request_id: run.state.request_id().to_string(),
            intent: run.state.intent().map(|intent| intent.as_str().to_string()),
            answer: run.answer().to_string(),
            resolvers: resolver_outcomes(&run.state),
            policy: run.state.policy_result().cloned(),
            degraded: run.degraded_synthesis,
            elapsed_ms: run.elapsed.as_millis() as u64,
        }
    }
}

fn resolver_outcomes(state: &RequestState) -> Vec<ResolverOutcome> {
    let mut outcomes = Vec::new();
    if let Some(resolution) = state.catalog_result() {
        outcomes.push(ResolverOutcome {
            resolver: ResolverKind::Catalog,
            status: resolution.status_label(),
            reason: resolution.reason().map(str::to_string),
        });
    }
    if let Some(resolution) = state.order_result() {
        outcomes.push(ResolverOutcome {
            resolver: ResolverKind::Order,
            status: resolution.status_label(),
            reason: resolution.reason().map(str::to_string),
        });
    }
    if let Some(resolution) = state.payment_result() {
        outcomes.push(ResolverOutcome {
            resolver: ResolverKind::Payment,
            status: resolution.status_label(),
            reason: resolution.reason().map(str::to_string),
        });
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use triage_agent::runtime::AgentRuntime;
    use triage_core::audit::NoopAuditSink;
    use triage_core::config::{AppConfig, LlmProvider};
    use triage_core::domain::ResolverKind;
    use triage_core::resolvers::fixtures::FixtureStore;
    use triage_core::resolvers::LookupSet;

    use super::router;

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Offline;
        config
    }

    fn app_with(config: &AppConfig, store: FixtureStore) -> Router {
        let store = Arc::new(store);
        let lookups = LookupSet::new(store.clone(), store.clone(), store);
        let runtime =
            AgentRuntime::build(config, lookups, Arc::new(NoopAuditSink)).expect("runtime");
        router(runtime)
    }

    async fn post_query(app: Router, body: &str, request_id: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/query")
            .header("content-type", "application/json");
        if let Some(id) = request_id {
            builder = builder.header("x-request-id", id);
        }
        let response = app
            .oneshot(builder.body(Body::from(body.to_string())).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn order_question_returns_answer_and_only_order_evidence() {
        let app = app_with(&offline_config(), FixtureStore::demo());

        let (status, body) =
            post_query(app, r#"{"query":"Where is my order #123?"}"#, Some("req-abc")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request_id"], "req-abc");
        assert_eq!(body["intent"], "order");
        assert_eq!(body["resolvers"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["resolvers"][0]["resolver"], "order");
        assert_eq!(body["resolvers"][0]["status"], "found");
        assert_eq!(body["policy"]["verdict"], "courtesy_credit");
        assert!(body["answer"].as_str().unwrap_or_default().contains("#123"));
    }

    #[tokio::test]
    async fn resolver_outage_still_answers() {
        let app =
            app_with(&offline_config(), FixtureStore::demo().with_outage(ResolverKind::Payment));

        let (status, body) =
            post_query(app, r#"{"query":"was my payment for order #456 charged?"}"#, None).await;

        assert_eq!(status, StatusCode::OK);
        let payment = body["resolvers"]
            .as_array()
            .and_then(|items| items.iter().find(|item| item["resolver"] == "payment"))
            .cloned()
            .expect("payment outcome");
        assert_eq!(payment["status"], "unavailable");
    }

    #[tokio::test]
    async fn empty_query_is_bad_request() {
        let app = app_with(&offline_config(), FixtureStore::demo());

        let (status, body) = post_query(app, r#"{"query":"   "}"#, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "empty_query");
        assert!(body["correlation_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn oversized_query_is_bad_request() {
        let app = app_with(&offline_config(), FixtureStore::demo());
        let body = serde_json::json!({ "query": "a".repeat(4_001) }).to_string();

        let (status, body) = post_query(app, &body, Some("req-big")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["correlation_id"], "req-big");
    }

    #[tokio::test]
    async fn malformed_body_gets_the_error_shape() {
        let app = app_with(&offline_config(), FixtureStore::demo());

        let (status, body) = post_query(app.clone(), r#"{"question":"order #123"}"#, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_body");
        assert_eq!(body["correlation_id"], "unassigned");

        let (status, body) = post_query(app, "{not json", Some("req-broken")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_body");
        assert_eq!(body["correlation_id"], "req-broken");
    }

    #[tokio::test]
    async fn deadline_maps_to_gateway_timeout() {
        let mut config = offline_config();
        config.workflow.deadline_secs = 1;
        let app = app_with(&config, FixtureStore::demo().with_latency(Duration::from_secs(3)));

        let (status, body) = post_query(app, r#"{"query":"order #123"}"#, None).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["kind"], "deadline_exceeded");
    }

    #[tokio::test]
    async fn unreachable_model_maps_to_bad_gateway() {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        config.llm.base_url = Some("http://127.0.0.1:9".to_string());
        config.llm.max_retries = 0;
        config.llm.timeout_secs = 2;
        let app = app_with(&config, FixtureStore::demo());

        let (status, body) = post_query(app, r#"{"query":"order #123"}"#, Some("req-down")).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "classification_error");
        assert_eq!(body["correlation_id"], "req-down");
        assert!(!body["error"].as_str().unwrap_or_default().contains("127.0.0.1"));
    }
}
