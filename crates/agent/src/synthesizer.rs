//! Answer generation collaborators. Both render the accumulated request state
//! through `tera` templates; the model-backed one sends the rendered prompt to
//! an [`LlmClient`], the offline one returns the rendered text directly.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tera::{Context, Tera};
use triage_core::domain::{RequestState, Resolution, ResolverKind};
use triage_core::errors::SynthesisError;
use triage_core::synthesis::{evidence_facts, ResponseModel};

use crate::llm::LlmClient;

const ANSWER_PROMPT: &str = "answer_prompt.txt";
const OFFLINE_ANSWER: &str = "offline_answer.txt";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a customer-support assistant. \
Answer the customer's question using only the lookup results provided. \
Never promise a refund, return or credit unless the eligibility verdict grants it. \
If a lookup was unavailable, say that part could not be checked. \
Keep the reply under 120 words.";

/// Both answer templates, compiled once.
pub fn answer_templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(ANSWER_PROMPT, include_str!("../templates/answer_prompt.txt"))?;
    tera.add_raw_template(OFFLINE_ANSWER, include_str!("../templates/offline_answer.txt"))?;
    Ok(tera)
}

#[derive(Debug, Serialize)]
struct EvidenceSection {
    domain: &'static str,
    status: &'static str,
    detail: String,
}

fn section<T: Serialize>(kind: ResolverKind, resolution: &Resolution<T>) -> EvidenceSection {
    let detail = match resolution {
        Resolution::Found { data } => serde_json::to_string_pretty(data)
            .unwrap_or_else(|error| format!("(could not render lookup result: {error})")),
        Resolution::NotFound { reason } | Resolution::Unavailable { reason } => reason.clone(),
    };
    EvidenceSection { domain: kind.as_str(), status: resolution.status_label(), detail }
}

/// Template context holding only the domains this request actually resolved.
fn prompt_context(state: &RequestState) -> Context {
    let mut sections = Vec::new();
    if let Some(resolution) = state.catalog_result() {
        sections.push(section(ResolverKind::Catalog, resolution));
    }
    if let Some(resolution) = state.order_result() {
        sections.push(section(ResolverKind::Order, resolution));
    }
    if let Some(resolution) = state.payment_result() {
        sections.push(section(ResolverKind::Payment, resolution));
    }

    let mut context = Context::new();
    context.insert("query", state.query());
    context.insert("intent", state.intent().map(|intent| intent.as_str()).unwrap_or("multiple"));
    context.insert("evidence", &sections);
    match state.policy_result() {
        Some(policy) => {
            context.insert("verdict", policy.verdict.as_str());
            context.insert("fired_rules", &policy.fired_rules);
            context.insert("notes", &policy.notes);
        }
        None => {
            context.insert("verdict", "insufficient_information");
            context.insert("fired_rules", &Vec::<String>::new());
            context.insert("notes", &Vec::<String>::new());
        }
    }
    context
}

fn render(templates: &Tera, name: &str, context: &Context) -> Result<String, SynthesisError> {
    templates
        .render(name, context)
        .map_err(|error| SynthesisError::new(format!("could not render `{name}`: {error}")))
}

#[derive(Clone)]
pub struct LlmResponseModel {
    client: Arc<dyn LlmClient>,
    templates: Arc<Tera>,
}

impl LlmResponseModel {
    pub fn new(client: Arc<dyn LlmClient>, templates: Arc<Tera>) -> Self {
        Self { client, templates }
    }

    pub fn render_prompt(&self, state: &RequestState) -> Result<String, SynthesisError> {
        render(&self.templates, ANSWER_PROMPT, &prompt_context(state))
    }
}

#[async_trait]
impl ResponseModel for LlmResponseModel {
    async fn synthesize(&self, state: &RequestState) -> Result<String, SynthesisError> {
        let prompt = self.render_prompt(state)?;
        self.client.complete(SYNTHESIS_SYSTEM_PROMPT, &prompt).await.map_err(|error| {
            SynthesisError::new(format!("{} request failed: {error:#}", self.client.provider()))
        })
    }
}

/// Deterministic writer used when no model is configured.
#[derive(Clone)]
pub struct TemplateResponseModel {
    templates: Arc<Tera>,
}

impl TemplateResponseModel {
    pub fn new(templates: Arc<Tera>) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl ResponseModel for TemplateResponseModel {
    async fn synthesize(&self, state: &RequestState) -> Result<String, SynthesisError> {
        let unavailable = [
            (ResolverKind::Catalog, state.catalog_result().map(Resolution::is_unavailable)),
            (ResolverKind::Order, state.order_result().map(Resolution::is_unavailable)),
            (ResolverKind::Payment, state.payment_result().map(Resolution::is_unavailable)),
        ]
        .into_iter()
        .filter_map(|(kind, down)| (down == Some(true)).then_some(kind.as_str()))
        .collect::<Vec<_>>();

        let opening = match state.intent().map(|intent| intent.as_str()) {
            Some("catalog") => "Here is what I found about that product.",
            Some("order") => "Here is the latest on your order.",
            Some("payment") => "Here is what I found about your payment.",
            _ => "Here is what I found.",
        };

        let mut context = Context::new();
        context.insert("opening", opening);
        context.insert("facts", &evidence_facts(state));
        context.insert("unavailable", &unavailable);
        render(&self.templates, OFFLINE_ANSWER, &context)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use triage_core::domain::{
        CatalogResult, DomainWrite, OrderId, OrderResult, OrderStatus, ProductId, RequestState,
        Resolution,
    };
    use triage_core::synthesis::ResponseModel;

    use super::{answer_templates, LlmResponseModel, TemplateResponseModel};
    use crate::llm::LlmClient;

    #[derive(Default)]
    struct RecordingClient {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        fn provider(&self) -> &'static str {
            "recording"
        }

        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().expect("prompts lock").push(prompt.to_string());
            if self.fail {
                bail!("upstream 503");
            }
            Ok("Your order is on its way.".to_string())
        }
    }

    fn order_state() -> RequestState {
        let mut state = RequestState::new("where is order #123?");
        state
            .apply_domain(DomainWrite::Order(Resolution::Found {
                data: OrderResult {
                    order_id: OrderId("123".to_string()),
                    status: OrderStatus::Delayed,
                    product_id: Some(ProductId("headphones".to_string())),
                    placed_at: Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap(),
                    expected_delivery: None,
                    delivered_on: None,
                    delay_days: 9,
                },
            }))
            .expect("order write");
        state
    }

    #[tokio::test]
    async fn prompt_only_mentions_resolved_domains() {
        let client = Arc::new(RecordingClient::default());
        let model = LlmResponseModel::new(client.clone(), Arc::new(answer_templates().unwrap()));

        let answer = model.synthesize(&order_state()).await.expect("answer");
        assert_eq!(answer, "Your order is on its way.");

        let prompts = client.prompts.lock().expect("prompts lock");
        assert!(prompts[0].contains("order lookup (found)"), "{}", prompts[0]);
        assert!(prompts[0].contains("\"delay_days\": 9"), "{}", prompts[0]);
        assert!(!prompts[0].contains("catalog lookup"), "{}", prompts[0]);
        assert!(!prompts[0].contains("payment lookup"), "{}", prompts[0]);
    }

    #[tokio::test]
    async fn client_failure_becomes_synthesis_error() {
        let client = Arc::new(RecordingClient { fail: true, ..RecordingClient::default() });
        let model = LlmResponseModel::new(client, Arc::new(answer_templates().unwrap()));

        let error = model.synthesize(&order_state()).await.expect_err("client failure");
        assert!(error.to_string().contains("upstream 503"), "{error}");
    }

    #[tokio::test]
    async fn offline_writer_reports_facts_and_outages() {
        let model = TemplateResponseModel::new(Arc::new(answer_templates().unwrap()));
        let mut state = order_state();
        state
            .apply_domain(DomainWrite::Catalog(Resolution::<CatalogResult>::Unavailable {
                reason: "catalog timed out".to_string(),
            }))
            .expect("catalog write");

        let answer = model.synthesize(&state).await.expect("answer");
        assert!(answer.contains("Order #123 is delayed by 9 days."), "{answer}");
        assert!(answer.contains("Some systems did not respond (catalog)"), "{answer}");
    }

    #[tokio::test]
    async fn offline_writer_asks_for_details_without_evidence() {
        let model = TemplateResponseModel::new(Arc::new(answer_templates().unwrap()));
        let answer = model.synthesize(&RequestState::new("hi")).await.expect("answer");
        assert!(answer.starts_with("I could not find enough information"), "{answer}");
    }
}
