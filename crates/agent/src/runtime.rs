use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use triage_core::audit::{AuditSink, NoopAuditSink};
use triage_core::classifier::IntentModel;
use triage_core::config::{AppConfig, LlmProvider};
use triage_core::domain::RequestState;
use triage_core::flows::{WorkflowEngine, WorkflowFailure, WorkflowRun};
use triage_core::policy::RuleBasedPolicyEngine;
use triage_core::resolvers::LookupSet;
use triage_core::synthesis::ResponseModel;

use crate::classifier::{KeywordIntentModel, LlmIntentModel};
use crate::llm::build_llm_client;
use crate::synthesizer::{answer_templates, LlmResponseModel, TemplateResponseModel};

/// A configured workflow engine plus the provider it talks to.
#[derive(Clone)]
pub struct AgentRuntime {
    engine: WorkflowEngine,
    provider: LlmProvider,
}

impl AgentRuntime {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::build(config, LookupSet::fixtures(), Arc::new(NoopAuditSink))
    }

    /// Same as [`from_config`](Self::from_config) with caller-supplied
    /// lookups and audit sink.
    pub fn build(
        config: &AppConfig,
        lookups: LookupSet,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let templates = Arc::new(answer_templates().context("answer templates failed to compile")?);

        let (intent_model, response_model): (Arc<dyn IntentModel>, Arc<dyn ResponseModel>) =
            match build_llm_client(&config.llm)? {
                Some(client) => (
                    Arc::new(LlmIntentModel::new(client.clone())),
                    Arc::new(LlmResponseModel::new(client, templates)),
                ),
                None => (
                    Arc::new(KeywordIntentModel),
                    Arc::new(TemplateResponseModel::new(templates)),
                ),
            };

        let engine = WorkflowEngine::new(intent_model, response_model, lookups)
            .with_policy(Arc::new(RuleBasedPolicyEngine::new(config.policy.rule_set())))
            .with_audit_sink(audit)
            .with_options(config.workflow.engine_options());

        info!(
            event_name = "agent.runtime_ready",
            provider = config.llm.provider.as_str(),
            model = %config.llm.model,
            policy_rules = config.policy.rule_set().len(),
            "agent runtime configured"
        );

        Ok(Self { engine, provider: config.llm.provider })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub async fn handle_query(&self, query: &str) -> Result<WorkflowRun, WorkflowFailure> {
        self.engine.run(query).await
    }

    pub async fn handle_query_with_id(
        &self,
        request_id: &str,
        query: &str,
    ) -> Result<WorkflowRun, WorkflowFailure> {
        self.engine.run_with_state(RequestState::with_request_id(request_id, query)).await
    }
}
