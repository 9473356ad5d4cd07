use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tracing::info;
use triage_agent::runtime::AgentRuntime;
use triage_core::audit::NoopAuditSink;
use triage_core::config::{AppConfig, ConfigError, LoadOptions};
use triage_core::resolvers::LookupSet;

use crate::{health, query};

pub struct Application {
    pub config: AppConfig,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime failed to start: {0}")]
    Runtime(String),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let runtime = AgentRuntime::build(&config, LookupSet::fixtures(), Arc::new(NoopAuditSink))
        .map_err(|error| BootstrapError::Runtime(format!("{error:#}")))?;

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        deadline_secs = config.workflow.deadline_secs,
        fallback_synthesis = config.workflow.fallback_synthesis,
        "workflow runtime initialized"
    );

    Ok(Application { config, runtime })
}

impl Application {
    pub fn router(&self) -> Router {
        health::router(&self.config.llm).merge(query::router(self.runtime.clone()))
    }
}
