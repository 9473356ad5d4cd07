use triage_agent::runtime::AgentRuntime;
use triage_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};
use triage_core::errors::ApplicationError;

use crate::commands::CommandResult;

const COMMAND: &str = "ask";
const EXIT_WORKFLOW_FAILURE: u8 = 1;
const EXIT_CONFIG_FAILURE: u8 = 2;

pub fn run(query: &str, offline: bool, json: bool) -> CommandResult {
    let overrides = ConfigOverrides {
        llm_provider: offline.then_some(LlmProvider::Offline),
        ..ConfigOverrides::default()
    };
    let config = match AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                error.to_string(),
                EXIT_CONFIG_FAILURE,
            )
        }
    };

    let runtime = match AgentRuntime::from_config(&config) {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_setup",
                format!("{error:#}"),
                EXIT_CONFIG_FAILURE,
            )
        }
    };

    let executor = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(executor) => executor,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_setup",
                format!("failed to initialize async runtime: {error}"),
                EXIT_CONFIG_FAILURE,
            )
        }
    };

    match executor.block_on(runtime.handle_query(query)) {
        Ok(run) if json => {
            let output = serde_json::to_string_pretty(&run.state.snapshot())
                .unwrap_or_else(|error| format!("snapshot serialization failed: {error}"));
            CommandResult { exit_code: 0, output }
        }
        Ok(run) => CommandResult { exit_code: 0, output: run.answer().to_string() },
        Err(failure) => {
            let error_class = failure.error.kind();
            let detail = failure.error.to_string();
            let interface = ApplicationError::Workflow(failure.error)
                .into_interface(failure.state.request_id());
            CommandResult::failure(
                COMMAND,
                error_class,
                format!(
                    "{} ({detail}; correlation_id={})",
                    interface.user_message(),
                    interface.correlation_id()
                ),
                EXIT_WORKFLOW_FAILURE,
            )
        }
    }
}
