use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use toml::Value;
use triage_core::config::{detect_config_path, AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "llm.provider",
        config.llm.provider.as_str(),
        source("llm.provider", &["TRIAGE_LLM_PROVIDER"]),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", &["TRIAGE_LLM_MODEL"]),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", &["TRIAGE_LLM_BASE_URL"]),
    ));
    let llm_api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(render_line(
        "llm.api_key",
        &llm_api_key,
        source("llm.api_key", &["TRIAGE_LLM_API_KEY"]),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", &["TRIAGE_LLM_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "llm.max_retries",
        &config.llm.max_retries.to_string(),
        source("llm.max_retries", &["TRIAGE_LLM_MAX_RETRIES"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["TRIAGE_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["TRIAGE_SERVER_PORT"]),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", &["TRIAGE_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ));

    lines.push(render_line(
        "workflow.deadline_secs",
        &config.workflow.deadline_secs.to_string(),
        source("workflow.deadline_secs", &["TRIAGE_WORKFLOW_DEADLINE_SECS"]),
    ));
    lines.push(render_line(
        "workflow.fallback_synthesis",
        &config.workflow.fallback_synthesis.to_string(),
        source("workflow.fallback_synthesis", &["TRIAGE_WORKFLOW_FALLBACK_SYNTHESIS"]),
    ));

    lines.push(render_line(
        "policy.delay_threshold_days",
        &config.policy.delay_threshold_days.to_string(),
        source("policy.delay_threshold_days", &["TRIAGE_POLICY_DELAY_THRESHOLD_DAYS"]),
    ));
    lines.push(render_line(
        "policy.return_window_days",
        &config.policy.return_window_days.to_string(),
        source("policy.return_window_days", &["TRIAGE_POLICY_RETURN_WINDOW_DAYS"]),
    ));
    let rule_ids = config
        .policy
        .rule_set()
        .rules
        .iter()
        .map(|rule| rule.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(render_line("policy.rules", &format!("[{rule_ids}]"), source("policy.rules", &[])));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["TRIAGE_LOGGING_LEVEL", "TRIAGE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        source("logging.format", &["TRIAGE_LOGGING_FORMAT", "TRIAGE_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
