use serde::Serialize;
use triage_agent::llm::build_llm_client;
use triage_agent::synthesizer::answer_templates;
use triage_core::config::{AppConfig, LlmProvider, LoadOptions};

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_policy_rules(&config));
            checks.push(check_llm_readiness(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["policy_rules", "llm_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }
    checks.push(check_answer_templates());

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_policy_rules(config: &AppConfig) -> DoctorCheck {
    let rule_set = config.policy.rule_set();
    let origin = if config.policy.rules.is_empty() { "built-in" } else { "configured" };
    match rule_set.validate() {
        Ok(()) => DoctorCheck {
            name: "policy_rules",
            status: CheckStatus::Pass,
            details: format!("{} {origin} eligibility rules", rule_set.len()),
        },
        Err(error) => DoctorCheck {
            name: "policy_rules",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    if config.llm.provider == LlmProvider::Offline {
        return DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Pass,
            details: "offline mode: keyword classifier and template writer".to_string(),
        };
    }

    match build_llm_client(&config.llm) {
        Ok(Some(client)) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Pass,
            details: format!("{} client ready for model `{}`", client.provider(), config.llm.model),
        },
        Ok(None) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Fail,
            details: format!("no client available for provider `{}`", config.llm.provider.as_str()),
        },
        Err(error) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Fail,
            details: format!("{error:#}"),
        },
    }
}

fn check_answer_templates() -> DoctorCheck {
    match answer_templates() {
        Ok(_) => DoctorCheck {
            name: "answer_templates",
            status: CheckStatus::Pass,
            details: "prompt and offline answer templates compiled".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "answer_templates",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
