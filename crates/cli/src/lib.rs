pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "triage",
    about = "Customer-support triage operator CLI",
    long_about = "Ask the triage workflow a question, inspect routing and configuration, and check readiness.",
    after_help = "Examples:\n  triage ask --offline \"Where is my order #123?\"\n  triage routes\n  triage doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one customer question through the workflow and print the answer")]
    Ask {
        #[arg(help = "The customer question")]
        query: String,
        #[arg(long, help = "Use the keyword classifier and template writer instead of an LLM")]
        offline: bool,
        #[arg(long, help = "Emit the full request snapshot as JSON")]
        json: bool,
    },
    #[command(about = "Print the intent-to-resolver routing table")]
    Routes,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, policy rules, answer templates, and LLM readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { query, offline, json } => commands::ask::run(&query, offline, json),
        Command::Routes => {
            commands::CommandResult { exit_code: 0, output: commands::routes::run() }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
