//! Agent Runtime - language-model collaborators for the triage workflow
//!
//! This crate supplies the two non-deterministic steps of a request:
//! - Classifies a customer question into an intent label (`classifier`)
//! - Writes the final reply from the gathered evidence (`synthesizer`)
//!
//! # Architecture
//!
//! 1. **LLM clients** (`llm`) - OpenAI-compatible and Anthropic chat APIs over `reqwest`
//! 2. **Collaborators** - model-backed and offline implementations of the core traits
//! 3. **Runtime** (`runtime`) - builds a `WorkflowEngine` from `AppConfig`
//!
//! # Safety Principle
//!
//! The model is strictly a translator. It never decides routing or eligibility;
//! routing comes from the core's table and eligibility from the rule set.

pub mod classifier;
pub mod llm;
pub mod runtime;
pub mod synthesizer;

pub use classifier::{KeywordIntentModel, LlmIntentModel};
pub use llm::{build_llm_client, AnthropicClient, LlmClient, OpenAiCompatibleClient};
pub use runtime::AgentRuntime;
pub use synthesizer::{answer_templates, LlmResponseModel, TemplateResponseModel};
