//! Core of the customer-support triage workflow: request state, routing,
//! domain resolvers, eligibility policy and the state-machine engine that
//! drives a query from classification to a synthesized answer.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod policy;
pub mod resolvers;
pub mod routing;
pub mod synthesis;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use classifier::{classify_intent, IntentModel};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions};
pub use domain::{
    CatalogResult, Evidence, Intent, OrderId, OrderResult, OrderStatus, PaymentResult,
    PaymentStatus, ProductId, QueryEntities, RequestSnapshot, RequestState, Resolution,
    ResolverKind, StateError,
};
pub use errors::{
    ApplicationError, ClassificationError, InterfaceError, SynthesisError, WorkflowError,
};
pub use flows::{
    EngineOptions, WorkflowEngine, WorkflowFailure, WorkflowRun, WorkflowState,
};
pub use policy::{
    EligibilityVerdict, PolicyEngine, PolicyResult, PolicyRuleSet, RuleBasedPolicyEngine,
};
pub use resolvers::{fixtures::FixtureStore, LookupError, LookupSet};
pub use routing::{select_resolvers, ROUTING_TABLE};
pub use synthesis::ResponseModel;
