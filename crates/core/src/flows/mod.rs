pub mod engine;
pub mod states;

pub use engine::{
    transition, EngineOptions, FlowTransitionError, WorkflowEngine, WorkflowFailure, WorkflowRun,
};
pub use states::{StepAction, TransitionOutcome, WorkflowEvent, WorkflowState};
