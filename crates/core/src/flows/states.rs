use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Start,
    Classified,
    DomainsResolved,
    PolicyEvaluated,
    Complete,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    IntentClassified,
    ClassificationFailed,
    QueryRejected,
    DomainsJoined,
    PolicyEvaluated,
    AnswerSynthesized,
    SynthesisFailed,
    DeadlineExceeded,
    InvariantViolated,
}

/// What the engine does after a transition lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    ResolveDomains,
    EvaluatePolicy,
    SynthesizeAnswer,
    ReturnAnswer,
    ReturnError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub event: WorkflowEvent,
    pub action: StepAction,
}
