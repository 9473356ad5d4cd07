use thiserror::Error;

use crate::domain::StateError;
use crate::flows::FlowTransitionError;

/// The classifier collaborator failed outright. Fatal for the request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("intent classification failed: {message}")]
pub struct ClassificationError {
    pub message: String,
}

impl ClassificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// The generation collaborator failed or produced nothing. Fatal for the request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("response synthesis failed: {message}")]
pub struct SynthesisError {
    pub message: String,
}

impl SynthesisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("request exceeded its {deadline_ms} ms deadline")]
    DeadlineExceeded { deadline_ms: u64 },
    #[error("query must not be empty")]
    EmptyQuery,
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Transition(#[from] FlowTransitionError),
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classification(_) => "classification_error",
            Self::Synthesis(_) => "synthesis_error",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::EmptyQuery => "empty_query",
            Self::State(_) | Self::Transition(_) => "invariant_violation",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("timeout: {message}")]
    Timeout { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The assistant could not answer right now. Please retry shortly."
            }
            Self::Timeout { .. } => "The request took too long to answer. Please retry shortly.",
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Timeout { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Timeout { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::InvalidRequest(message) => Self::BadRequest { message, correlation_id },
            ApplicationError::Workflow(error @ WorkflowError::EmptyQuery) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Workflow(
                error @ (WorkflowError::Classification(_) | WorkflowError::Synthesis(_)),
            ) => Self::ServiceUnavailable { message: error.to_string(), correlation_id },
            ApplicationError::Workflow(error @ WorkflowError::DeadlineExceeded { .. }) => {
                Self::Timeout { message: error.to_string(), correlation_id }
            }
            ApplicationError::Workflow(
                error @ (WorkflowError::State(_) | WorkflowError::Transition(_)),
            ) => Self::Internal { message: error.to_string(), correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::StateError;
    use crate::errors::{
        ApplicationError, ClassificationError, InterfaceError, SynthesisError, WorkflowError,
    };

    #[test]
    fn classification_failure_maps_to_service_unavailable() {
        let interface = ApplicationError::from(WorkflowError::from(ClassificationError::new(
            "provider returned 500",
        )))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The assistant could not answer right now. Please retry shortly."
        );
    }

    #[test]
    fn synthesis_failure_is_not_a_bad_request() {
        let interface =
            ApplicationError::from(WorkflowError::from(SynthesisError::new("empty completion")))
                .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn deadline_maps_to_timeout() {
        let interface =
            ApplicationError::from(WorkflowError::DeadlineExceeded { deadline_ms: 30_000 })
                .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Timeout { .. }));
        assert!(interface.to_string().contains("30000 ms"));
    }

    #[test]
    fn empty_query_maps_to_bad_request() {
        let interface =
            ApplicationError::from(WorkflowError::EmptyQuery).into_interface("req-4");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref message, .. } if message == "query must not be empty"
        ));
    }

    #[test]
    fn broken_invariant_maps_to_internal() {
        let interface = ApplicationError::from(WorkflowError::from(StateError::AlreadyWritten {
            field: "intent",
        }))
        .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
