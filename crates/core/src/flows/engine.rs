use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use crate::classifier::{classify_intent, IntentModel};
use crate::domain::{DomainWrite, Intent, QueryEntities, RequestState, ResolverKind};
use crate::errors::{SynthesisError, WorkflowError};
use crate::flows::states::{StepAction, TransitionOutcome, WorkflowEvent, WorkflowState};
use crate::policy::{PolicyEngine, RuleBasedPolicyEngine};
use crate::resolvers::LookupSet;
use crate::routing::select_resolvers;
use crate::synthesis::{compose_fallback_answer, require_answer, ResponseModel};

const AUDIT_ACTOR: &str = "workflow-engine";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: WorkflowState, event: WorkflowEvent },
    #[error("workflow halted in {state:?} without an answer")]
    Halted { state: WorkflowState },
}

/// The transition table. Terminal states accept no events.
pub fn transition(
    current: WorkflowState,
    event: WorkflowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use StepAction::{EvaluatePolicy, ResolveDomains, ReturnAnswer, ReturnError, SynthesizeAnswer};
    use WorkflowEvent::{
        AnswerSynthesized, ClassificationFailed, DeadlineExceeded, DomainsJoined,
        IntentClassified, InvariantViolated, PolicyEvaluated, QueryRejected, SynthesisFailed,
    };
    use WorkflowState::{Classified, Complete, DomainsResolved, Failed, Start};

    let (to, action) = match (current, event) {
        (Start, IntentClassified) => (Classified, ResolveDomains),
        (Start, ClassificationFailed) | (Start, QueryRejected) => (Failed, ReturnError),
        (Classified, DomainsJoined) => (DomainsResolved, EvaluatePolicy),
        (DomainsResolved, PolicyEvaluated) => (WorkflowState::PolicyEvaluated, SynthesizeAnswer),
        (WorkflowState::PolicyEvaluated, AnswerSynthesized) => (Complete, ReturnAnswer),
        (WorkflowState::PolicyEvaluated, SynthesisFailed) => (Failed, ReturnError),
        (state, DeadlineExceeded) | (state, InvariantViolated) if !state.is_terminal() => {
            (Failed, ReturnError)
        }
        _ => return Err(FlowTransitionError::InvalidTransition { state: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event, action })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Upper bound for one whole request; `None` disables the deadline.
    pub deadline: Option<Duration>,
    /// Compose an answer from raw evidence when synthesis fails.
    pub fallback_synthesis: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { deadline: Some(Duration::from_secs(30)), fallback_synthesis: false }
    }
}

/// A request that reached `Complete`.
#[derive(Clone, Debug)]
pub struct WorkflowRun {
    pub state: RequestState,
    pub selected: Vec<ResolverKind>,
    pub trace: Vec<TransitionOutcome>,
    pub degraded_synthesis: bool,
    pub elapsed: Duration,
}

impl WorkflowRun {
    pub fn answer(&self) -> &str {
        self.state.final_answer().unwrap_or_default()
    }

    pub fn terminal(&self) -> WorkflowState {
        terminal_of(&self.trace)
    }
}

/// A request that reached `Failed`. Carries the partial state for inspection;
/// it never holds a final answer.
#[derive(Clone, Debug, Error)]
#[error("{error}")]
pub struct WorkflowFailure {
    pub error: WorkflowError,
    pub state: RequestState,
    pub trace: Vec<TransitionOutcome>,
}

impl WorkflowFailure {
    pub fn terminal(&self) -> WorkflowState {
        terminal_of(&self.trace)
    }
}

fn terminal_of(trace: &[TransitionOutcome]) -> WorkflowState {
    trace.last().map(|outcome| outcome.to).unwrap_or(WorkflowState::Start)
}

struct RunContext {
    state: RequestState,
    current: WorkflowState,
    selected: Vec<ResolverKind>,
    trace: Vec<TransitionOutcome>,
    degraded_synthesis: bool,
}

/// Drives one request at a time through classify -> resolve -> policy ->
/// synthesize. Holds only shared, immutable collaborators, so one engine
/// serves any number of concurrent requests.
#[derive(Clone)]
pub struct WorkflowEngine {
    intent_model: Arc<dyn IntentModel>,
    response_model: Arc<dyn ResponseModel>,
    lookups: LookupSet,
    policy: Arc<dyn PolicyEngine>,
    audit: Arc<dyn AuditSink>,
    options: EngineOptions,
}

impl WorkflowEngine {
    pub fn new(
        intent_model: Arc<dyn IntentModel>,
        response_model: Arc<dyn ResponseModel>,
        lookups: LookupSet,
    ) -> Self {
        Self {
            intent_model,
            response_model,
            lookups,
            policy: Arc::new(RuleBasedPolicyEngine::default()),
            audit: Arc::new(NoopAuditSink),
            options: EngineOptions::default(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// The core's external boundary: one query in, one answer (or error) out.
    pub async fn answer(&self, query: &str) -> Result<String, WorkflowError> {
        let run = self.run(query).await.map_err(|failure| failure.error)?;
        run.state
            .final_answer()
            .map(str::to_string)
            .ok_or_else(|| SynthesisError::new("workflow completed without an answer").into())
    }

    pub async fn run(&self, query: impl Into<String>) -> Result<WorkflowRun, WorkflowFailure> {
        self.run_with_state(RequestState::new(query)).await
    }

    /// Runs a caller-built state, e.g. one carrying an upstream request id.
    pub async fn run_with_state(
        &self,
        state: RequestState,
    ) -> Result<WorkflowRun, WorkflowFailure> {
        let started = Instant::now();
        let mut ctx = RunContext {
            state,
            current: WorkflowState::Start,
            selected: Vec::new(),
            trace: Vec::new(),
            degraded_synthesis: false,
        };

        info!(
            event_name = "flow.request_received",
            correlation_id = ctx.state.request_id(),
            query_len = ctx.state.query().len(),
            "workflow started"
        );

        let outcome = match self.options.deadline {
            Some(deadline) => {
                let bounded = tokio::time::timeout(deadline, self.drive(&mut ctx)).await;
                bounded.unwrap_or_else(|_| {
                    Err(WorkflowError::DeadlineExceeded {
                        deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    })
                })
            }
            None => self.drive(&mut ctx).await,
        };

        let elapsed = started.elapsed();
        match outcome {
            Ok(()) => {
                info!(
                    event_name = "flow.request_completed",
                    correlation_id = ctx.state.request_id(),
                    intent = ctx.state.intent().map(|intent| intent.as_str()).unwrap_or("unknown"),
                    resolvers = ?ctx.selected,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "workflow complete"
                );
                Ok(WorkflowRun {
                    state: ctx.state,
                    selected: ctx.selected,
                    trace: ctx.trace,
                    degraded_synthesis: ctx.degraded_synthesis,
                    elapsed,
                })
            }
            Err(error) => {
                self.abort(&mut ctx, &error);
                warn!(
                    event_name = "flow.request_failed",
                    correlation_id = ctx.state.request_id(),
                    error_kind = error.kind(),
                    error = %error,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "workflow failed"
                );
                Err(WorkflowFailure { error, state: ctx.state, trace: ctx.trace })
            }
        }
    }

    /// Follows the action each transition hands back until one returns.
    async fn drive(&self, ctx: &mut RunContext) -> Result<(), WorkflowError> {
        if ctx.state.query().trim().is_empty() {
            return Err(WorkflowError::EmptyQuery);
        }

        let mut next = self.classify(ctx).await?;
        loop {
            next = match next {
                StepAction::ResolveDomains => self.resolve_domains(ctx).await?,
                StepAction::EvaluatePolicy => self.evaluate_policy(ctx)?,
                StepAction::SynthesizeAnswer => self.synthesize(ctx).await?,
                StepAction::ReturnAnswer => return Ok(()),
                StepAction::ReturnError => {
                    return Err(FlowTransitionError::Halted { state: ctx.current }.into())
                }
            };
        }
    }

    async fn classify(&self, ctx: &mut RunContext) -> Result<StepAction, WorkflowError> {
        let intent = classify_intent(
            self.intent_model.as_ref(),
            ctx.state.request_id(),
            ctx.state.query(),
        )
        .await?;
        ctx.state.set_intent(intent)?;
        self.advance(ctx, WorkflowEvent::IntentClassified)
    }

    async fn resolve_domains(&self, ctx: &mut RunContext) -> Result<StepAction, WorkflowError> {
        let intent = ctx.state.intent().unwrap_or(Intent::Multiple);
        ctx.selected = select_resolvers(intent);
        let query = ctx.state.query().to_string();
        let entities = QueryEntities::parse(&query);
        let request_id = ctx.state.request_id().to_string();
        let resolutions = ctx.selected.iter().map(|kind| {
            let (kind, query, entities, request_id) = (*kind, &query, &entities, &request_id);
            async move {
                let started = Instant::now();
                let write = AssertUnwindSafe(self.lookups.resolve(kind, query, entities))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!(
                            event_name = "resolver.panicked",
                            correlation_id = %request_id,
                            resolver = kind.as_str(),
                            "resolver panicked; marking domain unavailable"
                        );
                        DomainWrite::unavailable(kind, "resolver panicked")
                    });
                debug!(
                    event_name = "resolver.completed",
                    correlation_id = %request_id,
                    resolver = kind.as_str(),
                    status = write.status_label(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "resolver finished"
                );
                write
            }
        });
        // Join barrier: every selected resolver finishes before policy runs.
        for write in join_all(resolutions).await {
            ctx.state.apply_domain(write)?;
        }
        self.advance(ctx, WorkflowEvent::DomainsJoined)
    }

    fn evaluate_policy(&self, ctx: &mut RunContext) -> Result<StepAction, WorkflowError> {
        let policy_result = self.policy.evaluate(&ctx.state.evidence());
        ctx.state.set_policy_result(policy_result)?;
        self.advance(ctx, WorkflowEvent::PolicyEvaluated)
    }

    async fn synthesize(&self, ctx: &mut RunContext) -> Result<StepAction, WorkflowError> {
        let answer = match self.response_model.synthesize(&ctx.state).await.and_then(require_answer)
        {
            Ok(answer) => answer,
            Err(error) if self.options.fallback_synthesis => {
                warn!(
                    event_name = "synthesis.fallback_used",
                    correlation_id = ctx.state.request_id(),
                    error = %error,
                    "synthesis failed; composing answer from evidence"
                );
                ctx.degraded_synthesis = true;
                compose_fallback_answer(&ctx.state)
            }
            Err(error) => return Err(error.into()),
        };
        ctx.state.set_final_answer(answer)?;
        self.advance(ctx, WorkflowEvent::AnswerSynthesized)
    }

    fn advance(
        &self,
        ctx: &mut RunContext,
        event: WorkflowEvent,
    ) -> Result<StepAction, WorkflowError> {
        let result = transition(ctx.current, event);
        match &result {
            Ok(outcome) => {
                debug!(
                    event_name = "flow.transition_applied",
                    correlation_id = ctx.state.request_id(),
                    from = ?outcome.from,
                    to = ?outcome.to,
                    event = ?outcome.event,
                    "workflow transition"
                );
                self.audit.emit(
                    AuditEvent::new(
                        ctx.state.request_id(),
                        "flow.transition_applied",
                        audit_category(outcome.event),
                        AUDIT_ACTOR,
                        if outcome.to == WorkflowState::Failed {
                            AuditOutcome::Failed
                        } else {
                            AuditOutcome::Success
                        },
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        ctx.state.request_id(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AUDIT_ACTOR,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }

        let outcome = result?;
        let action = outcome.action;
        ctx.current = outcome.to;
        ctx.trace.push(outcome);
        Ok(action)
    }

    fn abort(&self, ctx: &mut RunContext, error: &WorkflowError) {
        if ctx.current.is_terminal() {
            return;
        }
        let event = match error {
            WorkflowError::Classification(_) => WorkflowEvent::ClassificationFailed,
            WorkflowError::EmptyQuery => WorkflowEvent::QueryRejected,
            WorkflowError::Synthesis(_) => WorkflowEvent::SynthesisFailed,
            WorkflowError::DeadlineExceeded { .. } => WorkflowEvent::DeadlineExceeded,
            WorkflowError::State(_) | WorkflowError::Transition(_) => {
                WorkflowEvent::InvariantViolated
            }
        };
        if self.advance(ctx, event).is_err() {
            let _ = self.advance(ctx, WorkflowEvent::InvariantViolated);
        }
    }
}

/// Accepted transitions are filed under the step that produced them.
fn audit_category(event: WorkflowEvent) -> AuditCategory {
    match event {
        WorkflowEvent::QueryRejected => AuditCategory::Ingress,
        WorkflowEvent::IntentClassified | WorkflowEvent::ClassificationFailed => {
            AuditCategory::Classification
        }
        WorkflowEvent::DomainsJoined => AuditCategory::Resolution,
        WorkflowEvent::PolicyEvaluated => AuditCategory::Policy,
        WorkflowEvent::AnswerSynthesized | WorkflowEvent::SynthesisFailed => {
            AuditCategory::Synthesis
        }
        WorkflowEvent::DeadlineExceeded | WorkflowEvent::InvariantViolated => AuditCategory::System,
    }
}
