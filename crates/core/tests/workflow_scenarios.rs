use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use triage_core::audit::{AuditCategory, InMemoryAuditSink};
use triage_core::classifier::IntentModel;
use triage_core::domain::{
    CatalogResult, Intent, OrderResult, PaymentResult, RequestState, Resolution, ResolverKind,
};
use triage_core::errors::{ClassificationError, SynthesisError, WorkflowError};
use triage_core::flows::{EngineOptions, WorkflowEngine, WorkflowState};
use triage_core::policy::EligibilityVerdict;
use triage_core::resolvers::fixtures::FixtureStore;
use triage_core::resolvers::{
    CatalogLookup, LookupError, LookupRequest, LookupSet, OrderLookup, PaymentLookup,
};
use triage_core::synthesis::{evidence_facts, ResponseModel};

struct ScriptedIntent {
    label: Result<&'static str, &'static str>,
    delay: Option<Duration>,
}

impl ScriptedIntent {
    fn label(label: &'static str) -> Arc<Self> {
        Arc::new(Self { label: Ok(label), delay: None })
    }

    fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self { label: Err(message), delay: None })
    }
}

#[async_trait]
impl IntentModel for ScriptedIntent {
    async fn classify(&self, _query: &str) -> Result<String, ClassificationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.label.map(str::to_string).map_err(ClassificationError::new)
    }
}

/// Answers with the evidence facts joined, so tests can see what it read.
struct FactsResponder;

#[async_trait]
impl ResponseModel for FactsResponder {
    async fn synthesize(&self, state: &RequestState) -> Result<String, SynthesisError> {
        Ok(evidence_facts(state).join(" "))
    }
}

struct FailingResponder(&'static str);

#[async_trait]
impl ResponseModel for FailingResponder {
    async fn synthesize(&self, _state: &RequestState) -> Result<String, SynthesisError> {
        if self.0.is_empty() {
            return Ok("   ".to_string());
        }
        Err(SynthesisError::new(self.0))
    }
}

/// Wraps the fixture store and records when each lookup starts and ends.
struct RecordingLookups {
    inner: FixtureStore,
    calls: AtomicUsize,
    spans: Mutex<Vec<(ResolverKind, Instant, Instant)>>,
}

impl RecordingLookups {
    fn new(inner: FixtureStore) -> Arc<Self> {
        Arc::new(Self { inner, calls: AtomicUsize::new(0), spans: Mutex::new(Vec::new()) })
    }

    fn lookup_set(self: &Arc<Self>) -> LookupSet {
        LookupSet::new(self.clone(), self.clone(), self.clone())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn spans(&self) -> Vec<(ResolverKind, Instant, Instant)> {
        self.spans.lock().expect("spans lock").clone()
    }

    fn record(&self, kind: ResolverKind, started: Instant) {
        self.spans.lock().expect("spans lock").push((kind, started, Instant::now()));
    }
}

#[async_trait]
impl CatalogLookup for RecordingLookups {
    async fn lookup_catalog(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<CatalogResult>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.lookup_catalog(request).await;
        self.record(ResolverKind::Catalog, started);
        result
    }
}

#[async_trait]
impl OrderLookup for RecordingLookups {
    async fn lookup_order(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<OrderResult>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.lookup_order(request).await;
        self.record(ResolverKind::Order, started);
        result
    }
}

#[async_trait]
impl PaymentLookup for RecordingLookups {
    async fn lookup_payment(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<PaymentResult>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.inner.lookup_payment(request).await;
        self.record(ResolverKind::Payment, started);
        result
    }
}

fn engine(
    intent: Arc<dyn IntentModel>,
    responder: Arc<dyn ResponseModel>,
    lookups: LookupSet,
) -> WorkflowEngine {
    WorkflowEngine::new(intent, responder, lookups)
}

#[tokio::test]
async fn order_intent_runs_only_the_order_resolver() {
    let lookups = RecordingLookups::new(FixtureStore::demo());
    let engine =
        engine(ScriptedIntent::label("order"), Arc::new(FactsResponder), lookups.lookup_set());

    let run = engine.run("Where is my order #123?").await.expect("workflow completes");

    assert_eq!(run.terminal(), WorkflowState::Complete);
    assert_eq!(run.state.intent(), Some(Intent::Order));
    assert_eq!(run.selected, vec![ResolverKind::Order]);
    assert_eq!(run.state.resolved_kinds(), vec![ResolverKind::Order]);
    assert!(run.state.catalog_result().is_none());
    assert!(run.state.payment_result().is_none());
    assert_eq!(lookups.calls(), 1);

    let order = run.state.order_result().and_then(Resolution::found).expect("order found");
    assert_eq!(order.order_id.0, "123");
    assert!(run.answer().contains("delayed"), "answer: {}", run.answer());

    let policy = run.state.policy_result().expect("policy evaluated");
    assert_eq!(policy.verdict, EligibilityVerdict::CourtesyCredit);
    assert_eq!(policy.considered, vec![ResolverKind::Order]);
}

#[tokio::test]
async fn multiple_intent_fills_every_domain_field() {
    let lookups = RecordingLookups::new(FixtureStore::demo());
    let engine =
        engine(ScriptedIntent::label("multiple"), Arc::new(FactsResponder), lookups.lookup_set());

    let run = engine
        .run("My order #123 headphones are late and my payment failed, can I get a refund?")
        .await
        .expect("workflow completes");

    assert_eq!(run.state.resolved_kinds(), ResolverKind::ALL.to_vec());
    assert_eq!(lookups.calls(), 3);

    let policy = run.state.policy_result().expect("policy evaluated");
    assert_eq!(policy.verdict, EligibilityVerdict::ExpeditedRefund);
    assert_eq!(policy.fired_rules[0].id, "failed-payment-delayed-order");
}

#[tokio::test]
async fn selected_resolvers_run_concurrently() {
    let latency = Duration::from_millis(80);
    let lookups = RecordingLookups::new(FixtureStore::demo().with_latency(latency));
    let engine =
        engine(ScriptedIntent::label("multiple"), Arc::new(FactsResponder), lookups.lookup_set());

    let run = engine.run("order #456 smartwatch refund").await.expect("workflow completes");

    let spans = lookups.spans();
    assert_eq!(spans.len(), 3);
    let latest_start = spans.iter().map(|(_, start, _)| *start).max().expect("starts");
    let earliest_end = spans.iter().map(|(_, _, end)| *end).min().expect("ends");
    assert!(latest_start < earliest_end, "resolver executions should overlap");
    assert!(
        run.elapsed < latency * 3,
        "three {latency:?} lookups took {:?}; they ran sequentially",
        run.elapsed
    );
}

#[tokio::test]
async fn classification_failure_stops_before_any_resolver() {
    let audit = InMemoryAuditSink::default();
    let lookups = RecordingLookups::new(FixtureStore::demo());
    let engine = engine(
        ScriptedIntent::failing("model unreachable"),
        Arc::new(FactsResponder),
        lookups.lookup_set(),
    )
    .with_audit_sink(Arc::new(audit.clone()));

    let failure = engine.run("Where is my order #123?").await.expect_err("classification fails");

    assert!(matches!(failure.error, WorkflowError::Classification(_)));
    assert_eq!(failure.terminal(), WorkflowState::Failed);
    assert_eq!(lookups.calls(), 0);
    assert!(failure.state.intent().is_none());
    assert!(failure.state.resolved_kinds().is_empty());
    assert!(failure.state.final_answer().is_none());

    let events = audit.events_for(failure.state.request_id());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("Failed"));
    assert_eq!(events[0].category, AuditCategory::Classification);
}

#[tokio::test]
async fn resolver_outage_is_captured_and_workflow_completes() {
    let lookups =
        RecordingLookups::new(FixtureStore::demo().with_outage(ResolverKind::Payment));
    let engine =
        engine(ScriptedIntent::label("multiple"), Arc::new(FactsResponder), lookups.lookup_set());

    let run = engine.run("was order #456 charged?").await.expect("outage is not fatal");

    assert_eq!(run.terminal(), WorkflowState::Complete);
    let payment = run.state.payment_result().expect("payment field written");
    assert!(payment.is_unavailable());
    assert!(run.state.order_result().and_then(Resolution::found).is_some());

    let policy = run.state.policy_result().expect("policy evaluated");
    assert!(
        policy.notes.iter().any(|note| note.contains("payment data unavailable")),
        "notes: {:?}",
        policy.notes
    );
    assert!(run.state.catalog_result().and_then(Resolution::found).is_some());
    assert!(
        run.answer().contains("Payment information is unavailable"),
        "answer: {}",
        run.answer()
    );
    for payment_claim in ["payment of", "was captured", "has been refunded", "is still pending"] {
        assert!(
            !run.answer().contains(payment_claim),
            "answer makes a payment claim ({payment_claim}): {}",
            run.answer()
        );
    }
}

struct PanickingCatalog;

#[async_trait]
impl CatalogLookup for PanickingCatalog {
    async fn lookup_catalog(
        &self,
        _request: &LookupRequest<'_>,
    ) -> Result<Option<CatalogResult>, LookupError> {
        panic!("catalog client bug");
    }
}

#[tokio::test]
async fn panicking_lookup_leaves_sibling_resolvers_intact() {
    let store = Arc::new(FixtureStore::demo());
    let lookups = LookupSet::new(Arc::new(PanickingCatalog), store.clone(), store);
    let engine = engine(ScriptedIntent::label("multiple"), Arc::new(FactsResponder), lookups);

    let run = tokio::spawn(async move { engine.run("order #123").await })
        .await
        .expect("request task survives the panic")
        .expect("workflow completes");

    assert_eq!(run.terminal(), WorkflowState::Complete);
    let catalog = run.state.catalog_result().expect("catalog field written");
    assert!(catalog.is_unavailable());
    assert_eq!(catalog.reason(), Some("resolver panicked"));
    assert!(run.state.order_result().and_then(Resolution::found).is_some());
    assert!(run.state.payment_result().and_then(Resolution::found).is_some());
    assert!(run.state.final_answer().is_some());
}

#[tokio::test]
async fn unknown_order_yields_not_found_without_failing() {
    let engine = engine(
        ScriptedIntent::label("order"),
        Arc::new(FactsResponder),
        LookupSet::fixtures(),
    );

    let run = engine.run("status of order #999999").await.expect("workflow completes");

    let order = run.state.order_result().expect("order field written");
    assert_eq!(order.status_label(), "not_found");
    assert_eq!(
        run.state.policy_result().map(|policy| policy.verdict),
        Some(EligibilityVerdict::InsufficientInformation)
    );
}

#[tokio::test]
async fn unrecognised_label_routes_to_all_resolvers() {
    let engine = engine(
        ScriptedIntent::label("shipping question"),
        Arc::new(FactsResponder),
        LookupSet::fixtures(),
    );

    let run = engine.run("order #1001").await.expect("workflow completes");

    assert_eq!(run.state.intent(), Some(Intent::Multiple));
    assert_eq!(run.selected, ResolverKind::ALL.to_vec());
}

#[tokio::test]
async fn synthesis_failure_is_fatal_after_policy_ran() {
    let engine = engine(
        ScriptedIntent::label("payment"),
        Arc::new(FailingResponder("rate limited")),
        LookupSet::fixtures(),
    );

    let failure = engine.run("was order #456 charged twice?").await.expect_err("synthesis fails");

    assert!(matches!(failure.error, WorkflowError::Synthesis(_)));
    assert_eq!(failure.terminal(), WorkflowState::Failed);
    assert!(failure.state.policy_result().is_some());
    assert!(failure.state.final_answer().is_none());
}

#[tokio::test]
async fn blank_synthesis_counts_as_failure() {
    let engine =
        engine(ScriptedIntent::label("order"), Arc::new(FailingResponder("")), LookupSet::fixtures());

    let error = engine.answer("order #123").await.expect_err("blank answer rejected");
    assert_eq!(error.kind(), "synthesis_error");
}

#[tokio::test]
async fn fallback_synthesis_composes_answer_from_evidence() {
    let engine = engine(
        ScriptedIntent::label("order"),
        Arc::new(FailingResponder("model overloaded")),
        LookupSet::fixtures(),
    )
    .with_options(EngineOptions { fallback_synthesis: true, ..EngineOptions::default() });

    let run = engine.run("order #789").await.expect("fallback completes");

    assert!(run.degraded_synthesis);
    assert_eq!(run.terminal(), WorkflowState::Complete);
    assert!(run.answer().contains("789"), "answer: {}", run.answer());
}

#[tokio::test]
async fn deadline_moves_request_to_failed() {
    let intent = Arc::new(ScriptedIntent {
        label: Ok("order"),
        delay: Some(Duration::from_millis(200)),
    });
    let engine = engine(intent, Arc::new(FactsResponder), LookupSet::fixtures()).with_options(
        EngineOptions { deadline: Some(Duration::from_millis(20)), fallback_synthesis: false },
    );

    let failure = engine.run("order #123").await.expect_err("deadline exceeded");

    assert!(matches!(failure.error, WorkflowError::DeadlineExceeded { deadline_ms: 20 }));
    assert_eq!(failure.terminal(), WorkflowState::Failed);
    assert!(failure.state.final_answer().is_none());
}

#[tokio::test]
async fn empty_query_is_rejected_without_classifying() {
    let engine =
        engine(ScriptedIntent::failing("unused"), Arc::new(FactsResponder), LookupSet::fixtures());

    let failure = engine.run("   ").await.expect_err("empty query rejected");

    assert!(matches!(failure.error, WorkflowError::EmptyQuery));
    assert_eq!(failure.terminal(), WorkflowState::Failed);
}

#[tokio::test]
async fn caller_supplied_request_id_is_kept() {
    let audit = InMemoryAuditSink::default();
    let engine =
        engine(ScriptedIntent::label("catalog"), Arc::new(FactsResponder), LookupSet::fixtures())
            .with_audit_sink(Arc::new(audit.clone()));

    let state = RequestState::with_request_id("req-fixed-1", "do the headphones come in stock?");
    let run = engine.run_with_state(state).await.expect("workflow completes");

    assert_eq!(run.state.request_id(), "req-fixed-1");
    let categories = audit
        .events_for("req-fixed-1")
        .into_iter()
        .map(|event| event.category)
        .collect::<Vec<_>>();
    assert_eq!(
        categories,
        vec![
            AuditCategory::Classification,
            AuditCategory::Resolution,
            AuditCategory::Policy,
            AuditCategory::Synthesis,
        ]
    );
    assert_eq!(
        run.state.policy_result().map(|policy| policy.verdict),
        Some(EligibilityVerdict::InsufficientInformation)
    );
}

#[tokio::test]
async fn concurrent_requests_keep_separate_state() {
    let engine = Arc::new(engine(
        ScriptedIntent::label("order"),
        Arc::new(FactsResponder),
        LookupSet::fixtures(),
    ));

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run("order #123").await }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run("order #456").await }
    });

    let first = first.await.expect("join").expect("first completes");
    let second = second.await.expect("join").expect("second completes");

    assert_ne!(first.state.request_id(), second.state.request_id());
    let order_id = |run: &triage_core::flows::WorkflowRun| {
        run.state.order_result().and_then(Resolution::found).map(|order| order.order_id.0.clone())
    };
    assert_eq!(order_id(&first).as_deref(), Some("123"));
    assert_eq!(order_id(&second).as_deref(), Some("456"));
}
