use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::evidence::{
    CatalogResult, Evidence, OrderResult, PaymentResult, Resolution, ResolverKind,
};
use crate::domain::intent::Intent;
use crate::policy::PolicyResult;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("state field `{field}` was already written")]
    AlreadyWritten { field: &'static str },
}

/// A slot that transitions unset -> set at most once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOnce<T> {
    field: &'static str,
    value: Option<T>,
}

impl<T> WriteOnce<T> {
    pub fn new(field: &'static str) -> Self {
        Self { field, value: None }
    }

    pub fn set(&mut self, value: T) -> Result<(), StateError> {
        if self.value.is_some() {
            return Err(StateError::AlreadyWritten { field: self.field });
        }
        self.value = Some(value);
        Ok(())
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn field(&self) -> &'static str {
        self.field
    }
}

/// Per-request record threaded through the workflow. Owned by the engine for
/// one request and never shared.
#[derive(Clone, Debug)]
pub struct RequestState {
    request_id: String,
    received_at: DateTime<Utc>,
    query: String,
    intent: WriteOnce<Intent>,
    catalog_result: WriteOnce<Resolution<CatalogResult>>,
    order_result: WriteOnce<Resolution<OrderResult>>,
    payment_result: WriteOnce<Resolution<PaymentResult>>,
    policy_result: WriteOnce<PolicyResult>,
    final_answer: WriteOnce<String>,
}

impl RequestState {
    pub fn new(query: impl Into<String>) -> Self {
        Self::with_request_id(Uuid::new_v4().to_string(), query)
    }

    pub fn with_request_id(request_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            received_at: Utc::now(),
            query: query.into(),
            intent: WriteOnce::new("intent"),
            catalog_result: WriteOnce::new(ResolverKind::Catalog.field_name()),
            order_result: WriteOnce::new(ResolverKind::Order.field_name()),
            payment_result: WriteOnce::new(ResolverKind::Payment.field_name()),
            policy_result: WriteOnce::new("policy_result"),
            final_answer: WriteOnce::new("final_answer"),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn intent(&self) -> Option<Intent> {
        self.intent.get().copied()
    }

    pub fn catalog_result(&self) -> Option<&Resolution<CatalogResult>> {
        self.catalog_result.get()
    }

    pub fn order_result(&self) -> Option<&Resolution<OrderResult>> {
        self.order_result.get()
    }

    pub fn payment_result(&self) -> Option<&Resolution<PaymentResult>> {
        self.payment_result.get()
    }

    pub fn policy_result(&self) -> Option<&PolicyResult> {
        self.policy_result.get()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.get().map(String::as_str)
    }

    pub fn evidence(&self) -> Evidence<'_> {
        Evidence {
            catalog: self.catalog_result.get(),
            order: self.order_result.get(),
            payment: self.payment_result.get(),
        }
    }

    /// Resolvers whose field has been written, in declaration order.
    pub fn resolved_kinds(&self) -> Vec<ResolverKind> {
        ResolverKind::ALL.into_iter().filter(|kind| self.is_resolved(*kind)).collect()
    }

    pub fn is_resolved(&self, kind: ResolverKind) -> bool {
        match kind {
            ResolverKind::Catalog => self.catalog_result.is_set(),
            ResolverKind::Order => self.order_result.is_set(),
            ResolverKind::Payment => self.payment_result.is_set(),
        }
    }

    pub(crate) fn set_intent(&mut self, intent: Intent) -> Result<(), StateError> {
        self.intent.set(intent)
    }

    /// Writes the one field `write` is tagged with; a second write to it fails.
    pub fn apply_domain(&mut self, write: DomainWrite) -> Result<(), StateError> {
        match write {
            DomainWrite::Catalog(resolution) => self.catalog_result.set(resolution),
            DomainWrite::Order(resolution) => self.order_result.set(resolution),
            DomainWrite::Payment(resolution) => self.payment_result.set(resolution),
        }
    }

    pub(crate) fn set_policy_result(&mut self, result: PolicyResult) -> Result<(), StateError> {
        self.policy_result.set(result)
    }

    pub(crate) fn set_final_answer(&mut self, answer: String) -> Result<(), StateError> {
        self.final_answer.set(answer)
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            request_id: self.request_id.clone(),
            received_at: self.received_at,
            query: self.query.clone(),
            intent: self.intent(),
            catalog_result: self.catalog_result.get().cloned(),
            order_result: self.order_result.get().cloned(),
            payment_result: self.payment_result.get().cloned(),
            policy_result: self.policy_result.get().cloned(),
            final_answer: self.final_answer.get().cloned(),
        }
    }
}

/// The single field a resolver step produces, tagged with the slot it owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainWrite {
    Catalog(Resolution<CatalogResult>),
    Order(Resolution<OrderResult>),
    Payment(Resolution<PaymentResult>),
}

impl DomainWrite {
    /// An `Unavailable` write for the slot `kind` owns.
    pub fn unavailable(kind: ResolverKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match kind {
            ResolverKind::Catalog => Self::Catalog(Resolution::Unavailable { reason }),
            ResolverKind::Order => Self::Order(Resolution::Unavailable { reason }),
            ResolverKind::Payment => Self::Payment(Resolution::Unavailable { reason }),
        }
    }

    pub fn kind(&self) -> ResolverKind {
        match self {
            Self::Catalog(_) => ResolverKind::Catalog,
            Self::Order(_) => ResolverKind::Order,
            Self::Payment(_) => ResolverKind::Payment,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Catalog(resolution) => resolution.status_label(),
            Self::Order(resolution) => resolution.status_label(),
            Self::Payment(resolution) => resolution.status_label(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub request_id: String,
    pub received_at: DateTime<Utc>,
    pub query: String,
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_result: Option<Resolution<CatalogResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_result: Option<Resolution<OrderResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_result: Option<Resolution<PaymentResult>>,
    pub policy_result: Option<PolicyResult>,
    pub final_answer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{DomainWrite, RequestState, StateError, WriteOnce};
    use crate::domain::evidence::{Resolution, ResolverKind};
    use crate::domain::intent::Intent;

    #[test]
    fn write_once_rejects_second_write() {
        let mut slot = WriteOnce::new("intent");
        slot.set(Intent::Order).expect("first write");

        let error = slot.set(Intent::Payment).expect_err("second write must be rejected");
        assert_eq!(error, StateError::AlreadyWritten { field: "intent" });
        assert_eq!(slot.get(), Some(&Intent::Order));
    }

    #[test]
    fn new_state_has_only_query_set() {
        let state = RequestState::new("Where is my order #123?");

        assert_eq!(state.query(), "Where is my order #123?");
        assert!(state.intent().is_none());
        assert!(state.resolved_kinds().is_empty());
        assert!(state.policy_result().is_none());
        assert!(state.final_answer().is_none());
        assert!(!state.request_id().is_empty());
    }

    #[test]
    fn domain_writes_land_in_their_own_field_only() {
        let mut state = RequestState::new("q");
        state
            .apply_domain(DomainWrite::Payment(Resolution::Unavailable {
                reason: "timeout".to_string(),
            }))
            .expect("payment write");

        assert_eq!(state.resolved_kinds(), vec![ResolverKind::Payment]);
        assert!(state.payment_result().is_some_and(Resolution::is_unavailable));
        assert!(state.catalog_result().is_none());
        assert!(state.order_result().is_none());

        let error = state
            .apply_domain(DomainWrite::Payment(Resolution::NotFound {
                reason: "again".to_string(),
            }))
            .expect_err("overwrite is rejected");
        assert_eq!(error, StateError::AlreadyWritten { field: "payment_result" });
    }

    #[test]
    fn snapshot_omits_unrun_domains() {
        let mut state = RequestState::with_request_id("req-1", "q");
        state.set_intent(Intent::Order).expect("intent");
        state
            .apply_domain(DomainWrite::Order(Resolution::NotFound {
                reason: "no order id".to_string(),
            }))
            .expect("order write");

        let json = serde_json::to_value(state.snapshot()).expect("serialize snapshot");
        assert_eq!(json["request_id"], "req-1");
        assert_eq!(json["intent"], "order");
        assert_eq!(json["order_result"]["status"], "not_found");
        assert!(json.get("catalog_result").is_none());
        assert!(json.get("payment_result").is_none());
    }
}
