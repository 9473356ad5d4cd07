//! Domain resolver steps and the lookup collaborators they call.
//!
//! The three resolvers share one shape: take the query and its parsed
//! entities, call a lookup, and turn whatever comes back into a
//! [`Resolution`]. Lookup errors never escape a resolver.

pub mod fixtures;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    CatalogResult, DomainWrite, OrderResult, PaymentResult, QueryEntities, Resolution,
    ResolverKind,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup timed out after {0} ms")]
    Timeout(u64),
    #[error("malformed identifier `{0}`")]
    MalformedIdentifier(String),
    #[error("backend unavailable: {0}")]
    Backend(String),
}

/// Input handed to every lookup. Resolvers never see the shared state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupRequest<'a> {
    pub query: &'a str,
    pub entities: &'a QueryEntities,
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn lookup_catalog(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<CatalogResult>, LookupError>;
}

#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn lookup_order(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<OrderResult>, LookupError>;
}

#[async_trait]
pub trait PaymentLookup: Send + Sync {
    async fn lookup_payment(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<PaymentResult>, LookupError>;
}

/// The lookup collaborators one engine instance resolves against.
#[derive(Clone)]
pub struct LookupSet {
    pub catalog: Arc<dyn CatalogLookup>,
    pub order: Arc<dyn OrderLookup>,
    pub payment: Arc<dyn PaymentLookup>,
}

impl LookupSet {
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        order: Arc<dyn OrderLookup>,
        payment: Arc<dyn PaymentLookup>,
    ) -> Self {
        Self { catalog, order, payment }
    }

    pub fn fixtures() -> Self {
        let store = Arc::new(fixtures::FixtureStore::demo());
        Self { catalog: store.clone(), order: store.clone(), payment: store }
    }

    /// Runs the resolver for `kind` and returns the one field it owns.
    pub async fn resolve(
        &self,
        kind: ResolverKind,
        query: &str,
        entities: &QueryEntities,
    ) -> DomainWrite {
        let request = LookupRequest { query, entities };
        match kind {
            ResolverKind::Catalog => DomainWrite::Catalog(
                settle(kind, self.catalog.lookup_catalog(&request).await, "no matching product"),
            ),
            ResolverKind::Order => {
                if entities.order_id.is_none() {
                    return DomainWrite::Order(insufficient(kind));
                }
                DomainWrite::Order(settle(
                    kind,
                    self.order.lookup_order(&request).await,
                    "no order matches that identifier",
                ))
            }
            ResolverKind::Payment => {
                if entities.order_id.is_none() {
                    return DomainWrite::Payment(insufficient(kind));
                }
                DomainWrite::Payment(settle(
                    kind,
                    self.payment.lookup_payment(&request).await,
                    "no payment is recorded for that order",
                ))
            }
        }
    }
}

fn insufficient<T>(kind: ResolverKind) -> Resolution<T> {
    debug!(
        event_name = "resolver.insufficient_information",
        resolver = kind.as_str(),
        "query carries no order identifier"
    );
    Resolution::NotFound {
        reason: "insufficient information: no order id in the query".to_string(),
    }
}

fn settle<T>(
    kind: ResolverKind,
    outcome: Result<Option<T>, LookupError>,
    not_found: &str,
) -> Resolution<T> {
    match outcome {
        Ok(Some(data)) => Resolution::Found { data },
        Ok(None) => Resolution::NotFound { reason: not_found.to_string() },
        Err(error) => {
            warn!(
                event_name = "resolver.lookup_failed",
                resolver = kind.as_str(),
                error = %error,
                "lookup failed; recording domain as unavailable"
            );
            Resolution::Unavailable { reason: error.to_string() }
        }
    }
}
