pub mod entities;
pub mod evidence;
pub mod intent;
pub mod state;

pub use entities::QueryEntities;
pub use evidence::{
    CatalogResult, Evidence, OrderId, OrderResult, OrderStatus, PaymentResult, PaymentStatus,
    ProductId, Resolution, ResolverKind,
};
pub use intent::Intent;
pub use state::{DomainWrite, RequestSnapshot, RequestState, StateError, WriteOnce};
