use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifies one domain resolver and, through it, the state field it owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    Catalog,
    Order,
    Payment,
}

impl ResolverKind {
    pub const ALL: [ResolverKind; 3] = [Self::Catalog, Self::Order, Self::Payment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Order => "order",
            Self::Payment => "payment",
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog_result",
            Self::Order => "order_result",
            Self::Payment => "payment_result",
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one domain lookup. Lookup failures are data, not errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution<T> {
    Found { data: T },
    NotFound { reason: String },
    Unavailable { reason: String },
}

impl<T> Resolution<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Self::Found { data } => Some(data),
            Self::NotFound { .. } | Self::Unavailable { .. } => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Found { .. } => "found",
            Self::NotFound { .. } => "not_found",
            Self::Unavailable { .. } => "unavailable",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Found { .. } => None,
            Self::NotFound { reason } | Self::Unavailable { reason } => Some(reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogResult {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub in_stock: bool,
    pub return_window_days: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delayed,
    Delivered,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub product_id: Option<ProductId>,
    pub placed_at: DateTime<Utc>,
    pub expected_delivery: Option<NaiveDate>,
    pub delivered_on: Option<NaiveDate>,
    pub delay_days: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Captured,
    Failed,
    Refunded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
}

/// Read-only view over whichever domain results a request produced. Absent
/// resolvers contribute `None`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Evidence<'a> {
    pub catalog: Option<&'a Resolution<CatalogResult>>,
    pub order: Option<&'a Resolution<OrderResult>>,
    pub payment: Option<&'a Resolution<PaymentResult>>,
}

impl<'a> Evidence<'a> {
    pub fn catalog(&self) -> Option<&'a CatalogResult> {
        self.catalog.and_then(Resolution::found)
    }

    pub fn order(&self) -> Option<&'a OrderResult> {
        self.order.and_then(Resolution::found)
    }

    pub fn payment(&self) -> Option<&'a PaymentResult> {
        self.payment.and_then(Resolution::found)
    }

    pub fn has_any_found(&self) -> bool {
        self.catalog().is_some() || self.order().is_some() || self.payment().is_some()
    }
}
