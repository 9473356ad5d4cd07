//! In-memory lookups standing in for the catalog, order and payment services.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use super::{CatalogLookup, LookupError, LookupRequest, OrderLookup, PaymentLookup};
use crate::domain::{
    CatalogResult, OrderId, OrderResult, OrderStatus, PaymentResult, PaymentStatus, ProductId,
    ResolverKind,
};

#[derive(Clone, Debug)]
struct CatalogEntry {
    result: CatalogResult,
    keywords: Vec<&'static str>,
}

#[derive(Clone, Debug, Default)]
pub struct FixtureStore {
    products: Vec<CatalogEntry>,
    orders: BTreeMap<String, OrderResult>,
    payments: BTreeMap<String, PaymentResult>,
    latency: Option<Duration>,
    outages: BTreeSet<ResolverKind>,
}

impl FixtureStore {
    pub fn demo() -> Self {
        Self::demo_at(Utc::now().date_naive())
    }

    /// Demo data with delivery dates relative to `today`.
    pub fn demo_at(today: NaiveDate) -> Self {
        let mut store = Self::default();

        store.add_product(
            product("headphones", "Wireless Headphones", 12_999, true, 30),
            &["headphones", "headphone", "earbuds", "wireless"],
        );
        store.add_product(
            product("smartwatch", "Smart Watch Series 5", 24_900, false, 14),
            &["watch", "smartwatch"],
        );
        store.add_product(
            product("laptop-stand", "Aluminium Laptop Stand", 4_500, true, 60),
            &["stand", "laptop"],
        );
        store.add_product(
            product("coffee-maker", "Drip Coffee Maker", 8_950, true, 30),
            &["coffee", "maker", "brewer"],
        );

        let days_ago = |days: u64| today.checked_sub_days(Days::new(days)).unwrap_or(today);
        let placed = |date: NaiveDate| {
            Utc.from_utc_datetime(&date.and_hms_opt(10, 0, 0).unwrap_or_default())
        };

        store.add_order(OrderResult {
            order_id: OrderId("123".to_string()),
            status: OrderStatus::Delayed,
            product_id: Some(ProductId("headphones".to_string())),
            placed_at: placed(days_ago(18)),
            expected_delivery: Some(days_ago(10)),
            delivered_on: None,
            delay_days: 10,
        });
        store.add_order(OrderResult {
            order_id: OrderId("456".to_string()),
            status: OrderStatus::Delivered,
            product_id: Some(ProductId("smartwatch".to_string())),
            placed_at: placed(days_ago(12)),
            expected_delivery: Some(days_ago(6)),
            delivered_on: Some(days_ago(5)),
            delay_days: 0,
        });
        store.add_order(OrderResult {
            order_id: OrderId("789".to_string()),
            status: OrderStatus::Cancelled,
            product_id: Some(ProductId("coffee-maker".to_string())),
            placed_at: placed(days_ago(4)),
            expected_delivery: None,
            delivered_on: None,
            delay_days: 0,
        });
        store.add_order(OrderResult {
            order_id: OrderId("1001".to_string()),
            status: OrderStatus::Shipped,
            product_id: Some(ProductId("laptop-stand".to_string())),
            placed_at: placed(days_ago(2)),
            expected_delivery: Some(today),
            delivered_on: None,
            delay_days: 0,
        });

        store.add_payment(payment("123", PaymentStatus::Failed, 12_999, "card"));
        store.add_payment(payment("456", PaymentStatus::Captured, 24_900, "card"));
        store.add_payment(payment("789", PaymentStatus::Captured, 8_950, "paypal"));
        store.add_payment(payment("1001", PaymentStatus::Pending, 4_500, "bank_transfer"));

        store
    }

    pub fn add_product(&mut self, result: CatalogResult, keywords: &[&'static str]) {
        self.products.push(CatalogEntry { result, keywords: keywords.to_vec() });
    }

    pub fn add_order(&mut self, order: OrderResult) {
        self.orders.insert(order.order_id.0.clone(), order);
    }

    pub fn add_payment(&mut self, payment: PaymentResult) {
        self.payments.insert(payment.order_id.0.clone(), payment);
    }

    /// Every lookup sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Lookups for `kind` fail with a backend error.
    pub fn with_outage(mut self, kind: ResolverKind) -> Self {
        self.outages.insert(kind);
        self
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    async fn simulate(&self, kind: ResolverKind) -> Result<(), LookupError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.outages.contains(&kind) {
            return Err(LookupError::Backend(format!("{kind} service is not responding")));
        }
        Ok(())
    }

    fn order_for(&self, request: &LookupRequest<'_>) -> Option<&OrderResult> {
        let order_id = request.entities.order_id.as_ref()?;
        self.orders.get(&order_id.0)
    }
}

#[async_trait]
impl CatalogLookup for FixtureStore {
    async fn lookup_catalog(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<CatalogResult>, LookupError> {
        self.simulate(ResolverKind::Catalog).await?;

        let by_keyword = self.products.iter().find(|entry| {
            entry.keywords.iter().any(|keyword| request.entities.mentions(keyword))
        });
        if let Some(entry) = by_keyword {
            return Ok(Some(entry.result.clone()));
        }

        let ordered_product = self.order_for(request).and_then(|order| order.product_id.as_ref());
        Ok(ordered_product.and_then(|product_id| {
            self.products
                .iter()
                .find(|entry| entry.result.product_id == *product_id)
                .map(|entry| entry.result.clone())
        }))
    }
}

#[async_trait]
impl OrderLookup for FixtureStore {
    async fn lookup_order(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<OrderResult>, LookupError> {
        self.simulate(ResolverKind::Order).await?;
        Ok(self.order_for(request).cloned())
    }
}

#[async_trait]
impl PaymentLookup for FixtureStore {
    async fn lookup_payment(
        &self,
        request: &LookupRequest<'_>,
    ) -> Result<Option<PaymentResult>, LookupError> {
        self.simulate(ResolverKind::Payment).await?;
        let Some(order_id) = request.entities.order_id.as_ref() else {
            return Ok(None);
        };
        Ok(self.payments.get(&order_id.0).cloned())
    }
}

fn product(
    id: &str,
    name: &str,
    price_cents: i64,
    in_stock: bool,
    return_window_days: u32,
) -> CatalogResult {
    CatalogResult {
        product_id: ProductId(id.to_string()),
        name: name.to_string(),
        price: Decimal::new(price_cents, 2),
        in_stock,
        return_window_days,
    }
}

fn payment(order_id: &str, status: PaymentStatus, amount_cents: i64, method: &str) -> PaymentResult {
    PaymentResult {
        order_id: OrderId(order_id.to_string()),
        status,
        amount: Decimal::new(amount_cents, 2),
        currency: "USD".to_string(),
        method: method.to_string(),
    }
}
