use async_trait::async_trait;

use crate::domain::{OrderStatus, PaymentStatus, RequestState, Resolution};
use crate::errors::SynthesisError;
use crate::policy::EligibilityVerdict;

/// Language-model side of answer generation. Reads the accumulated state.
#[async_trait]
pub trait ResponseModel: Send + Sync {
    async fn synthesize(&self, state: &RequestState) -> Result<String, SynthesisError>;
}

/// Rejects blank completions so a request never succeeds with an empty answer.
pub fn require_answer(answer: String) -> Result<String, SynthesisError> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return Err(SynthesisError::new("model returned an empty answer"));
    }
    Ok(trimmed.to_string())
}

/// One sentence per piece of evidence the request actually gathered. Domains
/// that were not run contribute nothing; failed ones are reported as such.
pub fn evidence_facts(state: &RequestState) -> Vec<String> {
    let mut facts = Vec::new();

    match state.catalog_result() {
        Some(Resolution::Found { data }) => facts.push(format!(
            "{} costs ${} and is {}; it can be returned within {} days of delivery.",
            data.name,
            data.price,
            if data.in_stock { "in stock" } else { "currently out of stock" },
            data.return_window_days
        )),
        Some(Resolution::NotFound { .. }) => {
            facts.push("I could not find a matching product in the catalog.".to_string())
        }
        Some(Resolution::Unavailable { .. }) => {
            facts.push("Product information is unavailable right now.".to_string())
        }
        None => {}
    }

    match state.order_result() {
        Some(Resolution::Found { data }) => {
            let status = match data.status {
                OrderStatus::Processing => "is being processed".to_string(),
                OrderStatus::Shipped => "has shipped".to_string(),
                OrderStatus::Delayed => format!("is delayed by {} days", data.delay_days),
                OrderStatus::Delivered => match data.delivered_on {
                    Some(date) => format!("was delivered on {date}"),
                    None => "was delivered".to_string(),
                },
                OrderStatus::Cancelled => "was cancelled".to_string(),
            };
            facts.push(format!("Order #{} {status}.", data.order_id.0));
        }
        Some(Resolution::NotFound { .. }) => {
            facts.push("I could not locate that order; please include the order number.".to_string())
        }
        Some(Resolution::Unavailable { .. }) => {
            facts.push("Order information is unavailable right now.".to_string())
        }
        None => {}
    }

    match state.payment_result() {
        Some(Resolution::Found { data }) => {
            let status = match data.status {
                PaymentStatus::Pending => "is still pending",
                PaymentStatus::Captured => "was captured",
                PaymentStatus::Failed => "failed",
                PaymentStatus::Refunded => "has been refunded",
            };
            facts.push(format!(
                "The {} {} payment of {} for order #{} {status}.",
                data.currency, data.method, data.amount, data.order_id.0
            ));
        }
        Some(Resolution::NotFound { .. }) => {
            facts.push("I could not find a payment for that order.".to_string())
        }
        Some(Resolution::Unavailable { .. }) => {
            facts.push("Payment information is unavailable right now.".to_string())
        }
        None => {}
    }

    if let Some(policy) = state.policy_result() {
        let sentence = match policy.verdict {
            EligibilityVerdict::ExpeditedRefund => "You are eligible for an expedited refund.",
            EligibilityVerdict::Refund => "You are eligible for a refund.",
            EligibilityVerdict::Return => "You are eligible to return this item.",
            EligibilityVerdict::CourtesyCredit => "You are eligible for a courtesy credit.",
            EligibilityVerdict::NotEligible => {
                "Based on what I found, no refund or return applies."
            }
            EligibilityVerdict::InsufficientInformation => "",
        };
        if !sentence.is_empty() {
            facts.push(sentence.to_string());
        }
    }

    facts
}

/// Deterministic answer assembled from the evidence alone. Used as the
/// degraded path when the generation collaborator fails and fallback is on.
pub fn compose_fallback_answer(state: &RequestState) -> String {
    let facts = evidence_facts(state);
    if facts.is_empty() {
        return "I could not find enough information to answer your question. \
                Please include an order number or product name."
            .to_string();
    }
    facts.join(" ")
}
