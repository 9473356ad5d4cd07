//! Refund/return eligibility over whatever domain evidence a request gathered.
//!
//! Rules are configuration: an ordered list of `condition -> verdict` pairs.
//! The first rule that fires decides the verdict; every rule that fires is
//! reported. Conditions that reference evidence the request does not have
//! simply do not fire, so any combination of present/absent results is legal.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Evidence, OrderStatus, PaymentStatus, ResolverKind};

pub const DEFAULT_DELAY_THRESHOLD_DAYS: u32 = 7;
pub const DEFAULT_RETURN_WINDOW_DAYS: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityVerdict {
    ExpeditedRefund,
    Refund,
    Return,
    CourtesyCredit,
    NotEligible,
    InsufficientInformation,
}

impl EligibilityVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExpeditedRefund => "expedited_refund",
            Self::Refund => "refund",
            Self::Return => "return",
            Self::CourtesyCredit => "courtesy_credit",
            Self::NotEligible => "not_eligible",
            Self::InsufficientInformation => "insufficient_information",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    PaymentStatus { is: PaymentStatus },
    OrderStatus { is: OrderStatus },
    OrderDelayedAtLeast { days: u32 },
    DeliveredWithinDays { days: u32 },
    WithinProductReturnWindow,
    All { conditions: Vec<RuleCondition> },
}

impl RuleCondition {
    fn holds(&self, evidence: &Evidence<'_>, today: NaiveDate) -> bool {
        match self {
            Self::PaymentStatus { is } => evidence.payment().is_some_and(|p| p.status == *is),
            Self::OrderStatus { is } => evidence.order().is_some_and(|o| o.status == *is),
            Self::OrderDelayedAtLeast { days } => {
                evidence.order().is_some_and(|o| o.delay_days >= *days)
            }
            Self::DeliveredWithinDays { days } => evidence
                .order()
                .and_then(|o| o.delivered_on)
                .is_some_and(|delivered| days_between(delivered, today) <= i64::from(*days)),
            Self::WithinProductReturnWindow => {
                match (evidence.order().and_then(|o| o.delivered_on), evidence.catalog()) {
                    (Some(delivered), Some(product)) => {
                        days_between(delivered, today) <= i64::from(product.return_window_days)
                    }
                    _ => false,
                }
            }
            Self::All { conditions } => {
                !conditions.is_empty() && conditions.iter().all(|c| c.holds(evidence, today))
            }
        }
    }

    fn validate(&self, rule_id: &str) -> Result<(), PolicyConfigError> {
        match self {
            Self::All { conditions } if conditions.is_empty() => {
                Err(PolicyConfigError::EmptyCondition { rule_id: rule_id.to_string() })
            }
            Self::All { conditions } => {
                conditions.iter().try_for_each(|condition| condition.validate(rule_id))
            }
            _ => Ok(()),
        }
    }
}

fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days().max(0)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub description: String,
    pub when: RuleCondition,
    pub verdict: EligibilityVerdict,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyConfigError {
    #[error("policy rule ids must be unique; `{rule_id}` appears more than once")]
    DuplicateRule { rule_id: String },
    #[error("policy rule id must not be empty")]
    MissingRuleId,
    #[error("policy rule `{rule_id}` has an `all` condition with no members")]
    EmptyCondition { rule_id: String },
    #[error("policy rule `{rule_id}` cannot produce verdict `{verdict}`")]
    ReservedVerdict { rule_id: String, verdict: &'static str },
}

/// Ordered, read-only rule list consumed by the evaluator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRuleSet {
    pub rules: Vec<PolicyRule>,
}

impl Default for PolicyRuleSet {
    fn default() -> Self {
        Self::with_thresholds(DEFAULT_DELAY_THRESHOLD_DAYS, DEFAULT_RETURN_WINDOW_DAYS)
    }
}

impl PolicyRuleSet {
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self, PolicyConfigError> {
        let rule_set = Self { rules };
        rule_set.validate()?;
        Ok(rule_set)
    }

    pub fn with_thresholds(delay_days: u32, return_window_days: u32) -> Self {
        use EligibilityVerdict::{CourtesyCredit, ExpeditedRefund, Refund, Return};
        use RuleCondition::{All, DeliveredWithinDays, OrderDelayedAtLeast};

        let rule = |id: &str, description: String, when, verdict| PolicyRule {
            id: id.to_string(),
            description,
            when,
            verdict,
        };
        let payment_failed = RuleCondition::PaymentStatus { is: PaymentStatus::Failed };

        Self {
            rules: vec![
                rule(
                    "failed-payment-delayed-order",
                    format!(
                        "Payment failed and the order is delayed {delay_days}+ days: expedite the refund"
                    ),
                    All {
                        conditions: vec![
                            payment_failed.clone(),
                            OrderDelayedAtLeast { days: delay_days },
                        ],
                    },
                    ExpeditedRefund,
                ),
                rule(
                    "failed-payment",
                    "Payment failed: any captured amount is refundable".to_string(),
                    payment_failed,
                    Refund,
                ),
                rule(
                    "cancelled-order-captured-payment",
                    "Order was cancelled after payment was captured".to_string(),
                    All {
                        conditions: vec![
                            RuleCondition::OrderStatus { is: OrderStatus::Cancelled },
                            RuleCondition::PaymentStatus { is: PaymentStatus::Captured },
                        ],
                    },
                    Refund,
                ),
                rule(
                    "product-return-window",
                    "Delivered within the product's return window".to_string(),
                    RuleCondition::WithinProductReturnWindow,
                    Return,
                ),
                rule(
                    "default-return-window",
                    format!("Delivered within the standard {return_window_days}-day return window"),
                    DeliveredWithinDays { days: return_window_days },
                    Return,
                ),
                rule(
                    "delayed-order-credit",
                    format!("Order delayed {delay_days}+ days: offer a courtesy credit"),
                    OrderDelayedAtLeast { days: delay_days },
                    CourtesyCredit,
                ),
            ],
        }
    }

    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(PolicyConfigError::MissingRuleId);
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(PolicyConfigError::DuplicateRule { rule_id: rule.id.clone() });
            }
            if rule.verdict == EligibilityVerdict::InsufficientInformation {
                return Err(PolicyConfigError::ReservedVerdict {
                    rule_id: rule.id.clone(),
                    verdict: rule.verdict.as_str(),
                });
            }
            rule.when.validate(&rule.id)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredRule {
    pub id: String,
    pub description: String,
    pub verdict: EligibilityVerdict,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub verdict: EligibilityVerdict,
    pub fired_rules: Vec<FiredRule>,
    pub considered: Vec<ResolverKind>,
    pub notes: Vec<String>,
}

pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, evidence: &Evidence<'_>) -> PolicyResult;
}

#[derive(Clone, Debug, Default)]
pub struct RuleBasedPolicyEngine {
    rules: PolicyRuleSet,
    reference_date: Option<NaiveDate>,
}

impl RuleBasedPolicyEngine {
    pub fn new(rules: PolicyRuleSet) -> Self {
        Self { rules, reference_date: None }
    }

    /// Pins "today" for date-window rules.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn rules(&self) -> &PolicyRuleSet {
        &self.rules
    }
}

impl PolicyEngine for RuleBasedPolicyEngine {
    fn evaluate(&self, evidence: &Evidence<'_>) -> PolicyResult {
        let today = self.reference_date.unwrap_or_else(|| Utc::now().date_naive());
        evaluate_rules(&self.rules, evidence, today)
    }
}

pub fn evaluate_rules(
    rules: &PolicyRuleSet,
    evidence: &Evidence<'_>,
    today: NaiveDate,
) -> PolicyResult {
    let considered = considered_domains(evidence);
    let mut notes = degraded_notes(evidence);

    if evidence.order().is_none() && evidence.payment().is_none() {
        notes.push(
            "no order or payment evidence is available, so eligibility cannot be determined"
                .to_string(),
        );
        return PolicyResult {
            verdict: EligibilityVerdict::InsufficientInformation,
            fired_rules: Vec::new(),
            considered,
            notes,
        };
    }

    let fired_rules = rules
        .rules
        .iter()
        .filter(|rule| rule.when.holds(evidence, today))
        .map(|rule| FiredRule {
            id: rule.id.clone(),
            description: rule.description.clone(),
            verdict: rule.verdict,
        })
        .collect::<Vec<_>>();

    let verdict =
        fired_rules.first().map(|rule| rule.verdict).unwrap_or(EligibilityVerdict::NotEligible);

    PolicyResult { verdict, fired_rules, considered, notes }
}

fn considered_domains(evidence: &Evidence<'_>) -> Vec<ResolverKind> {
    let mut kinds = Vec::new();
    if evidence.catalog().is_some() {
        kinds.push(ResolverKind::Catalog);
    }
    if evidence.order().is_some() {
        kinds.push(ResolverKind::Order);
    }
    if evidence.payment().is_some() {
        kinds.push(ResolverKind::Payment);
    }
    kinds
}

fn degraded_notes(evidence: &Evidence<'_>) -> Vec<String> {
    let mut notes = Vec::new();
    let statuses = [
        (ResolverKind::Catalog, evidence.catalog.map(|r| (r.status_label(), r.reason()))),
        (ResolverKind::Order, evidence.order.map(|r| (r.status_label(), r.reason()))),
        (ResolverKind::Payment, evidence.payment.map(|r| (r.status_label(), r.reason()))),
    ];
    for (kind, status) in statuses {
        if let Some((label, Some(reason))) = status {
            notes.push(format!("{kind} data {}: {reason}", label.replace('_', " ")));
        }
    }
    notes
}
