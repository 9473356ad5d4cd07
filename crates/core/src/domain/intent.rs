use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed label set a query is classified into. Routing is keyed on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Catalog,
    Order,
    Payment,
    Multiple,
}

impl Intent {
    pub const ALL: [Intent; 4] = [Self::Catalog, Self::Order, Self::Payment, Self::Multiple];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Order => "order",
            Self::Payment => "payment",
            Self::Multiple => "multiple",
        }
    }

    /// Maps raw model output onto the label set. Never fails: anything that is
    /// not exactly one recognised label degrades to `Multiple`.
    pub fn from_label(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        let recognised = normalized
            .split(|character: char| !character.is_ascii_alphabetic())
            .filter(|token| !token.is_empty())
            .filter_map(Self::exact)
            .collect::<HashSet<_>>();

        let mut distinct = recognised.into_iter();
        match (distinct.next(), distinct.next()) {
            (Some(intent), None) => intent,
            _ => Self::Multiple,
        }
    }

    fn exact(token: &str) -> Option<Self> {
        match token {
            "catalog" | "product" => Some(Self::Catalog),
            "order" => Some(Self::Order),
            "payment" => Some(Self::Payment),
            "multiple" => Some(Self::Multiple),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Intent;

    #[test]
    fn exact_labels_round_trip_through_display() {
        for intent in Intent::ALL {
            assert_eq!(Intent::from_label(intent.as_str()), intent);
        }
    }

    #[test]
    fn noisy_model_output_is_normalized() {
        assert_eq!(Intent::from_label("  Order\n"), Intent::Order);
        assert_eq!(Intent::from_label("\"payment\"."), Intent::Payment);
        assert_eq!(Intent::from_label("Label: catalog"), Intent::Catalog);
    }

    #[test]
    fn unrecognized_or_ambiguous_output_degrades_to_multiple() {
        assert_eq!(Intent::from_label(""), Intent::Multiple);
        assert_eq!(Intent::from_label("shipping"), Intent::Multiple);
        assert_eq!(Intent::from_label("order or payment"), Intent::Multiple);
        assert_eq!(Intent::from_label("order, order, payment"), Intent::Multiple);
        assert_eq!(Intent::from_label("payment payment"), Intent::Payment);
        assert_eq!(Intent::from_label("🤷"), Intent::Multiple);
    }
}
