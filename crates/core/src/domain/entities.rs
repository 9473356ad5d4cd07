use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::evidence::OrderId;

const ORDER_KEYWORDS: [&str; 2] = ["order", "ord"];
const ORDER_FILLERS: [&str; 4] = ["no", "number", "num", "id"];
const STOPWORDS: [&str; 24] = [
    "a", "an", "and", "are", "can", "did", "do", "for", "i", "is", "it", "me", "my", "of", "on",
    "the", "this", "to", "was", "what", "when", "where", "why", "with",
];

/// Identifiers parsed from the raw query. Parsing never fails; resolvers decide
/// what to do when the identifier they need is absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEntities {
    pub order_id: Option<OrderId>,
    pub terms: Vec<String>,
}

impl QueryEntities {
    pub fn parse(query: &str) -> Self {
        let tokens = tokenize(query);
        let order_id = extract_order_id(&tokens);

        let mut seen = BTreeSet::new();
        let terms = tokens
            .iter()
            .map(|token| token.trim_start_matches('#').to_string())
            .filter(|token| token.len() > 1)
            .filter(|token| !token.chars().all(|character| character.is_ascii_digit()))
            .filter(|token| !STOPWORDS.contains(&token.as_str()))
            .filter(|token| seen.insert(token.clone()))
            .collect();

        Self { order_id, terms }
    }

    pub fn mentions(&self, term: &str) -> bool {
        let needle = term.to_ascii_lowercase();
        self.terms.iter().any(|token| *token == needle)
    }
}

fn tokenize(query: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(query.len());
    for character in query.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '#' | '-') {
            sanitized.push(character.to_ascii_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn extract_order_id(tokens: &[String]) -> Option<OrderId> {
    for token in tokens {
        if let Some(digits) = token.strip_prefix('#') {
            if is_identifier(digits) {
                return Some(OrderId(digits.to_string()));
            }
        }
        if let Some(digits) = token.strip_prefix("ord-") {
            if is_identifier(digits) {
                return Some(OrderId(digits.to_string()));
            }
        }
    }

    for (index, token) in tokens.iter().enumerate() {
        if !ORDER_KEYWORDS.contains(&token.as_str()) {
            continue;
        }
        let candidate = tokens[index + 1..]
            .iter()
            .map(|next| next.trim_start_matches('#'))
            .find(|next| !ORDER_FILLERS.contains(next));
        if let Some(candidate) = candidate.filter(|candidate| is_identifier(candidate)) {
            return Some(OrderId(candidate.to_string()));
        }
    }

    None
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|character| character.is_ascii_digit())
}
