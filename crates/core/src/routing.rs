use crate::domain::{Intent, ResolverKind};

/// Intent -> resolver subset. Adding an intent/resolver pair is one row here.
pub const ROUTING_TABLE: &[(Intent, &[ResolverKind])] = &[
    (Intent::Catalog, &[ResolverKind::Catalog]),
    (Intent::Order, &[ResolverKind::Order]),
    (Intent::Payment, &[ResolverKind::Payment]),
    (Intent::Multiple, &ResolverKind::ALL),
];

/// Pure and total: an intent without a row fails open to every resolver.
pub fn select_resolvers(intent: Intent) -> Vec<ResolverKind> {
    let selected = ROUTING_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == intent)
        .map(|(_, kinds)| *kinds)
        .filter(|kinds| !kinds.is_empty())
        .unwrap_or(&ResolverKind::ALL[..]);

    let mut kinds = selected.to_vec();
    kinds.sort();
    kinds.dedup();
    kinds
}

#[cfg(test)]
mod tests {
    use super::{select_resolvers, ROUTING_TABLE};
    use crate::domain::{Intent, ResolverKind};

    #[test]
    fn single_domain_intents_select_exactly_one_resolver() {
        assert_eq!(select_resolvers(Intent::Catalog), vec![ResolverKind::Catalog]);
        assert_eq!(select_resolvers(Intent::Order), vec![ResolverKind::Order]);
        assert_eq!(select_resolvers(Intent::Payment), vec![ResolverKind::Payment]);
    }

    #[test]
    fn multiple_and_unrecognized_labels_select_all_resolvers() {
        assert_eq!(select_resolvers(Intent::Multiple), ResolverKind::ALL.to_vec());
        assert_eq!(
            select_resolvers(Intent::from_label("where is the nearest store")),
            ResolverKind::ALL.to_vec()
        );
    }

    #[test]
    fn every_intent_has_a_non_empty_route() {
        for intent in Intent::ALL {
            assert!(!select_resolvers(intent).is_empty(), "{intent} must route somewhere");
            assert!(
                ROUTING_TABLE.iter().any(|(candidate, _)| *candidate == intent),
                "{intent} should have an explicit routing row"
            );
        }
    }
}
