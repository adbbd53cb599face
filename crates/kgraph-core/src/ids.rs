//! Identifier allocation rules.
//!
//! Allocation is max+1 over the ids already present, so sparse sequences
//! left behind by deletions never hand out an id that is still in use.
//! These functions are pure: callers supply the existing ids read from the
//! store, and the store is responsible for making read-then-create atomic
//! where that matters.

use crate::error::KgError;
use crate::types::{EntityId, GraphId, RelationId, UserId};

/// Numeric suffix of a canonical `e<digits>` entity id.
pub fn entity_seq(id: &str) -> Option<u64> {
    let digits = id.strip_prefix('e')?;
    parse_digits(digits)
}

/// Numeric value of a purely numeric relation id.
pub fn relation_seq(id: &str) -> Option<u64> {
    parse_digits(id)
}

/// `max + 1`, refusing to wrap once a sequence reaches `u64::MAX`.
pub fn successor(max: u64, sequence: &str) -> Result<u64, KgError> {
    max.checked_add(1)
        .ok_or_else(|| KgError::Validation(format!("{sequence} id sequence exhausted at {max}")))
}

/// Next entity id for a scope: `e<max+1>`, or `e1` when none are canonical.
pub fn next_entity_id<'a, I>(existing: I) -> Result<EntityId, KgError>
where
    I: IntoIterator<Item = &'a str>,
{
    let max = existing.into_iter().filter_map(entity_seq).max().unwrap_or(0);
    Ok(EntityId::from_seq(successor(max, "entity")?))
}

/// Next relation id for a graph: max numeric id + 1, or 1.
pub fn next_relation_id<'a, I>(existing: I) -> Result<RelationId, KgError>
where
    I: IntoIterator<Item = &'a str>,
{
    let max = existing.into_iter().filter_map(relation_seq).max().unwrap_or(0);
    Ok(RelationId(successor(max, "relation")?))
}

/// Next graph id for a user: `<user_id>_<N>`, N one past the largest
/// numeric suffix among graph ids already carrying the `<user_id>_` prefix.
pub fn next_graph_id<'a, I>(user_id: &UserId, existing: I) -> Result<GraphId, KgError>
where
    I: IntoIterator<Item = &'a GraphId>,
{
    let prefix = format!("{}_", user_id.0);
    let max = existing
        .into_iter()
        .filter_map(|g| g.0.strip_prefix(prefix.as_str()))
        .filter_map(parse_digits)
        .max()
        .unwrap_or(0);
    Ok(GraphId(format!("{prefix}{}", successor(max, "graph")?)))
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_follow_max_plus_one() {
        assert_eq!(next_entity_id([]).unwrap().as_str(), "e1");
        assert_eq!(next_entity_id(["e1", "e2", "e3"]).unwrap().as_str(), "e4");
        // e2 deleted: sparse sequence still moves forward.
        assert_eq!(next_entity_id(["e1", "e3"]).unwrap().as_str(), "e4");
    }

    #[test]
    fn non_canonical_entity_ids_are_ignored() {
        let existing = ["e7", "node-9", "E12", "e", "e1x", "3f2b-uuid", "e+5"];
        assert_eq!(next_entity_id(existing).unwrap().as_str(), "e8");
        assert_eq!(entity_seq("e0012"), Some(12));
        assert_eq!(entity_seq("e99999999999999999999999"), None);
    }

    #[test]
    fn relation_ids_follow_max_plus_one() {
        assert_eq!(next_relation_id([]).unwrap(), RelationId(1));
        assert_eq!(next_relation_id(["1", "5", "abc", "2"]).unwrap(), RelationId(6));
        assert_eq!(next_relation_id(["-3", "1.5"]).unwrap(), RelationId(1));
    }

    #[test]
    fn graph_ids_are_prefixed_by_user() {
        let user = UserId::new("alice");
        let existing = vec![
            GraphId::new("alice_1"),
            GraphId::new("alice_4"),
            GraphId::new("alice_x"),
            GraphId::new("alice_1_2"),
            GraphId::new("bob_9"),
            GraphId::new("graph_20240101120000"),
        ];
        assert_eq!(next_graph_id(&user, &existing).unwrap().as_str(), "alice_5");
        assert_eq!(next_graph_id(&UserId::new("carol"), &existing).unwrap().as_str(), "carol_1");
    }

    #[test]
    fn exhausted_sequences_fail_instead_of_wrapping() {
        let top = format!("e{}", u64::MAX);
        assert_eq!(entity_seq(&top), Some(u64::MAX));
        assert!(matches!(
            next_entity_id(["e1", top.as_str()]),
            Err(KgError::Validation(_))
        ));

        let top = u64::MAX.to_string();
        assert!(next_relation_id([top.as_str()]).is_err());

        let graphs = vec![GraphId(format!("alice_{}", u64::MAX))];
        assert!(next_graph_id(&UserId::new("alice"), &graphs).is_err());

        assert_eq!(successor(u64::MAX - 1, "entity").unwrap(), u64::MAX);
    }
}
