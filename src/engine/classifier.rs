//! Pairwise classification of two indexed snapshots.
//!
//! ## Algorithm
//!
//! Over the union of both key sets:
//!
//! 1. key only in `before` → `Removed`
//! 2. key only in `after` → `Added`
//! 3. key in both → compare value fields with tolerance and watched fields
//!    by text; any difference → `Modified`, otherwise the key is dropped
//!
//! Values are sanitized before this point, so a null never "differs" from
//! another null, while null vs present always does.

use crate::policy::{CompareRule, ComparisonPolicy};
use crate::types::{Change, ChangeSet, Record};

use super::indexer::RecordIndex;

/// Classify the differences from `before` to `after`.
///
/// Output order is key order within each status group; callers that need a
/// ranking pass the result through [`super::rank`].
pub fn classify(
    before: &RecordIndex,
    after: &RecordIndex,
    rule: &CompareRule,
    policy: &ComparisonPolicy,
) -> ChangeSet {
    let mut changes = Vec::new();

    for (key, old) in before.iter() {
        match after.get(key) {
            None => {
                let change = Change::removed(key.clone(), rule.primary_value(old), old.clone())
                    .with_category(rule.category_of(old));
                changes.push(change);
            }
            Some(new) => {
                let changed_fields = changed_fields(old, new, rule, policy);
                if changed_fields.is_empty() {
                    continue;
                }
                let change = Change::modified(
                    key.clone(),
                    rule.primary_value(old),
                    rule.primary_value(new),
                    changed_fields,
                    old.clone(),
                    new.clone(),
                )
                .with_category(rule.category_of(new).or_else(|| rule.category_of(old)));
                changes.push(change);
            }
        }
    }

    for (key, new) in after.iter() {
        if before.contains(key) {
            continue;
        }
        let change = Change::added(key.clone(), rule.primary_value(new), new.clone())
            .with_category(rule.category_of(new));
        changes.push(change);
    }

    changes
}

/// Fields that differ between two records under the rule.
///
/// Value fields come first, in declaration order, then watched fields.
pub fn changed_fields(
    old: &Record,
    new: &Record,
    rule: &CompareRule,
    policy: &ComparisonPolicy,
) -> Vec<String> {
    let mut changed = Vec::new();

    for field in &rule.value_fields {
        let differs = match (old.number(field), new.number(field)) {
            (Some(a), Some(b)) => !policy.within_tolerance(a, b),
            (None, None) => false,
            _ => true,
        };
        if differs {
            changed.push(field.clone());
        }
    }

    for field in &rule.watched_fields {
        if old.get(field).comparable_text() != new.get(field).comparable_text() {
            changed.push(field.clone());
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::indexer::index;
    use crate::types::{ChangeStatus, ComparisonKey};

    fn rule() -> CompareRule {
        CompareRule {
            key_fields: vec!["key".into()],
            value_fields: vec!["v".into()],
            watched_fields: vec!["name".into()],
            category_field: None,
        }
    }

    fn idx(rows: &[(&str, f64)]) -> RecordIndex {
        let rule = rule();
        index(
            rows.iter().map(|(k, v)| Record::new().with("key", *k).with("v", *v)),
            |r| rule.key_of(r),
        )
    }

    #[test]
    fn test_added_key() {
        let a = idx(&[("X", 10.0)]);
        let b = idx(&[("X", 10.0), ("Y", 5.0)]);

        let changes = classify(&a, &b, &rule(), &ComparisonPolicy::default());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, ComparisonKey::text("Y"));
        assert_eq!(changes[0].status, ChangeStatus::Added);
        assert_eq!(changes[0].after, Some(5.0));
        assert_eq!(changes[0].magnitude, 5.0);

        let reverse = classify(&b, &a, &rule(), &ComparisonPolicy::default());
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].status, ChangeStatus::Removed);
        assert_eq!(reverse[0].before, Some(5.0));
        assert_eq!(reverse[0].magnitude, 5.0);
    }

    #[test]
    fn test_modified_key() {
        let a = idx(&[("X", 100.0)]);
        let b = idx(&[("X", 90.0)]);

        let changes = classify(&a, &b, &rule(), &ComparisonPolicy::default());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].status, ChangeStatus::Modified);
        assert_eq!(changes[0].delta_abs, Some(-10.0));
        assert_eq!(changes[0].delta_pct, Some(-10.0));
        assert_eq!(changes[0].changed_fields, vec!["v".to_string()]);
    }

    #[test]
    fn test_tolerance_boundary() {
        let policy = ComparisonPolicy::default();
        let at_tolerance = classify(&idx(&[("X", 1.0)]), &idx(&[("X", 1.01)]), &rule(), &policy);
        assert!(at_tolerance.is_empty());

        let beyond = classify(&idx(&[("X", 1.0)]), &idx(&[("X", 1.0101)]), &rule(), &policy);
        assert_eq!(beyond.len(), 1);
    }

    #[test]
    fn test_null_vs_present_is_a_change() {
        let rule = rule();
        let a = index(vec![Record::new().with("key", "X").with("v", "NaN")], |r| rule.key_of(r));
        let b = index(vec![Record::new().with("key", "X").with("v", 3.0)], |r| rule.key_of(r));

        let changes = classify(&a, &b, &rule, &ComparisonPolicy::default());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].before, None);
        assert_eq!(changes[0].after, Some(3.0));
        assert_eq!(changes[0].delta_abs, None);
        assert_eq!(changes[0].magnitude, 3.0);
    }

    #[test]
    fn test_non_numbers_never_differ() {
        let rule = rule();
        let a = index(vec![Record::new().with("key", "X").with("v", "inf")], |r| rule.key_of(r));
        let b = index(vec![Record::new().with("key", "X").with("v", "n/a")], |r| rule.key_of(r));

        assert!(classify(&a, &b, &rule, &ComparisonPolicy::default()).is_empty());
    }

    #[test]
    fn test_watched_field_change() {
        let rule = rule();
        let row = |name: &str| Record::new().with("key", "X").with("v", 1.0).with("name", name);
        let a = index(vec![row("Old")], |r| rule.key_of(r));
        let b = index(vec![row(" New ")], |r| rule.key_of(r));

        let changes = classify(&a, &b, &rule, &ComparisonPolicy::default());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].status, ChangeStatus::Modified);
        assert_eq!(changes[0].changed_fields, vec!["name".to_string()]);
        assert_eq!(changes[0].magnitude, 0.0);
    }

    #[test]
    fn test_self_comparison_is_empty() {
        let a = idx(&[("X", 1.0), ("Y", 2.0), ("Z", -4.5)]);
        assert!(classify(&a, &a, &rule(), &ComparisonPolicy::default()).is_empty());
    }
}
