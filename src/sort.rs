use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::diagnostic::{Diagnostic, Step};
use crate::table::Table;
use crate::value::Value;

fn ascending_by_default() -> bool {
    true
}

/// One key of a multi-key sort. Earlier rules take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRule {
    pub column: String,
    #[serde(default = "ascending_by_default")]
    pub ascending: bool,
}

impl SortRule {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Stable multi-key sort. Rows that compare equal on every rule keep their
/// relative order, and nulls go last whatever the direction.
///
/// Rules naming an unknown column are skipped, each with a diagnostic.
pub fn sort(table: &Table, rules: &[SortRule]) -> (Table, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut keys: Vec<(Vec<Value>, bool)> = Vec::with_capacity(rules.len());

    for rule in rules {
        match table.column(&rule.column) {
            Ok(column) => keys.push((column.values().collect(), rule.ascending)),
            Err(cause) => diagnostics.push(Diagnostic::clause_skipped(
                Step::Sort,
                &rule.column,
                cause,
            )),
        }
    }

    let mut order: Vec<usize> = (0..table.row_count).collect();
    if !keys.is_empty() {
        // slice::sort_by is stable
        order.sort_by(|&a, &b| {
            keys.iter()
                .map(|(values, ascending)| compare(&values[a], &values[b], *ascending))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }

    log::debug!(
        "sort: {} rows of {} by {} keys",
        table.row_count,
        table.name,
        keys.len()
    );
    (table.take_rows(&order), diagnostics)
}

fn compare(left: &Value, right: &Value, ascending: bool) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if ascending => left.sort_cmp(right),
        (false, false) => left.sort_cmp(right).reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn people() -> Table {
        Table::load(
            "people",
            &["id", "team", "score"],
            &[
                vec!["1", "b", "10"],
                vec!["2", "a", "30"],
                vec!["3", "b", ""],
                vec!["4", "a", "20"],
                vec!["5", "b", "30"],
                vec!["6", "a", "30"],
            ],
        )
        .unwrap()
    }

    fn ids(table: &Table) -> Vec<i64> {
        table
            .column("id")
            .unwrap()
            .values()
            .filter_map(|v| v.as_int())
            .collect()
    }

    #[test]
    fn test_single_key_is_stable() {
        let (sorted, diagnostics) = sort(&people(), &[SortRule::asc("team")]);
        assert!(diagnostics.is_empty());
        assert_eq!(ids(&sorted), vec![2, 4, 6, 1, 3, 5]);
    }

    #[test]
    fn test_multi_key_precedence() {
        let (sorted, _) = sort(&people(), &[SortRule::asc("team"), SortRule::desc("score")]);
        assert_eq!(ids(&sorted), vec![2, 6, 4, 5, 1, 3]);

        // resorting on the primary key alone keeps the secondary order
        let (resorted, _) = sort(&sorted, &[SortRule::asc("team")]);
        assert_eq!(ids(&resorted), ids(&sorted));
    }

    #[test]
    fn test_nulls_last_in_both_directions() {
        let (asc, _) = sort(&people(), &[SortRule::asc("score")]);
        assert_eq!(ids(&asc), vec![1, 4, 2, 5, 6, 3]);

        let (desc, _) = sort(&people(), &[SortRule::desc("score")]);
        assert_eq!(ids(&desc), vec![2, 5, 6, 4, 1, 3]);
    }

    #[test]
    fn test_unknown_column_is_skipped() {
        let (sorted, diagnostics) = sort(&people(), &[SortRule::desc("rank"), SortRule::desc("id")]);
        assert_eq!(ids(&sorted), vec![6, 5, 4, 3, 2, 1]);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].step, Step::Sort);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].clause.as_deref(), Some("rank"));
        assert!(matches!(diagnostics[0].cause, Error::ColumnNotFound { .. }));
    }

    #[test]
    fn test_no_rules_keeps_order() {
        let table = people();
        let (sorted, diagnostics) = sort(&table, &[]);
        assert_eq!(sorted, table);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_rule_json_defaults_to_ascending() {
        let rules: Vec<SortRule> =
            serde_json::from_str(r#"[{"column": "team"}, {"column": "score", "ascending": false}]"#)
                .unwrap();
        assert_eq!(rules, vec![SortRule::asc("team"), SortRule::desc("score")]);
    }
}
