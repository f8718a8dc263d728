use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::data_type::DataType;
use crate::diagnostic::{Diagnostic, Step};
use crate::error::{Error, Result};
use crate::predicate::{self, FilterClause};
use crate::table::Table;
use crate::value::{KeyValue, Value};

/// Collapses the values of one group into a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    /// Numeric columns only. Integer sums stay integers unless they overflow.
    Sum,
    /// Numeric columns only, always a float.
    Mean,
    /// Non-null rows, any column type.
    Count,
    /// Natural ordering of the column type.
    Min,
    /// Natural ordering of the column type.
    Max,
}

impl Reducer {
    fn requires_numeric(self) -> bool {
        matches!(self, Self::Sum | Self::Mean)
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
        };
        f.write_str(name)
    }
}

/// `GROUP BY group_by` with `reducer(column)`, then the `having` clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub group_by: String,
    pub column: String,
    pub reducer: Reducer,
    /// Applied conjunctively to the aggregated table. Clauses name columns of
    /// the aggregated result, see [AggregationSpec::output_column].
    #[serde(default)]
    pub having: Vec<FilterClause>,
}

impl AggregationSpec {
    pub fn new(group_by: impl Into<String>, column: impl Into<String>, reducer: Reducer) -> Self {
        Self {
            group_by: group_by.into(),
            column: column.into(),
            reducer,
            having: Vec::new(),
        }
    }

    pub fn having(mut self, clause: FilterClause) -> Self {
        self.having.push(clause);
        self
    }

    /// Name of the aggregated column in the result: the input column name, or
    /// `<column>_<reducer>` when the column is also the group-by column.
    pub fn output_column(&self) -> String {
        if self.column == self.group_by {
            format!("{}_{}", self.column, self.reducer)
        } else {
            self.column.clone()
        }
    }
}

/// Groups `table` by `spec.group_by` and reduces `spec.column` in each group.
///
/// Groups are formed by exact value equality (no coercion) and appear in order
/// of first occurrence; nulls form one group of their own. The result has two
/// columns: the group-by column under its own name and the aggregated column
/// (see [AggregationSpec::output_column]). HAVING clauses are not applied here,
/// see [apply_having].
///
/// # Errors
/// - [Error::ColumnNotFound] if either column is missing.
/// - [Error::AggregationType] for `sum`/`mean` over a non-numeric column.
pub fn aggregate(table: &Table, spec: &AggregationSpec) -> Result<Table> {
    let keys = table.column(&spec.group_by)?;
    let input = table.column(&spec.column)?;

    if spec.reducer.requires_numeric() && !input.data_type.is_numeric() {
        return Err(Error::AggregationType {
            column: input.name.clone(),
            reducer: spec.reducer.to_string(),
            data_type: input.data_type,
        });
    }

    let mut group_of: HashMap<KeyValue, usize> = HashMap::new();
    let mut first_rows = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for (row_idx, value) in keys.values().enumerate() {
        let next = members.len();
        let group = *group_of.entry(value.key()).or_insert(next);
        if group == next {
            first_rows.push(row_idx);
            members.push(Vec::new());
        }
        members[group].push(row_idx);
    }

    log::debug!(
        "aggregation: {}({}) by {} over {} rows -> {} groups",
        spec.reducer,
        spec.column,
        spec.group_by,
        table.row_count,
        members.len()
    );

    let key_column = keys.take(first_rows.into_iter().map(Some));
    let reduced = reduce(input, &members, spec.reducer)?.renamed(spec.output_column());
    Table::from_columns(table.name.clone(), vec![key_column, reduced])
}

/// Filters an aggregated table with HAVING clauses. Clauses naming a column the
/// table does not have are skipped with a warning.
pub fn apply_having(table: &Table, clauses: &[FilterClause]) -> (Table, Vec<Diagnostic>) {
    predicate::filter_table(table, clauses, Step::Having)
}

fn reduce(column: &Column, groups: &[Vec<usize>], reducer: Reducer) -> Result<Column> {
    let present = |rows: &[usize]| -> Vec<Value> {
        rows.iter()
            .filter_map(|&row_idx| column.get(row_idx))
            .filter(|value| !value.is_null())
            .collect()
    };
    let name = column.name.clone();

    match reducer {
        Reducer::Count => Column::from_values(
            name,
            DataType::Int,
            groups
                .iter()
                .map(|rows| Value::Int(present(rows).len() as i64)),
        ),
        Reducer::Sum if column.data_type == DataType::Int => {
            let sums: Vec<Option<i128>> = groups
                .iter()
                .map(|rows| {
                    let values = present(rows);
                    (!values.is_empty()).then(|| {
                        values
                            .iter()
                            .filter_map(Value::as_int)
                            .map(i128::from)
                            .sum()
                    })
                })
                .collect();
            let fits = sums
                .iter()
                .flatten()
                .all(|sum| i64::try_from(*sum).is_ok());
            if fits {
                Column::from_values(
                    name,
                    DataType::Int,
                    sums.into_iter().map(|sum| match sum {
                        Some(sum) => Value::Int(sum as i64),
                        None => Value::Null,
                    }),
                )
            } else {
                log::warn!("aggregation: integer sum of {name} overflows, widening to float");
                Column::from_values(
                    name,
                    DataType::Float,
                    sums.into_iter().map(|sum| match sum {
                        Some(sum) => Value::Float(sum as f64),
                        None => Value::Null,
                    }),
                )
            }
        }
        Reducer::Sum | Reducer::Mean => Column::from_values(
            name,
            DataType::Float,
            groups.iter().map(|rows| {
                let values: Vec<f64> = present(rows).iter().filter_map(Value::as_f64).collect();
                if values.is_empty() {
                    return Value::Null;
                }
                let sum: f64 = values.iter().sum();
                match reducer {
                    Reducer::Mean => Value::Float(sum / values.len() as f64),
                    _ => Value::Float(sum),
                }
            }),
        ),
        Reducer::Min | Reducer::Max => Column::from_values(
            name,
            column.data_type,
            groups.iter().map(|rows| {
                let values = present(rows).into_iter();
                let picked = if reducer == Reducer::Min {
                    values.min_by(|a, b| a.sort_cmp(b))
                } else {
                    values.max_by(|a, b| a.sort_cmp(b))
                };
                picked.unwrap_or(Value::Null)
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::predicate::Predicate;
    use pretty_assertions::assert_eq;

    fn orders() -> Table {
        Table::load(
            "orders",
            &["id", "cust", "amt", "note"],
            &[
                vec!["1", "c1", "60", "a"],
                vec!["2", "c2", "20", ""],
                vec!["3", "c1", "70", "b"],
                vec!["4", "c3", "150", "c"],
                vec!["5", "c2", "30", "d"],
            ],
        )
        .unwrap()
    }

    fn rows(table: &Table) -> Vec<Vec<Value>> {
        table.rows().collect()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    #[test]
    fn test_sum_then_having_scenario() {
        let spec = AggregationSpec::new("cust", "amt", Reducer::Sum)
            .having(FilterClause::new("amt", Predicate::Gt(100.into())));
        let grouped = aggregate(&orders(), &spec).unwrap();

        assert_eq!(grouped.column_names(), vec!["cust", "amt"]);
        assert_eq!(
            rows(&grouped),
            vec![
                vec![text("c1"), Value::Int(130)],
                vec![text("c2"), Value::Int(50)],
                vec![text("c3"), Value::Int(150)],
            ]
        );

        let (kept, diagnostics) = apply_having(&grouped, &spec.having);
        assert!(diagnostics.is_empty());
        assert_eq!(
            rows(&kept),
            vec![
                vec![text("c1"), Value::Int(130)],
                vec![text("c3"), Value::Int(150)],
            ]
        );

        // re-applying an already satisfied clause changes nothing
        let (again, _) = apply_having(&kept, &spec.having);
        assert_eq!(again, kept);
    }

    #[test]
    fn test_mean_count_min_max() {
        let table = orders();

        let mean = aggregate(&table, &AggregationSpec::new("cust", "amt", Reducer::Mean)).unwrap();
        assert_eq!(mean.column("amt").unwrap().data_type, DataType::Float);
        assert_eq!(
            mean.column("amt").unwrap().values().collect::<Vec<_>>(),
            vec![Value::Float(65.0), Value::Float(25.0), Value::Float(150.0)]
        );

        // count ignores nulls and works on any type
        let count = aggregate(&table, &AggregationSpec::new("cust", "note", Reducer::Count)).unwrap();
        assert_eq!(
            count.column("note").unwrap().values().collect::<Vec<_>>(),
            vec![Value::Int(2), Value::Int(1), Value::Int(1)]
        );

        let min = aggregate(&table, &AggregationSpec::new("cust", "amt", Reducer::Min)).unwrap();
        assert_eq!(
            min.column("amt").unwrap().values().collect::<Vec<_>>(),
            vec![Value::Int(60), Value::Int(20), Value::Int(150)]
        );

        // lexical on strings
        let max = aggregate(&table, &AggregationSpec::new("cust", "note", Reducer::Max)).unwrap();
        assert_eq!(
            max.column("note").unwrap().values().collect::<Vec<_>>(),
            vec![text("b"), text("d"), text("c")]
        );
    }

    #[test]
    fn test_sum_over_text_is_type_error() {
        let err = aggregate(&orders(), &AggregationSpec::new("cust", "note", Reducer::Sum))
            .unwrap_err();
        assert_eq!(
            err,
            Error::AggregationType {
                column: "note".into(),
                reducer: "sum".into(),
                data_type: DataType::Text,
            }
        );
        assert!(matches!(
            aggregate(&orders(), &AggregationSpec::new("cust", "note", Reducer::Mean)),
            Err(Error::AggregationType { .. })
        ));
    }

    #[test]
    fn test_missing_columns() {
        for spec in [
            AggregationSpec::new("customer", "amt", Reducer::Sum),
            AggregationSpec::new("cust", "amount", Reducer::Sum),
        ] {
            assert!(matches!(
                aggregate(&orders(), &spec),
                Err(Error::ColumnNotFound { .. })
            ));
        }
    }

    #[test]
    fn test_groups_use_exact_equality_and_keep_nulls() {
        let table = Table::load(
            "t",
            &["k", "v"],
            &[
                vec!["a", "1"],
                vec!["A", "2"],
                vec!["", "3"],
                vec!["a", ""],
                vec!["", ""],
            ],
        )
        .unwrap();
        let grouped = aggregate(&table, &AggregationSpec::new("k", "v", Reducer::Sum)).unwrap();

        assert_eq!(
            rows(&grouped),
            vec![
                vec![text("a"), Value::Int(1)],
                vec![text("A"), Value::Int(2)],
                vec![Value::Null, Value::Int(3)],
            ]
        );

        let only_nulls = Table::load("t", &["k", "v"], &[vec!["x", "1"], vec!["y", ""]]).unwrap();
        let grouped = aggregate(&only_nulls, &AggregationSpec::new("k", "v", Reducer::Mean)).unwrap();
        assert_eq!(
            grouped.column("v").unwrap().values().collect::<Vec<_>>(),
            vec![Value::Float(1.0), Value::Null]
        );
    }

    #[test]
    fn test_group_by_own_column() {
        let spec = AggregationSpec::new("cust", "cust", Reducer::Count);
        let grouped = aggregate(&orders(), &spec).unwrap();
        assert_eq!(grouped.column_names(), vec!["cust", "cust_count"]);
        assert_eq!(spec.output_column(), "cust_count");
    }

    #[test]
    fn test_integer_sum_overflow_widens() {
        let big = i64::MAX.to_string();
        let table = Table::load(
            "t",
            &["k", "v"],
            &[vec!["a", big.as_str()], vec!["a", "1"], vec!["b", "2"]],
        )
        .unwrap();
        let grouped = aggregate(&table, &AggregationSpec::new("k", "v", Reducer::Sum)).unwrap();
        assert_eq!(grouped.column("v").unwrap().data_type, DataType::Float);
        assert_eq!(grouped.get_row(1), Some(vec![text("b"), Value::Float(2.0)]));
    }

    #[test]
    fn test_having_unknown_column_is_skipped() {
        let grouped = aggregate(&orders(), &AggregationSpec::new("cust", "amt", Reducer::Sum)).unwrap();
        let clauses = vec![
            FilterClause::new("total", Predicate::Gt(100.into())),
            FilterClause::new("amt", Predicate::Lt(100.into())),
        ];
        let (kept, diagnostics) = apply_having(&grouped, &clauses);

        assert_eq!(rows(&kept), vec![vec![text("c2"), Value::Int(50)]]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].step, Step::Having);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_spec_json() {
        let spec: AggregationSpec = serde_json::from_str(
            r#"{"group_by": "cust", "column": "amt", "reducer": "sum",
                "having": [{"column": "amt", "op": ">", "operand": 100}]}"#,
        )
        .unwrap();
        assert_eq!(
            spec,
            AggregationSpec::new("cust", "amt", Reducer::Sum)
                .having(FilterClause::new("amt", Predicate::Gt(100.into())))
        );
    }
}
