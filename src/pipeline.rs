//! Runs the relational stages in a fixed order:
//! source (join or single table), projection, filter, aggregation + HAVING,
//! sort.
//!
//! Every stage works on the previous stage's output and builds a new table;
//! catalog tables are only ever borrowed. Recoverable problems become
//! [Diagnostic]s and the run goes on with the last good table. Only a missing
//! source aborts the run.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::{self, AggregationSpec};
use crate::catalog::Catalog;
use crate::diagnostic::{Diagnostic, Step};
use crate::error::{Error, Result};
use crate::join::{self, JoinSpec};
use crate::predicate::{self, FilterClause};
use crate::sort::{self, SortRule};
use crate::table::{Schema, Table};

/// Where a run stands. A run moves forward only, and stops early at the last
/// configured stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Joined,
    Projected,
    Filtered,
    Aggregated,
    Sorted,
    Done,
}

/// The input of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Join two catalog tables.
    Join(JoinSpec),
    /// Use one catalog table as is.
    Table(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join(spec) => write!(
                f,
                "{} {} join {} on {} = {}",
                spec.left, spec.kind, spec.right, spec.left_on, spec.right_on
            ),
            Self::Table(name) => f.write_str(name),
        }
    }
}

/// Everything one run needs besides the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub source: Source,
    /// Output columns, in order. Empty keeps every column.
    #[serde(default)]
    pub projection: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterClause>,
    #[serde(default)]
    pub aggregation: Option<AggregationSpec>,
    #[serde(default)]
    pub sort: Vec<SortRule>,
}

impl PipelineRequest {
    pub fn join(spec: JoinSpec) -> Self {
        Self::from_source(Source::Join(spec))
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self::from_source(Source::Table(name.into()))
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            projection: Vec::new(),
            filters: Vec::new(),
            aggregation: None,
            sort: Vec::new(),
        }
    }

    pub fn project<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.projection = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, clause: FilterClause) -> Self {
        self.filters.push(clause);
        self
    }

    pub fn aggregate(mut self, spec: AggregationSpec) -> Self {
        self.aggregation = Some(spec);
        self
    }

    pub fn sort_by(mut self, rule: SortRule) -> Self {
        self.sort.push(rule);
        self
    }
}

/// What produced a [ResultTable].
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    /// Human readable description of the [Source].
    pub source: String,
    /// Number of stages that produced a new table.
    pub stages_applied: usize,
    /// Last stage reached.
    pub state: Stage,
}

/// The output of [run]: a table plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub table: Table,
    pub provenance: Provenance,
}

/// Joins two catalog tables.
///
/// # Errors
/// [Error::TableNotFound] if either table is missing from the catalog, and any
/// error of [join::join].
pub fn run_join(catalog: &Catalog, spec: &JoinSpec) -> Result<Table> {
    let left = catalog.get(&spec.left)?;
    let right = catalog.get(&spec.right)?;
    join::join(left, right, spec)
}

/// Applies filter clauses conjunctively, skipping the ones that fail.
pub fn run_filter(table: &Table, clauses: &[FilterClause]) -> (Table, Vec<Diagnostic>) {
    predicate::apply_filters(table, clauses)
}

/// Aggregates then applies the HAVING clauses of `spec`.
///
/// # Errors
/// Any error of [aggregate::aggregate]. HAVING problems are diagnostics.
pub fn run_aggregate(table: &Table, spec: &AggregationSpec) -> Result<(Table, Vec<Diagnostic>)> {
    let aggregated = aggregate::aggregate(table, spec)?;
    Ok(aggregate::apply_having(&aggregated, &spec.having))
}

/// Stable multi-key sort; unknown sort columns are reported and skipped.
pub fn run_sort(table: &Table, rules: &[SortRule]) -> (Table, Vec<Diagnostic>) {
    sort::sort(table, rules)
}

/// Tracks the state machine of one run.
struct Progress {
    state: Stage,
    stages_applied: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Progress {
    fn advance(&mut self, next: Stage) {
        log::debug!("pipeline: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.stages_applied += 1;
    }

    fn report(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }
}

/// Runs a whole pipeline against `catalog`.
///
/// Never fails: a missing source yields an empty table in state
/// [Stage::Idle], every other problem is a diagnostic and the affected clause
/// or stage is skipped.
pub fn run(catalog: &Catalog, request: &PipelineRequest) -> (ResultTable, Vec<Diagnostic>) {
    let source = request.source.to_string();
    let mut progress = Progress {
        state: Stage::Idle,
        stages_applied: 0,
        diagnostics: Vec::new(),
    };

    let fetched = match &request.source {
        Source::Join(spec) => run_join(catalog, spec).map_err(|cause| (Step::Join, cause)),
        Source::Table(name) => catalog
            .get(name)
            .cloned()
            .map_err(|cause| (Step::Source, cause)),
    };
    let mut table = match fetched {
        Ok(table) => table,
        Err((step, cause)) => {
            log::error!("pipeline: aborting {source}: {cause}");
            progress.diagnostics.push(Diagnostic::stage_failed(step, cause));
            let empty = Table::new(source.clone(), Schema { columns: Vec::new() });
            return finish(empty, source, progress);
        }
    };
    if matches!(request.source, Source::Join(_)) {
        progress.advance(Stage::Joined);
    }

    if let Some(projected) = project(&table, &request.projection, &mut progress.diagnostics) {
        table = projected;
        progress.advance(Stage::Projected);
    }

    if !request.filters.is_empty() {
        let (filtered, diagnostics) = run_filter(&table, &request.filters);
        // one diagnostic per skipped clause
        let applied = diagnostics.len() < request.filters.len();
        progress.report(diagnostics);
        if applied {
            table = filtered;
            progress.advance(Stage::Filtered);
        }
    }

    if let Some(spec) = &request.aggregation {
        match run_aggregate(&table, spec) {
            Ok((aggregated, diagnostics)) => {
                table = aggregated;
                progress.report(diagnostics);
                progress.advance(Stage::Aggregated);
            }
            Err(cause) => progress
                .diagnostics
                .push(Diagnostic::stage_failed(Step::Aggregation, cause)),
        }
    }

    if !request.sort.is_empty() {
        let (sorted, diagnostics) = run_sort(&table, &request.sort);
        let applied = diagnostics.len() < request.sort.len();
        progress.report(diagnostics);
        if applied {
            table = sorted;
            progress.advance(Stage::Sorted);
            progress.state = Stage::Done;
        }
    }

    finish(table, source, progress)
}

fn finish(table: Table, source: String, progress: Progress) -> (ResultTable, Vec<Diagnostic>) {
    log::debug!(
        "pipeline: {source} finished in state {:?} with {} rows and {} diagnostics",
        progress.state,
        table.row_count,
        progress.diagnostics.len()
    );
    let result = ResultTable {
        table,
        provenance: Provenance {
            source,
            stages_applied: progress.stages_applied,
            state: progress.state,
        },
    };
    (result, progress.diagnostics)
}

/// Resolves the projection list against `table`. Unknown and repeated names are
/// reported and dropped; `None` means the table passes through unchanged.
fn project(table: &Table, names: &[String], diagnostics: &mut Vec<Diagnostic>) -> Option<Table> {
    if names.is_empty() {
        return Some(table.clone());
    }

    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            let cause = Error::Schema {
                table: table.name.clone(),
                reason: format!("column {name:?} projected more than once"),
            };
            diagnostics.push(Diagnostic::clause_skipped(Step::Projection, name, cause));
        } else if let Err(cause) = table.column(name) {
            diagnostics.push(Diagnostic::clause_skipped(Step::Projection, name, cause));
        } else {
            resolved.push(name.as_str());
        }
    }

    if resolved.is_empty() {
        let cause = Error::Schema {
            table: table.name.clone(),
            reason: "none of the projected columns exist".into(),
        };
        diagnostics.push(Diagnostic::stage_failed(Step::Projection, cause));
        return None;
    }

    match table.select(&resolved) {
        Ok(projected) => Some(projected),
        Err(cause) => {
            diagnostics.push(Diagnostic::stage_failed(Step::Projection, cause));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Reducer;
    use crate::diagnostic::Severity;
    use crate::join::JoinKind;
    use crate::predicate::Predicate;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .load(
                "orders",
                &["id", "cust", "amt"],
                &[
                    vec!["1", "c1", "60"],
                    vec!["2", "c2", "20"],
                    vec!["3", "c1", "70"],
                    vec!["4", "c3", "150"],
                    vec!["5", "c2", "30"],
                    vec!["6", "c9", "500"],
                ],
            )
            .unwrap();
        catalog
            .load(
                "customers",
                &["cust", "name"],
                &[vec!["c1", "Ann"], vec!["c2", "Ben"], vec!["c3", "Cal"]],
            )
            .unwrap();
        catalog
    }

    fn orders_with_customers() -> JoinSpec {
        JoinSpec::new("orders", "customers", "cust", "cust", JoinKind::Inner)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    fn rows(table: &Table) -> Vec<Vec<Value>> {
        table.rows().collect()
    }

    #[test]
    fn test_run_join_scenario() {
        let joined = run_join(&catalog(), &orders_with_customers()).unwrap();

        assert_eq!(joined.column_names(), vec!["id", "cust", "amt", "name"]);
        assert_eq!(
            joined
                .column("id")
                .unwrap()
                .values()
                .collect::<Vec<_>>(),
            (1..=5).map(Value::Int).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_run_join_missing_table() {
        let spec = JoinSpec::new("orders", "suppliers", "cust", "cust", JoinKind::Inner);
        assert_eq!(
            run_join(&catalog(), &spec).unwrap_err(),
            Error::TableNotFound("suppliers".into())
        );
    }

    #[test]
    fn test_full_pipeline() {
        let catalog = catalog();
        let request = PipelineRequest::join(orders_with_customers())
            .project(["cust", "amt", "name"])
            .filter(FilterClause::new(
                "amt",
                Predicate::Between(10.into(), 100.into()),
            ))
            .aggregate(
                AggregationSpec::new("cust", "amt", Reducer::Sum)
                    .having(FilterClause::new("amt", Predicate::Gt(40.into()))),
            )
            .sort_by(SortRule::asc("amt"));

        let (result, diagnostics) = run(&catalog, &request);

        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(result.table.column_names(), vec!["cust", "amt"]);
        assert_eq!(
            rows(&result.table),
            vec![
                vec![text("c2"), Value::Int(50)],
                vec![text("c1"), Value::Int(130)],
            ]
        );
        assert_eq!(
            result.provenance,
            Provenance {
                source: "orders inner join customers on cust = cust".into(),
                stages_applied: 5,
                state: Stage::Done,
            }
        );
    }

    #[test]
    fn test_stops_at_last_configured_stage() {
        let request = PipelineRequest::join(orders_with_customers())
            .filter(FilterClause::new("name", Predicate::Eq("Ann".into())));
        let (result, diagnostics) = run(&catalog(), &request);

        assert!(diagnostics.is_empty());
        assert_eq!(result.provenance.state, Stage::Filtered);
        assert_eq!(result.provenance.stages_applied, 3);
        assert_eq!(result.table.row_count, 2);
        assert_eq!(result.table.column_names(), vec!["id", "cust", "amt", "name"]);
    }

    #[test]
    fn test_join_failure_aborts() {
        let spec = JoinSpec::new("orders", "customers", "customer", "cust", JoinKind::Left);
        let request = PipelineRequest::join(spec).sort_by(SortRule::asc("id"));
        let (result, diagnostics) = run(&catalog(), &request);

        assert_eq!(result.provenance.state, Stage::Idle);
        assert_eq!(result.provenance.stages_applied, 0);
        assert_eq!(result.table.row_count, 0);
        assert!(result.table.columns.is_empty());

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].step, Step::Join);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert!(matches!(diagnostics[0].cause, Error::Join { .. }));
    }

    #[test]
    fn test_missing_single_table_aborts() {
        let (result, diagnostics) = run(&catalog(), &PipelineRequest::table("suppliers"));
        assert_eq!(result.provenance.state, Stage::Idle);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].step, Step::Source);
        assert_eq!(diagnostics[0].cause, Error::TableNotFound("suppliers".into()));
    }

    #[test]
    fn test_projection_skips_unknown_and_repeated_names() {
        let request = PipelineRequest::join(orders_with_customers())
            .project(["name", "total", "id", "name"]);
        let (result, diagnostics) = run(&catalog(), &request);

        assert_eq!(result.table.column_names(), vec!["name", "id"]);
        assert_eq!(result.provenance.state, Stage::Projected);

        let skipped: Vec<_> = diagnostics
            .iter()
            .map(|d| (d.step, d.severity, d.clause.as_deref()))
            .collect();
        assert_eq!(
            skipped,
            vec![
                (Step::Projection, Severity::Warning, Some("total")),
                (Step::Projection, Severity::Warning, Some("name")),
            ]
        );
    }

    #[test]
    fn test_projection_with_nothing_resolved_is_skipped() {
        let request = PipelineRequest::join(orders_with_customers()).project(["total"]);
        let (result, diagnostics) = run(&catalog(), &request);

        assert_eq!(result.table.column_names(), vec!["id", "cust", "amt", "name"]);
        assert_eq!(result.provenance.state, Stage::Joined);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[1].severity, Severity::Error);
    }

    #[test]
    fn test_bad_filter_clause_does_not_stop_others() {
        let request = PipelineRequest::join(orders_with_customers())
            .filter(FilterClause::new("discount", Predicate::Gt(1.into())))
            .filter(FilterClause::new("amt", Predicate::Gte(70.into())));
        let (result, diagnostics) = run(&catalog(), &request);

        assert_eq!(
            result
                .table
                .column("id")
                .unwrap()
                .values()
                .collect::<Vec<_>>(),
            vec![Value::Int(3), Value::Int(4)]
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].step, Step::Filter);
        assert_eq!(diagnostics[0].clause.as_deref(), Some("discount > 1"));
    }

    #[test]
    fn test_stage_with_every_clause_skipped_does_not_advance() {
        let request = PipelineRequest::join(orders_with_customers())
            .filter(FilterClause::new("discount", Predicate::Gt(1.into())))
            .sort_by(SortRule::asc("rank"));
        let (result, diagnostics) = run(&catalog(), &request);

        assert_eq!(result.provenance.state, Stage::Projected);
        assert_eq!(result.provenance.stages_applied, 2);
        assert_eq!(result.table.row_count, 5);
        let steps: Vec<_> = diagnostics.iter().map(|d| d.step).collect();
        assert_eq!(steps, vec![Step::Filter, Step::Sort]);
    }

    #[test]
    fn test_aggregation_failure_keeps_previous_table() {
        let request = PipelineRequest::join(orders_with_customers())
            .aggregate(AggregationSpec::new("cust", "name", Reducer::Sum))
            .sort_by(SortRule::desc("amt"));
        let (result, diagnostics) = run(&catalog(), &request);

        // the joined rows survive and are still sorted
        assert_eq!(result.table.row_count, 5);
        assert_eq!(result.table.get_row(0).unwrap()[2], Value::Int(150));
        assert_eq!(result.provenance.state, Stage::Done);
        assert_eq!(result.provenance.stages_applied, 3);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].step, Step::Aggregation);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert!(matches!(
            diagnostics[0].cause,
            Error::AggregationType { .. }
        ));
    }

    #[test]
    fn test_missing_group_column_is_stage_error() {
        let request = PipelineRequest::join(orders_with_customers())
            .aggregate(AggregationSpec::new("cust_left", "amt", Reducer::Sum));
        let (result, diagnostics) = run(&catalog(), &request);

        assert_eq!(result.provenance.state, Stage::Projected);
        assert!(matches!(
            diagnostics[0].cause,
            Error::ColumnNotFound { .. }
        ));
    }

    #[test]
    fn test_having_unknown_column_is_warning() {
        let request = PipelineRequest::table("orders").aggregate(
            AggregationSpec::new("cust", "amt", Reducer::Count)
                .having(FilterClause::new("orders", Predicate::Gt(1.into()))),
        );
        let (result, diagnostics) = run(&catalog(), &request);

        assert_eq!(result.provenance.state, Stage::Aggregated);
        assert_eq!(result.table.row_count, 4);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].step, Step::Having);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_single_table_run() {
        let request = PipelineRequest::table("customers").sort_by(SortRule::desc("name"));
        let (result, diagnostics) = run(&catalog(), &request);

        assert!(diagnostics.is_empty());
        assert_eq!(result.provenance.source, "customers");
        assert_eq!(
            result
                .table
                .column("name")
                .unwrap()
                .values()
                .collect::<Vec<_>>(),
            vec![text("Cal"), text("Ben"), text("Ann")]
        );
    }

    #[test]
    fn test_catalog_is_untouched() {
        let catalog = catalog();
        let before = catalog.clone();
        let request = PipelineRequest::join(orders_with_customers())
            .filter(FilterClause::new("amt", Predicate::Lt(50.into())))
            .sort_by(SortRule::desc("id"));
        let _ = run(&catalog, &request);

        assert_eq!(catalog.get("orders").unwrap(), before.get("orders").unwrap());
        assert_eq!(
            catalog.get("customers").unwrap(),
            before.get("customers").unwrap()
        );
    }

    #[test]
    fn test_filters_compose_conjunctively() {
        let table = run_join(&catalog(), &orders_with_customers()).unwrap();
        let first = FilterClause::new("amt", Predicate::Gt(25.into()));
        let second = FilterClause::new("cust", Predicate::In(vec!["c1".into(), "c2".into()]));

        let (together, _) = run_filter(&table, &[first.clone(), second.clone()]);
        let (once, _) = run_filter(&table, &[first]);
        let (twice, _) = run_filter(&once, &[second]);
        assert_eq!(together, twice);
    }

    #[test]
    fn test_request_from_json() {
        let request: PipelineRequest = serde_json::from_str(
            r#"{
                "source": {"join": {"left": "orders", "right": "customers",
                                    "left_on": "cust", "right_on": "cust"}},
                "projection": ["cust", "amt"],
                "filters": [{"column": "amt", "op": "BETWEEN", "operand": [10, 100]}],
                "aggregation": {"group_by": "cust", "column": "amt", "reducer": "mean"},
                "sort": [{"column": "amt", "ascending": false}]
            }"#,
        )
        .unwrap();

        assert_eq!(
            request,
            PipelineRequest::join(orders_with_customers())
                .project(["cust", "amt"])
                .filter(FilterClause::new(
                    "amt",
                    Predicate::Between(10.into(), 100.into())
                ))
                .aggregate(AggregationSpec::new("cust", "amt", Reducer::Mean))
                .sort_by(SortRule::desc("amt"))
        );

        let (result, diagnostics) = run(&catalog(), &request);
        assert!(diagnostics.is_empty());
        assert_eq!(
            rows(&result.table),
            vec![
                vec![text("c1"), Value::Float(65.0)],
                vec![text("c2"), Value::Float(25.0)],
            ]
        );
    }

    #[test]
    fn test_single_table_request_json() {
        let request: PipelineRequest = serde_json::from_str(r#"{"source": {"table": "orders"}}"#).unwrap();
        assert_eq!(request, PipelineRequest::table("orders"));
    }
}
