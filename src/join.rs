use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::table::Table;
use crate::value::{KeyValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Only rows whose keys match on both sides.
    #[default]
    Inner,
    /// Every left row at least once; unmatched rows get nulls on the right.
    Left,
    /// Every right row at least once; unmatched rows get nulls on the left.
    Right,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(name)
    }
}

/// Describes how two catalog tables are joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Name of the left table in the catalog.
    pub left: String,
    /// Name of the right table in the catalog.
    pub right: String,
    pub left_on: String,
    pub right_on: String,
    #[serde(default)]
    pub kind: JoinKind,
    /// Appended to left columns whose name also exists on the right.
    #[serde(default = "default_left_suffix")]
    pub left_suffix: String,
    /// Appended to right columns whose name also exists on the left.
    #[serde(default = "default_right_suffix")]
    pub right_suffix: String,
}

fn default_left_suffix() -> String {
    "_left".into()
}

fn default_right_suffix() -> String {
    "_right".into()
}

impl JoinSpec {
    /// A join on `left.left_on = right.right_on` with the default suffixes.
    pub fn new(
        left: impl Into<String>,
        right: impl Into<String>,
        left_on: impl Into<String>,
        right_on: impl Into<String>,
        kind: JoinKind,
    ) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            left_on: left_on.into(),
            right_on: right_on.into(),
            kind,
            left_suffix: default_left_suffix(),
            right_suffix: default_right_suffix(),
        }
    }

    pub fn with_suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_suffix = left.into();
        self.right_suffix = right.into();
        self
    }

    /// Both sides use the same key name, so the output carries a single merged
    /// key column.
    fn shares_key(&self) -> bool {
        self.left_on == self.right_on
    }
}

/// A pair of source rows making up one output row; `None` is the null side of
/// an outer join.
type RowPair = (Option<usize>, Option<usize>);

/// Hash-joins `left` and `right` on the key columns named by `spec`.
///
/// The hash index is built over the smaller table and probed with the larger
/// one. Output rows follow the preserved side: left row order for inner and
/// left joins, right row order for right joins, with matches in the other
/// table's row order. Null keys never match.
///
/// When both key columns share a name the output has a single key column at the
/// left key's position. Every other name present on both sides is renamed on
/// both sides with the configured suffixes.
///
/// # Errors
/// [Error::Join] if a key column is missing, if the key types are not
/// comparable (numeric with numeric or text with text), or if the
/// suffixes fail to produce unique column names.
pub fn join(left: &Table, right: &Table, spec: &JoinSpec) -> Result<Table> {
    let fail = |reason: String| Error::Join {
        left: left.name.clone(),
        right: right.name.clone(),
        reason,
    };

    let left_key = left
        .get_col(&spec.left_on)
        .ok_or_else(|| fail(format!("key column {:?} not found in {}", spec.left_on, left.name)))?;
    let right_key = right.get_col(&spec.right_on).ok_or_else(|| {
        fail(format!(
            "key column {:?} not found in {}",
            spec.right_on, right.name
        ))
    })?;

    let (left_type, right_type) = (left_key.data_type, right_key.data_type);
    let comparable = (left_type.is_numeric() && right_type.is_numeric())
        || (left_type == DataType::Text && right_type == DataType::Text);
    if !comparable {
        return Err(fail(format!(
            "key types {left_type} and {right_type} are not comparable"
        )));
    }
    let widen = left_type != right_type;

    let pairs: Vec<(usize, usize)> = if left.row_count <= right.row_count {
        let index = build_index(left_key, widen);
        probe(right_key, &index, widen)
            .into_iter()
            .map(|(r, l)| (l, r))
            .collect()
    } else {
        let index = build_index(right_key, widen);
        probe(left_key, &index, widen)
    };

    let rows: Vec<RowPair> = match spec.kind {
        JoinKind::Inner => {
            let mut pairs = pairs;
            pairs.sort_unstable();
            pairs.into_iter().map(|(l, r)| (Some(l), Some(r))).collect()
        }
        JoinKind::Left => preserve(left.row_count, pairs)
            .into_iter()
            .map(|(l, r)| (Some(l), r))
            .collect(),
        JoinKind::Right => {
            let swapped = pairs.into_iter().map(|(l, r)| (r, l)).collect();
            preserve(right.row_count, swapped)
                .into_iter()
                .map(|(r, l)| (l, Some(r)))
                .collect()
        }
    };

    log::debug!(
        "join: {} ({} rows) {} {} ({} rows) on {} = {} -> {} rows",
        left.name,
        left.row_count,
        spec.kind,
        right.name,
        right.row_count,
        spec.left_on,
        spec.right_on,
        rows.len()
    );

    let merged = spec.shares_key();
    let is_merged_key = |name: &str| merged && name == spec.left_on;
    let left_names: HashSet<&str> = left
        .column_names()
        .into_iter()
        .filter(|name| !is_merged_key(name))
        .collect();
    let right_names: HashSet<&str> = right
        .column_names()
        .into_iter()
        .filter(|name| !is_merged_key(name))
        .collect();

    let mut columns = Vec::with_capacity(left.columns.len() + right.columns.len());
    for column in &left.columns {
        if is_merged_key(&column.name) {
            columns.push(merge_keys(left_key, right_key, &rows)?);
            continue;
        }
        let out = column.take(rows.iter().map(|(l, _)| *l));
        columns.push(suffixed(out, &right_names, &spec.left_suffix));
    }
    for column in &right.columns {
        if is_merged_key(&column.name) {
            continue;
        }
        let out = column.take(rows.iter().map(|(_, r)| *r));
        columns.push(suffixed(out, &left_names, &spec.right_suffix));
    }

    let name = format!("{}_{}_{}", left.name, spec.kind, right.name);
    Table::from_columns(name, columns)
        .map_err(|e| fail(format!("suffixes do not yield unique column names: {e}")))
}

fn join_key(value: &Value, widen: bool) -> KeyValue {
    if widen {
        value.widened_key()
    } else {
        value.key()
    }
}

/// Maps each non-null key to the rows holding it, in row order.
fn build_index(column: &Column, widen: bool) -> HashMap<KeyValue, Vec<usize>> {
    let mut index: HashMap<KeyValue, Vec<usize>> = HashMap::new();
    for (row_idx, value) in column.values().enumerate() {
        if !value.is_null() {
            index
                .entry(join_key(&value, widen))
                .or_default()
                .push(row_idx);
        }
    }
    index
}

/// Returns `(probe row, build row)` for every key match.
fn probe(
    column: &Column,
    index: &HashMap<KeyValue, Vec<usize>>,
    widen: bool,
) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (row_idx, value) in column.values().enumerate() {
        if value.is_null() {
            continue;
        }
        if let Some(matches) = index.get(&join_key(&value, widen)) {
            pairs.extend(matches.iter().map(|&other| (row_idx, other)));
        }
    }
    pairs
}

/// Emits every row of the preserved side in order, each followed by its
/// matches (`(kept, other)` pairs), or once with `None` when it has none.
fn preserve(count: usize, mut pairs: Vec<(usize, usize)>) -> Vec<(usize, Option<usize>)> {
    pairs.sort_unstable();
    let mut out = Vec::with_capacity(count.max(pairs.len()));
    let mut pairs = pairs.into_iter().peekable();
    for kept in 0..count {
        let mut matched = false;
        while let Some(&(_, other)) = pairs.peek().filter(|(k, _)| *k == kept) {
            out.push((kept, Some(other)));
            pairs.next();
            matched = true;
        }
        if !matched {
            out.push((kept, None));
        }
    }
    out
}

/// Builds the single key column of a same-name join, taking the left key and
/// falling back to the right one for right-only rows.
fn merge_keys(left_key: &Column, right_key: &Column, rows: &[RowPair]) -> Result<Column> {
    let data_type = if left_key.data_type == right_key.data_type {
        left_key.data_type
    } else {
        DataType::Float
    };
    let values = rows.iter().map(|&(l, r)| {
        let from_left = l.and_then(|l| left_key.get(l)).filter(|v| !v.is_null());
        from_left
            .or_else(|| r.and_then(|r| right_key.get(r)))
            .unwrap_or(Value::Null)
            .widen_to(data_type)
    });
    Column::from_values(left_key.name.clone(), data_type, values)
}

fn suffixed(column: Column, other_side: &HashSet<&str>, suffix: &str) -> Column {
    if other_side.contains(column.name.as_str()) {
        let name = format!("{}{}", column.name, suffix);
        column.renamed(name)
    } else {
        column
    }
}
