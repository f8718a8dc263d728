use std::collections::HashSet;
use std::fmt;

use bitvec::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::data_type::DataType;
use crate::diagnostic::{Diagnostic, Step};
use crate::error::{Error, Result};
use crate::parser::Parser;
use crate::table::Table;
use crate::tokenizer::Tokenizer;
use crate::value::{self, KeyValue, Value};

/// The closed set of filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Neq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Between => "BETWEEN",
            Self::Like => "LIKE",
            Self::In => "IN",
        }
    }

    /// Accepts the SQL spelling of an operator; keywords are case-insensitive
    /// and `!=` is an alias of `<>`.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol.trim().to_uppercase().as_str() {
            "=" | "==" => Self::Eq,
            "<>" | "!=" => Self::Neq,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Gte,
            "<=" => Self::Lte,
            "BETWEEN" => Self::Between,
            "LIKE" => Self::Like,
            "IN" => Self::In,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A literal operand. Its meaning is resolved against the static type of the
/// column it is compared with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    /// Reads a literal typed in by a user: numbers and boolean tokens are
    /// recognised, everything else is text.
    pub fn from_text(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(i) = value::parse_int(raw) {
            Self::Int(i)
        } else if let Some(f) = value::parse_float(raw) {
            Self::Float(f)
        } else if let Some(b) = value::parse_bool(raw) {
            Self::Bool(b)
        } else {
            Self::Text(raw.to_string())
        }
    }

    /// Numeric reading of the literal; numeric-looking text counts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => value::parse_float(s),
            Self::Bool(_) => None,
        }
    }

    /// Reads the literal as a value of the given column type, if it fits.
    fn coerce(&self, data_type: DataType) -> Option<Value> {
        match (self, data_type) {
            (Self::Int(i), DataType::Int) => Some(Value::Int(*i)),
            // i64::MAX as f64 rounds up to 2^63, which is already out of range
            (Self::Float(f), DataType::Int)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(Value::Int(*f as i64))
            }
            (_, DataType::Float) => self.as_f64().map(Value::Float),
            (Self::Bool(b), DataType::Bool) => Some(Value::Bool(*b)),
            (Self::Text(s), _) => Value::parse_as(s.trim(), data_type),
            (_, DataType::Text) => Some(Value::Text(self.to_string().into())),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// An operator together with its typed operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "operand")]
pub enum Predicate {
    #[serde(rename = "=")]
    Eq(Literal),
    #[serde(rename = "<>")]
    Neq(Literal),
    #[serde(rename = ">")]
    Gt(Literal),
    #[serde(rename = "<")]
    Lt(Literal),
    #[serde(rename = ">=")]
    Gte(Literal),
    #[serde(rename = "<=")]
    Lte(Literal),
    /// Inclusive on both ends.
    #[serde(rename = "BETWEEN")]
    Between(Literal, Literal),
    /// `%` matches any run of characters, `_` exactly one.
    #[serde(rename = "LIKE")]
    Like(String),
    #[serde(rename = "IN")]
    In(Vec<Literal>),
}

impl Predicate {
    pub fn operator(&self) -> Operator {
        match self {
            Self::Eq(_) => Operator::Eq,
            Self::Neq(_) => Operator::Neq,
            Self::Gt(_) => Operator::Gt,
            Self::Lt(_) => Operator::Lt,
            Self::Gte(_) => Operator::Gte,
            Self::Lte(_) => Operator::Lte,
            Self::Between(..) => Operator::Between,
            Self::Like(_) => Operator::Like,
            Self::In(_) => Operator::In,
        }
    }
}

/// One `column <op> operand` condition of a filter or HAVING list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub column: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

impl FilterClause {
    pub fn new(column: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            column: column.into(),
            predicate,
        }
    }

    /// Builds a clause from the three raw strings a form would collect: the
    /// column, the operator and the operand text.
    ///
    /// `BETWEEN` expects `lo, hi`, `IN` a comma separated list and `LIKE` the
    /// pattern itself.
    ///
    /// # Errors
    /// [Error::Parse] for an unknown operator, [Error::InvalidOperand] for a
    /// `BETWEEN` operand that is not exactly two numbers or an empty `IN` list.
    ///
    /// # Example
    /// ```
    /// use tablepipe::predicate::{FilterClause, Literal, Predicate};
    ///
    /// let clause = FilterClause::from_raw("amt", "BETWEEN", "10, 50").unwrap();
    /// assert_eq!(
    ///     clause.predicate,
    ///     Predicate::Between(Literal::Int(10), Literal::Int(50))
    /// );
    /// ```
    pub fn from_raw(column: &str, operator: &str, operand: &str) -> Result<Self> {
        let op = Operator::from_symbol(operator)
            .ok_or_else(|| Error::Parse(format!("unknown operator {operator:?}")))?;
        let invalid = |reason: String| Error::InvalidOperand {
            column: column.to_string(),
            operator: op.to_string(),
            reason,
        };

        let predicate = match op {
            Operator::Between => {
                let bounds: Vec<Literal> = operand.split(',').map(Literal::from_text).collect();
                match bounds.as_slice() {
                    [lo, hi] if lo.as_f64().is_some() && hi.as_f64().is_some() => {
                        Predicate::Between(lo.clone(), hi.clone())
                    }
                    _ => return Err(invalid(format!("expected `lo, hi`, got {operand:?}"))),
                }
            }
            Operator::In => {
                let items: Vec<Literal> = operand
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(Literal::from_text)
                    .collect();
                if items.is_empty() {
                    return Err(invalid("empty list".into()));
                }
                Predicate::In(items)
            }
            Operator::Like => Predicate::Like(operand.to_string()),
            comparison => comparison_predicate(comparison, Literal::from_text(operand)),
        };
        Ok(Self::new(column, predicate))
    }

    /// Parses a clause written as text, for example `amt BETWEEN 10 AND 50`,
    /// `name LIKE 'A%'` or `cust IN ('a', 'b')`.
    ///
    /// Column names with spaces are written between double quotes. Dates are
    /// written as strings: `at >= '2024-01-01'`.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = Tokenizer::new(text).tokenize()?;
        Parser::new(tokens).parse()
    }
}

pub(crate) fn comparison_predicate(op: Operator, literal: Literal) -> Predicate {
    match op {
        Operator::Neq => Predicate::Neq(literal),
        Operator::Gt => Predicate::Gt(literal),
        Operator::Lt => Predicate::Lt(literal),
        Operator::Gte => Predicate::Gte(literal),
        Operator::Lte => Predicate::Lte(literal),
        _ => Predicate::Eq(literal),
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = &self.column;
        match &self.predicate {
            Predicate::Between(lo, hi) => write!(f, "{column} BETWEEN {lo} AND {hi}"),
            Predicate::Like(pattern) => write!(f, "{column} LIKE '{pattern}'"),
            Predicate::In(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{column} IN ({})", items.join(", "))
            }
            Predicate::Eq(lit)
            | Predicate::Neq(lit)
            | Predicate::Gt(lit)
            | Predicate::Lt(lit)
            | Predicate::Gte(lit)
            | Predicate::Lte(lit) => {
                write!(f, "{column} {} {lit}", self.predicate.operator())
            }
        }
    }
}

/// Evaluates one predicate against a column and returns the set of matching
/// rows as a bitmap (bit `i` set when row `i` matches).
///
/// `NULL` cells never match, whatever the operator.
///
/// # Errors
/// - [Error::TypeMismatch] when a comparison or `BETWEEN` operand cannot be read
///   as a number on a numeric column (or `BETWEEN` is used on a non-numeric one).
/// - [Error::InvalidOperand] for malformed `BETWEEN`/`IN`/`LIKE` operands.
pub fn evaluate(column: &Column, predicate: &Predicate) -> Result<BitVec> {
    let invalid = |reason: String| Error::InvalidOperand {
        column: column.name.clone(),
        operator: predicate.operator().to_string(),
        reason,
    };

    match predicate {
        Predicate::Eq(lit)
        | Predicate::Neq(lit)
        | Predicate::Gt(lit)
        | Predicate::Lt(lit)
        | Predicate::Gte(lit)
        | Predicate::Lte(lit) => compare(column, predicate.operator(), lit),

        Predicate::Between(lo, hi) => {
            let (Some(lo), Some(hi)) = (lo.as_f64(), hi.as_f64()) else {
                return Err(invalid(format!("bounds {lo} and {hi} must be numeric")));
            };
            if !column.data_type.is_numeric() {
                return Err(Error::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.data_type,
                    found: format!("numeric range {lo}..={hi}"),
                });
            }
            Ok(mask(column, |value| {
                value.as_f64().is_some_and(|v| lo <= v && v <= hi)
            }))
        }

        Predicate::Like(pattern) => {
            let regex = like_regex(pattern).map_err(|e| invalid(e.to_string()))?;
            Ok(mask(column, |value| regex.is_match(&value.to_string())))
        }

        Predicate::In(items) => {
            if items.is_empty() {
                return Err(invalid("empty list".into()));
            }
            if column.data_type.is_numeric() {
                let keys = items
                    .iter()
                    .map(|item| {
                        item.as_f64()
                            .map(|f| Value::Float(f).widened_key())
                            .ok_or_else(|| invalid(format!("{item:?} is not a number")))
                    })
                    .collect::<Result<HashSet<KeyValue>>>()?;
                Ok(mask(column, |value| keys.contains(&value.widened_key())))
            } else {
                let keys: HashSet<String> = items
                    .iter()
                    .map(|item| match item.coerce(column.data_type) {
                        Some(value) => value.to_string(),
                        None => item.to_string().trim().to_string(),
                    })
                    .collect();
                Ok(mask(column, |value| keys.contains(&value.to_string())))
            }
        }
    }
}

/// Dispatches `=`, `<>`, `>`, `<`, `>=`, `<=` on the column's static type.
fn compare(column: &Column, op: Operator, literal: &Literal) -> Result<BitVec> {
    let data_type = column.data_type;

    if data_type.is_numeric() {
        let Some(rhs) = literal.as_f64() else {
            return Err(Error::TypeMismatch {
                column: column.name.clone(),
                expected: data_type,
                found: format!("{literal:?}"),
            });
        };
        let exact = match literal.coerce(DataType::Int) {
            Some(Value::Int(i)) if data_type == DataType::Int => Some(i),
            _ => None,
        };
        return Ok(mask(column, |value| match (value, exact) {
            (Value::Int(lhs), Some(rhs)) => holds(op, lhs.cmp(&rhs)),
            _ => value.as_f64().is_some_and(|lhs| float_holds(op, lhs, rhs)),
        }));
    }

    // booleans and datetimes compare natively when the operand reads as one,
    // everything else compares on the displayed text
    match literal.coerce(data_type) {
        Some(rhs) if data_type != DataType::Text => {
            Ok(mask(column, |value| holds(op, value.sort_cmp(&rhs))))
        }
        _ => {
            let rhs = literal.to_string();
            Ok(mask(column, |value| {
                holds(op, value.to_string().as_str().cmp(rhs.as_str()))
            }))
        }
    }
}

fn holds(op: Operator, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        Operator::Eq => ord == Equal,
        Operator::Neq => ord != Equal,
        Operator::Gt => ord == Greater,
        Operator::Lt => ord == Less,
        Operator::Gte => ord != Less,
        Operator::Lte => ord != Greater,
        Operator::Between | Operator::Like | Operator::In => false,
    }
}

fn float_holds(op: Operator, lhs: f64, rhs: f64) -> bool {
    lhs.partial_cmp(&rhs).is_some_and(|ord| holds(op, ord))
}

/// Applies `matches` to every non-null cell.
fn mask(column: &Column, mut matches: impl FnMut(&Value) -> bool) -> BitVec {
    column
        .values()
        .map(|value| !value.is_null() && matches(&value))
        .collect()
}

/// Translates a LIKE pattern into an anchored, case-sensitive regex.
fn like_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let mut regex = String::from("(?s)^");
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    regex.push('$');
    Regex::new(&regex)
}

/// Evaluates `clauses` conjunctively over `table`.
///
/// A clause that fails (unknown column, bad operand) is skipped and reported;
/// the remaining clauses still apply.
pub fn evaluate_all(table: &Table, clauses: &[FilterClause]) -> (BitVec, Vec<Diagnostic>) {
    evaluate_clauses(table, clauses, Step::Filter)
}

pub(crate) fn evaluate_clauses(
    table: &Table,
    clauses: &[FilterClause],
    step: Step,
) -> (BitVec, Vec<Diagnostic>) {
    let mut selected = bitvec![1; table.row_count];
    let mut diagnostics = Vec::new();

    for clause in clauses {
        let outcome = table
            .column(&clause.column)
            .and_then(|column| evaluate(column, &clause.predicate));
        match outcome {
            Ok(matching) => {
                for row_idx in matching.iter_zeros() {
                    selected.set(row_idx, false);
                }
            }
            Err(cause) => diagnostics.push(Diagnostic::clause_skipped(step, clause, cause)),
        }
    }

    (selected, diagnostics)
}

/// Keeps the rows of `table` that satisfy every clause, in their original order.
pub fn apply_filters(table: &Table, clauses: &[FilterClause]) -> (Table, Vec<Diagnostic>) {
    filter_table(table, clauses, Step::Filter)
}

pub(crate) fn filter_table(
    table: &Table,
    clauses: &[FilterClause],
    step: Step,
) -> (Table, Vec<Diagnostic>) {
    let (selected, diagnostics) = evaluate_clauses(table, clauses, step);
    let rows: Vec<usize> = selected.iter_ones().collect();
    log::debug!(
        "{step}: {} of {} rows of {} kept",
        rows.len(),
        table.row_count,
        table.name
    );
    (table.take_rows(&rows), diagnostics)
}
