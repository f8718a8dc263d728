pub mod aggregate;
pub mod catalog;
pub mod column;
pub mod data_type;
pub mod diagnostic;
pub mod error;
pub mod join;
pub mod parser;
pub mod pipeline;
pub mod predicate;
pub mod sort;
pub mod table;
pub mod tokenizer;
pub mod value;

pub use aggregate::{AggregationSpec, Reducer};
pub use catalog::Catalog;
pub use column::Column;
pub use data_type::DataType;
pub use diagnostic::{Diagnostic, Severity, Step};
pub use error::{Error, Result};
pub use join::{JoinKind, JoinSpec};
pub use pipeline::{PipelineRequest, Provenance, ResultTable, Source, Stage, run};
pub use predicate::{FilterClause, Literal, Operator, Predicate};
pub use sort::SortRule;
pub use table::{ColumnDef, Schema, Table};
pub use value::Value;
