use std::fmt;

use crate::error::Error;

/// The pipeline step a [Diagnostic] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fetching the input table of a single-table run.
    Source,
    Join,
    Projection,
    Filter,
    Aggregation,
    Having,
    Sort,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Join => "join",
            Self::Projection => "projection",
            Self::Filter => "filter",
            Self::Aggregation => "aggregation",
            Self::Having => "having",
            Self::Sort => "sort",
        };
        f.write_str(name)
    }
}

/// How much of the pipeline a diagnostic cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A single clause or column was skipped.
    Warning,
    /// A whole stage was skipped or the pipeline stopped.
    Error,
}

/// A structured record of something the pipeline skipped instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub step: Step,
    pub severity: Severity,
    /// Human readable form of the offending clause, when there is one.
    pub clause: Option<String>,
    pub cause: Error,
}

impl Diagnostic {
    /// A skipped clause inside an otherwise healthy stage.
    pub fn clause_skipped(step: Step, clause: impl fmt::Display, cause: Error) -> Self {
        log::warn!("{step}: skipping `{clause}`: {cause}");
        Self {
            step,
            severity: Severity::Warning,
            clause: Some(clause.to_string()),
            cause,
        }
    }

    /// A stage that could not run at all.
    pub fn stage_failed(step: Step, cause: Error) -> Self {
        log::warn!("{step}: stage skipped: {cause}");
        Self {
            step,
            severity: Severity::Error,
            clause: None,
            cause,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.clause {
            Some(clause) => write!(f, "[{}] `{}`: {}", self.step, clause, self.cause),
            None => write!(f, "[{}] {}", self.step, self.cause),
        }
    }
}
