use std::fmt;

/// Represents the semantic types a loaded column can carry.
/// The type is inferred once at load time and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// A 64-bit signed integer.
    Int,
    /// A 64-bit floating-point number.
    Float,
    /// A variable-length UTF-8 character string.
    Text,
    /// A boolean value (true or false).
    Bool,
    /// A calendar date and wall-clock time, without timezone.
    DateTime,
}

impl DataType {
    /// Returns `true` for [DataType::Int] and [DataType::Float].
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "integer",
            Self::Float => "float",
            Self::Text => "string",
            Self::Bool => "boolean",
            Self::DateTime => "datetime",
        };
        f.write_str(name)
    }
}
