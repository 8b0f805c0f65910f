//! Error types for statement building, rendering, splitting and pair validation.

use thiserror::Error;

/// Errors raised while a statement is being built.
///
/// A builder that records one of these unwinds its context frames back to the
/// statement entry point; no partial statement is ever produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Duplicate alias '{0}' in the same scope")]
    DuplicateAlias(String),

    #[error("Unresolved alias '{0}'")]
    UnresolvedAlias(String),

    #[error("Unknown column '{column}' on '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Ambiguous column '{column}': matches {candidates:?}")]
    AmbiguousColumn {
        column: String,
        candidates: Vec<String>,
    },

    #[error("Unresolved column '{0}'")]
    UnresolvedColumn(String),

    #[error("Duplicate CTE name '{0}'")]
    DuplicateCte(String),

    #[error("Unknown CTE '{0}'")]
    UnknownCte(String),

    #[error("Recursive CTE '{0}' must be a UNION of an anchor and a recursive branch")]
    InvalidRecursiveCte(String),

    #[error("Duplicate window name '{0}'")]
    DuplicateWindow(String),

    #[error("Unknown window '{0}'")]
    UnknownWindow(String),

    #[error("Invalid window frame: {0}")]
    InvalidFrame(String),

    #[error("{feature} is not available for the active dialect profile")]
    Unsupported { feature: &'static str },

    #[error("CASE expression without WHEN arms")]
    EmptyCase,

    #[error("Malformed CASE expression: {0}")]
    MalformedCase(&'static str),

    #[error("Row has {found} values, expected {expected}")]
    RowWidth { expected: usize, found: usize },

    #[error("INSERT into '{0}' has no rows")]
    EmptyInsert(String),

    #[error("UPDATE of '{0}' has no assignments")]
    NoAssignments(String),

    #[error("Invalid table metadata: {0}")]
    InvalidMeta(String),

    #[error("Column '{column}' of '{table}' cannot be targeted directly")]
    ParentColumn { table: String, column: String },
}

/// Errors raised while turning a finalized statement into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Type mismatch: {column_type} column cannot bind a {value} value")]
    TypeMismatch {
        column_type: String,
        value: &'static str,
    },

    #[error("Value {value} is out of range for {column_type}")]
    OutOfRange { column_type: String, value: String },

    #[error("Value {value} does not fit {column_type}")]
    Precision { column_type: String, value: String },

    #[error("SQL type {0} is not supported")]
    UnsupportedType(String),

    #[error("Value cannot be rendered: {0}")]
    UnsupportedValue(String),

    #[error("{feature} is not supported by {dialect}")]
    Unsupported {
        feature: &'static str,
        dialect: &'static str,
    },

    #[error("Identifier '{ident}' contains the quote character {quote}")]
    IdentifierQuote { ident: String, quote: char },

    #[error("Empty identifier")]
    EmptyIdentifier,

    #[error("Invalid function name '{0}'")]
    InvalidFunctionName(String),

    #[error("DEFAULT is only valid as an INSERT value or SET source")]
    MisplacedDefault,

    #[error("Codec failed for column '{column}': {message}")]
    Codec { column: String, message: String },
}

/// Usage errors raised while splitting a statement over a parent/child pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("Table '{0}' has no parent link")]
    NoParent(String),

    #[error("Filter of the {second} statement reads '{column}', which the {first} statement assigns")]
    UnstableFilter {
        first: String,
        second: String,
        column: String,
    },

    #[error("Discriminator column '{0}' cannot be assigned")]
    DiscriminatorAssignment(String),

    #[error("Discriminator value for '{table}' must be {expected}, got {found}")]
    DiscriminatorConflict {
        table: String,
        expected: String,
        found: String,
    },

    #[error("Column '{0}' would be bound by both statements of the split; filter by key or inline the value")]
    SharedColumn(String),

    #[error("Cannot split {0}")]
    Unsupported(&'static str),
}

/// Mismatch between the results of the two halves of a `PairStmt`.
///
/// Faults are fatal for the owning transaction: never retried, never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyFault {
    #[error("Row count mismatch: first statement affected {first}, second affected {second}")]
    RowCountMismatch { first: u64, second: u64 },

    #[error("Generated key mismatch: expected {expected} keys, got {found}")]
    GeneratedKeyMismatch { expected: usize, found: usize },
}

impl ConsistencyFault {
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// The owning transaction must be rolled back.
    pub fn requires_rollback(&self) -> bool {
        true
    }
}

/// The main error type for criteria operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QailError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("Consistency fault: {0}")]
    Consistency(#[from] ConsistencyFault),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QailError {
    /// Create an execution error from a driver message.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }

    pub fn is_consistency_fault(&self) -> bool {
        matches!(self, Self::Consistency(_))
    }
}

/// Result type alias for criteria operations.
pub type QailResult<T> = Result<T, QailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: QailError = BuildError::DuplicateAlias("u".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Build error: Duplicate alias 'u' in the same scope"
        );
    }

    #[test]
    fn test_fault_is_fatal() {
        let fault = ConsistencyFault::RowCountMismatch { first: 2, second: 1 };
        assert!(!fault.is_retryable());
        assert!(fault.requires_rollback());
        assert!(QailError::from(fault).is_consistency_fault());
    }
}
