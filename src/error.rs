//! Unified error handling for GraphForge
//!
//! Every fallible operation in the graph core returns [`ForgeResult`]. The
//! variants map one-to-one onto the failure kinds the graph operations can
//! raise, and are grouped into categories:
//! - User errors (bad builder arguments, unparsable argument strings)
//! - Graph errors (binding and rewiring violations)
//! - Compute errors (arithmetic faults, host callback failures)
//! - Archive errors (malformed or mistyped archives)
//! - Internal errors (bugs)
//!
//! Errors are never retried or swallowed by the core; an operation that fails
//! leaves its target model unchanged.

use std::fmt;

use crate::graph::PortType;

// Re-export thiserror for convenience
pub use thiserror;

/// Unified error type for GraphForge
#[derive(Debug, thiserror::Error)]
pub enum GraphForgeError {
    // ========== Builder Errors ==========
    /// A parameter violates a declared constraint
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Generic AddNode was given a kind name that is not registered
    #[error("Unknown node kind: {0}")]
    UnknownKind(String),

    /// Generic AddNode argument rejected by the kind's schema
    #[error("Cannot parse argument '{name}' from \"{value}\": {reason}")]
    ArgParseError {
        name: String,
        value: String,
        reason: String,
    },

    // ========== Binding Errors ==========
    /// Element types disagree across an edge
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: PortType, actual: PortType },

    /// Total size of a PortElements differs from the consuming port
    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Index beyond the end of a PortElements
    #[error("Index {index} out of range for size {size}")]
    OutOfRange { index: usize, size: usize },

    /// Referenced port belongs to another model
    #[error("Port belongs to model {found}, not model {expected}")]
    CrossModel { expected: u64, found: u64 },

    /// A rewire would create a directed cycle
    #[error("Rewiring input '{port}' of node {node} would introduce a cycle")]
    CycleIntroduced { node: usize, port: String },

    // ========== Transformer Errors ==========
    /// Refinement did not reach a fixed point within the iteration cap
    #[error("Refinement did not converge after {iterations} iterations")]
    RefinementDivergence { iterations: usize },

    // ========== Archive Errors ==========
    /// Field was read as a different type than it was written
    #[error("Archive field '{field}' has type {actual}, expected {expected}")]
    ArchiveTypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Malformed archive text
    #[error("Archive format error: {0}")]
    Archive(#[from] serde_json::Error),

    // ========== Compute Errors ==========
    /// Integer division by zero
    #[error("Arithmetic error: {0}")]
    ArithmeticError(String),

    /// A host runtime callback reported failure
    #[error("Host callback '{name}' failed: {reason}")]
    Host { name: String, reason: String },

    // ========== Internal Errors ==========
    /// Internal error (indicates a bug)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GraphForgeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            GraphForgeError::InvalidArgument(_)
            | GraphForgeError::UnknownKind(_)
            | GraphForgeError::ArgParseError { .. } => ErrorCategory::User,

            GraphForgeError::TypeMismatch { .. }
            | GraphForgeError::SizeMismatch { .. }
            | GraphForgeError::OutOfRange { .. }
            | GraphForgeError::CrossModel { .. }
            | GraphForgeError::CycleIntroduced { .. }
            | GraphForgeError::RefinementDivergence { .. } => ErrorCategory::Graph,

            GraphForgeError::ArithmeticError(_) | GraphForgeError::Host { .. } => {
                ErrorCategory::Compute
            }

            GraphForgeError::ArchiveTypeMismatch { .. } | GraphForgeError::Archive(_) => {
                ErrorCategory::Archive
            }

            GraphForgeError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this is a user-facing error (actionable by the caller)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }

    pub(crate) fn arg_parse(name: &str, value: &str, reason: impl Into<String>) -> Self {
        GraphForgeError::ArgParseError {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid builder input
    User,
    /// Graph wiring or rewriting violation
    Graph,
    /// Failure during interpretive evaluation
    Compute,
    /// Archive could not be read
    Archive,
    /// Indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Graph => write!(f, "Graph"),
            ErrorCategory::Compute => write!(f, "Compute"),
            ErrorCategory::Archive => write!(f, "Archive"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

/// Helper type alias for Results using GraphForgeError
pub type ForgeResult<T> = std::result::Result<T, GraphForgeError>;

/// Create an invalid-argument error with context
///
/// # Examples
/// ```ignore
/// return Err(invalid_argument!("window size must be positive, got {}", size));
/// ```
#[macro_export]
macro_rules! invalid_argument {
    ($msg:expr) => {
        $crate::error::GraphForgeError::InvalidArgument($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GraphForgeError::InvalidArgument(format!($fmt, $($arg)*))
    };
}

/// Create an internal error with context
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::GraphForgeError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GraphForgeError::Internal(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            GraphForgeError::InvalidArgument("x".to_string()).category(),
            ErrorCategory::User
        );
        assert_eq!(
            GraphForgeError::CycleIntroduced {
                node: 1,
                port: "input".to_string()
            }
            .category(),
            ErrorCategory::Graph
        );
        assert_eq!(
            GraphForgeError::ArithmeticError("x".to_string()).category(),
            ErrorCategory::Compute
        );
        assert_eq!(
            GraphForgeError::ArchiveTypeMismatch {
                field: "size".to_string(),
                expected: "int",
                actual: "string"
            }
            .category(),
            ErrorCategory::Archive
        );
        assert!(GraphForgeError::Internal("bug".to_string()).is_internal_error());
    }

    #[test]
    fn test_error_display() {
        let err = GraphForgeError::SizeMismatch {
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.to_string(), "Size mismatch: expected 3, got 4");

        let err = GraphForgeError::TypeMismatch {
            expected: PortType::Float32,
            actual: PortType::Int32,
        };
        assert_eq!(err.to_string(), "Type mismatch: expected float, got int32");

        let err = GraphForgeError::RefinementDivergence { iterations: 10 };
        assert_eq!(
            err.to_string(),
            "Refinement did not converge after 10 iterations"
        );
    }

    #[test]
    fn test_macros() {
        let err = invalid_argument!("window {}", 0);
        assert!(matches!(err, GraphForgeError::InvalidArgument(_)));
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "Invalid argument: window 0");

        let err = internal_error!("bad state");
        assert!(matches!(err, GraphForgeError::Internal(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: GraphForgeError = parse.unwrap_err().into();
        assert_eq!(err.category(), ErrorCategory::Archive);
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::User.to_string(), "User");
        assert_eq!(ErrorCategory::Graph.to_string(), "Graph");
        assert_eq!(ErrorCategory::Compute.to_string(), "Compute");
        assert_eq!(ErrorCategory::Archive.to_string(), "Archive");
        assert_eq!(ErrorCategory::Internal.to_string(), "Internal");
    }
}
