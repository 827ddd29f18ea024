//! Error types for tasar operations.
//!
//! Provides rich error context for library consumers.

use std::fmt;

/// Main error type for tasar operations.
///
/// Covers graph construction, model configuration, training and
/// checkpoint serialization failures.
///
/// # Examples
///
/// ```
/// use tasar::error::TasarError;
///
/// let err = TasarError::MalformedGraph {
///     detail: "edge (3, 7) references node 7, graph has 4 nodes".to_string(),
/// };
/// assert!(err.to_string().contains("malformed graph"));
/// ```
#[derive(Debug)]
pub enum TasarError {
    /// Tensor/matrix dimensions don't match for the operation.
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// Graph structure is invalid (e.g. edge referencing a missing node).
    MalformedGraph {
        /// What is wrong with the graph
        detail: String,
    },

    /// Invalid hyperparameter value provided.
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// A computation produced NaN or Inf where finite values are required.
    NumericalError {
        /// Where the non-finite value appeared
        context: String,
    },

    /// Training loss became non-finite.
    ConvergenceFailure {
        /// Optimizer steps taken before divergence
        steps: usize,
        /// Last finite loss observed (if any)
        last_loss: f64,
    },

    /// I/O error (file not found, permission denied, etc.).
    Io(std::io::Error),

    /// Serialization/deserialization error.
    Serialization(String),

    /// Generic error with string message.
    Other(String),
}

impl fmt::Display for TasarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TasarError::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            TasarError::MalformedGraph { detail } => {
                write!(f, "malformed graph: {detail}")
            }
            TasarError::InvalidHyperparameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "invalid hyperparameter: {param} = {value}, expected {constraint}"
                )
            }
            TasarError::NumericalError { context } => {
                write!(f, "non-finite value encountered in {context}")
            }
            TasarError::ConvergenceFailure { steps, last_loss } => {
                write!(
                    f,
                    "training diverged after {steps} steps (last finite loss {last_loss})"
                )
            }
            TasarError::Io(e) => write!(f, "I/O error: {e}"),
            TasarError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            TasarError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TasarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TasarError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TasarError {
    fn from(err: std::io::Error) -> Self {
        TasarError::Io(err)
    }
}

impl From<String> for TasarError {
    fn from(msg: String) -> Self {
        TasarError::Other(msg)
    }
}

impl From<&str> for TasarError {
    fn from(msg: &str) -> Self {
        TasarError::Other(msg.to_string())
    }
}

impl TasarError {
    /// Create a malformed-graph error for an out-of-range edge.
    #[must_use]
    pub fn edge_out_of_range(src: usize, dst: usize, num_nodes: usize) -> Self {
        Self::MalformedGraph {
            detail: format!("edge ({src}, {dst}) references a node outside 0..{num_nodes}"),
        }
    }

    /// Create a dimension mismatch error with descriptive context.
    #[must_use]
    pub fn dimension_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            expected: format!("{context}={expected}"),
            actual: format!("{actual}"),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, TasarError>;
