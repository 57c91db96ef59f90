//! Error types for lazy data entities and the evaluator interface.

use std::error::Error;
use std::fmt;

use lumen_core::{CoreError, Rect};
use lumen_pool::PoolError;

/// Errors reported by an [`Evaluator`](crate::Evaluator).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvalError {
    /// No operator is registered under this name.
    UnknownOperator {
        /// The requested operator name.
        op: String,
    },
    /// The operator ran and failed.
    OperatorFailed {
        /// Operator name.
        op: String,
        /// Why it failed.
        reason: String,
    },
    /// The node lacks a dependency or argument the operator needs.
    MissingDependency {
        /// Operator name.
        op: String,
        /// Position of the missing dependency.
        index: usize,
    },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOperator { op } => write!(f, "unknown operator '{op}'"),
            Self::OperatorFailed { op, reason } => write!(f, "operator '{op}' failed: {reason}"),
            Self::MissingDependency { op, index } => {
                write!(f, "operator '{op}' is missing dependency {index}")
            }
        }
    }
}

impl Error for EvalError {}

/// Errors raised while materializing or accessing a lazy entity.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaneError {
    /// The evaluator returned data whose bounds differ from the declared
    /// bounds.
    ShapeMismatch {
        /// Bounds declared at construction.
        expected: Rect,
        /// Bounds of the returned data.
        actual: Rect,
    },
    /// The returned row stride is shorter than a row.
    StrideTooSmall {
        /// Returned stride in elements.
        stride: usize,
        /// Declared width in elements.
        width: usize,
    },
    /// The evaluator returned a value of the wrong kind.
    WrongKind {
        /// What the entity needed.
        expected: &'static str,
        /// What the evaluator produced.
        actual: &'static str,
    },
    /// A row outside the entity's bounds was requested.
    RowOutOfRange {
        /// Requested row.
        y: i32,
        /// The entity's bounds.
        rect: Rect,
    },
    /// The entity has neither data nor a graph node to compute it from.
    NoSource,
    /// The evaluator failed.
    Eval(EvalError),
    /// Backing storage could not be allocated.
    Pool(PoolError),
    /// Invalid geometry.
    Core(CoreError),
}

impl fmt::Display for PlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: declared {expected}, computed {actual}")
            }
            Self::StrideTooSmall { stride, width } => {
                write!(f, "stride {stride} is smaller than width {width}")
            }
            Self::WrongKind { expected, actual } => {
                write!(f, "expected {expected}, evaluator returned {actual}")
            }
            Self::RowOutOfRange { y, rect } => write!(f, "row {y} outside {rect}"),
            Self::NoSource => write!(f, "entity has no data and no graph node"),
            Self::Eval(e) => write!(f, "evaluation failed: {e}"),
            Self::Pool(e) => write!(f, "allocation failed: {e}"),
            Self::Core(e) => write!(f, "{e}"),
        }
    }
}

impl Error for PlaneError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Eval(e) => Some(e),
            Self::Pool(e) => Some(e),
            Self::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EvalError> for PlaneError {
    fn from(e: EvalError) -> Self {
        Self::Eval(e)
    }
}

impl From<PoolError> for PlaneError {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

impl From<CoreError> for PlaneError {
    fn from(e: CoreError) -> Self {
        Self::Core(e)
    }
}
