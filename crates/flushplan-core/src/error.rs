use crate::command::Operation;
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; the facade crate maps it onto its public error surface.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `class`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a model-origin invariant violation.
    pub(crate) fn model_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Model,
            message.into(),
        )
    }

    /// Construct a command-origin invariant violation.
    pub(crate) fn command_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Command,
            message.into(),
        )
    }

    /// Construct a batch-origin invariant violation.
    pub(crate) fn batch_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Batch,
            message.into(),
        )
    }

    /// Construct an executor-origin invariant violation.
    pub(crate) fn executor_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Executor,
            message.into(),
        )
    }

    /// Construct the ordering-fatal error raised for an unresolvable cycle.
    pub(crate) fn ordering_cycle(hops: Vec<CycleHop>) -> Self {
        let path = hops
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            class: ErrorClass::Ordering,
            origin: ErrorOrigin::Graph,
            message: format!(
                "unable to save changes: circular dependency between {} write(s): {path}",
                hops.len()
            ),
            detail: Some(ErrorDetail::Cycle(hops)),
        }
    }

    /// Construct the capacity-fatal error for an intent no batch can hold.
    pub(crate) fn capacity(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Capacity, ErrorOrigin::Batch, message.into())
    }

    /// Construct a concurrency conflict for a batch that touched fewer rows than expected.
    pub fn concurrency_conflict(expected: usize, actual: usize) -> Self {
        Self {
            class: ErrorClass::Conflict,
            origin: ErrorOrigin::Executor,
            message: format!(
                "concurrency conflict: batch expected to affect {expected} row(s) but affected {actual}; data may have been modified or deleted since it was loaded"
            ),
            detail: Some(ErrorDetail::Concurrency { expected, actual }),
        }
    }

    /// Construct a store-origin error from a fault reported by the store.
    pub fn store(fault: StoreFault) -> Self {
        Self {
            class: ErrorClass::Store,
            origin: ErrorOrigin::Store,
            message: fault.to_string(),
            detail: Some(ErrorDetail::Store(fault)),
        }
    }

    /// Construct a usage error (misuse of the engine by its caller).
    pub(crate) fn usage(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Usage, origin, message.into())
    }

    /// Construct the error raised when the caller cancels an async save.
    pub(crate) fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Cancelled, ErrorOrigin::Executor, message.into())
    }

    /// Wrap the last transient failure once the retry schedule is exhausted.
    pub(crate) fn retry_limit_exceeded(attempts: usize, last: Self) -> Self {
        Self {
            class: ErrorClass::RetryLimit,
            origin: ErrorOrigin::Retry,
            message: format!(
                "maximum number of retries ({}) exceeded while executing database operations; last error: {last}",
                attempts.saturating_sub(1)
            ),
            detail: Some(ErrorDetail::RetryLimitExceeded {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    #[must_use]
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::Concurrency { .. }))
    }

    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::Cycle(_)))
    }

    /// Store fault carried by this error, if it originated in the store.
    #[must_use]
    pub const fn store_fault(&self) -> Option<&StoreFault> {
        match &self.detail {
            Some(ErrorDetail::Store(fault)) => Some(fault),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, class-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Store(StoreFault),

    #[error("dependency cycle across {} write(s)", .0.len())]
    Cycle(Vec<CycleHop>),

    #[error("expected {expected} row(s), affected {actual}")]
    Concurrency { expected: usize, actual: usize },

    #[error("gave up after {attempts} attempt(s): {last}")]
    RetryLimitExceeded {
        attempts: usize,
        last: Box<InternalError>,
    },
}

///
/// StoreFault
///
/// Failure reported by the store-specific collaborators (connection or
/// physical batch runner). Classified as transient or fatal by a
/// [`RetryClassifier`](crate::retry::RetryClassifier).
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("store fault ({kind}): {message}")]
pub struct StoreFault {
    pub kind: StoreFaultKind,
    pub code: Option<i32>,
    pub message: String,
}

impl StoreFault {
    pub fn new(kind: StoreFaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

///
/// StoreFaultKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreFaultKind {
    Timeout,
    Deadlock,
    ConnectionReset,
    ConstraintViolation,
    Other,
}

impl fmt::Display for StoreFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Deadlock => "deadlock",
            Self::ConnectionReset => "connection_reset",
            Self::ConstraintViolation => "constraint_violation",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

///
/// CycleHop
///
/// One dependency edge on a detected cycle: `from` must be written before
/// `to` because of every foreign key in `foreign_keys`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CycleHop {
    pub from_entity: String,
    pub from_operation: Operation,
    pub to_entity: String,
    pub to_operation: Operation,
    pub foreign_keys: Vec<String>,
}

impl fmt::Display for CycleHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' ({}) -[{}]-> '{}' ({})",
            self.from_entity,
            self.from_operation,
            self.foreign_keys.join(", "),
            self.to_entity,
            self.to_operation,
        )
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// No execution order satisfies every foreign-key constraint.
    Ordering,
    /// A single write cannot fit in any batch.
    Capacity,
    /// Optimistic concurrency check failed.
    Conflict,
    /// Failure reported by the store; may be transient.
    Store,
    /// Retry schedule exhausted.
    RetryLimit,
    /// The engine was invoked incorrectly.
    Usage,
    Cancelled,
    Unsupported,
    InvariantViolation,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ordering => "ordering",
            Self::Capacity => "capacity",
            Self::Conflict => "conflict",
            Self::Store => "store",
            Self::RetryLimit => "retry_limit",
            Self::Usage => "usage",
            Self::Cancelled => "cancelled",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Config,
    Model,
    Command,
    Graph,
    Batch,
    Executor,
    Retry,
    Store,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Model => "model",
            Self::Command => "command",
            Self::Graph => "graph",
            Self::Batch => "batch",
            Self::Executor => "executor",
            Self::Retry => "retry",
            Self::Store => "store",
        };
        write!(f, "{label}")
    }
}
