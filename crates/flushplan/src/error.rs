use derive_more::Display;
use flushplan_core::{
    config::ConfigError,
    error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// True when the caller should reload and reapply its changes.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.kind, ErrorKind::Update(UpdateErrorKind::Conflict))
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::Ordering => ErrorKind::Save(SaveErrorKind::Cycle),
            ErrorClass::Capacity => ErrorKind::Save(SaveErrorKind::Capacity),
            ErrorClass::Conflict => ErrorKind::Update(UpdateErrorKind::Conflict),
            ErrorClass::Store => ErrorKind::Store(StoreErrorKind::Fault),
            ErrorClass::RetryLimit => ErrorKind::Store(StoreErrorKind::RetryLimitExceeded),
            ErrorClass::Usage => ErrorKind::Usage,
            ErrorClass::Cancelled => ErrorKind::Cancelled,
            ErrorClass::Unsupported
            | ErrorClass::InvariantViolation
            | ErrorClass::Internal => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::Config, ErrorOrigin::Config, err.to_string())
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Save(SaveErrorKind),
    Update(UpdateErrorKind),
    Store(StoreErrorKind),

    /// The engine was called in a way it cannot honour.
    Usage,

    Cancelled,
    Config,

    /// The caller cannot remediate this.
    Internal,
}

///
/// SaveErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SaveErrorKind {
    /// No write order satisfies every foreign key.
    Cycle,

    /// A single write exceeds the batch limits.
    Capacity,
}

///
/// UpdateErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum UpdateErrorKind {
    /// Rows changed or vanished since they were loaded.
    Conflict,
}

///
/// StoreErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    Fault,
    RetryLimitExceeded,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Batch,
    Command,
    Config,
    Executor,
    Graph,
    Model,
    Retry,
    Store,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Batch => Self::Batch,
            CoreErrorOrigin::Command => Self::Command,
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Executor => Self::Executor,
            CoreErrorOrigin::Graph => Self::Graph,
            CoreErrorOrigin::Model => Self::Model,
            CoreErrorOrigin::Retry => Self::Retry,
            CoreErrorOrigin::Store => Self::Store,
        }
    }
}

///
/// TESTS
///
