use crate::error::InternalError;
use async_trait::async_trait;

///
/// ConnectionState
///
/// Synchronous surface shared by both connection flavours. Cleanup runs
/// from drop guards, so it cannot fail or suspend.
///

pub trait ConnectionState {
    /// True when a transaction is active on this connection.
    fn has_transaction(&self) -> bool;

    /// Close the connection. Only called by whoever opened it.
    fn close(&mut self);

    /// Dispose the active transaction, rolling it back if it was not committed.
    fn dispose_transaction(&mut self);
}

///
/// Connection
///

pub trait Connection: ConnectionState {
    /// Ensure the connection is open. Returns `true` only if this call opened it.
    fn open(&mut self) -> Result<bool, InternalError>;

    fn begin_transaction(&mut self) -> Result<(), InternalError>;

    fn commit_transaction(&mut self) -> Result<(), InternalError>;
}

///
/// AsyncConnection
///

#[async_trait]
pub trait AsyncConnection: ConnectionState + Send {
    /// Ensure the connection is open. Returns `true` only if this call opened it.
    async fn open(&mut self) -> Result<bool, InternalError>;

    async fn begin_transaction(&mut self) -> Result<(), InternalError>;

    async fn commit_transaction(&mut self) -> Result<(), InternalError>;
}
