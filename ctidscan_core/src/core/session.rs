use std::future::Future;

use crate::error::SessionError;

/// One result row in text format. `None` is SQL `NULL`.
pub type TextRow = Vec<Option<String>>;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// A single connection to the backing store.
///
/// Statements run inside an implicit transaction that stays open until
/// [`commit`](Session::commit) or [`rollback`](Session::rollback). After a failed
/// statement the transaction is aborted and every further statement fails until
/// it is rolled back.
pub trait Session: Send + 'static {
    fn query(&mut self, sql: &str) -> impl Future<Output = SessionResult<Vec<TextRow>>> + Send;

    fn rollback(&mut self) -> impl Future<Output = SessionResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = SessionResult<()>> + Send;

    fn close(self) -> impl Future<Output = SessionResult<()>> + Send;
}

/// Opens sessions. Each worker asks for its own.
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    /// `label` names the worker in the session's log lines.
    fn connect(&self, label: &str) -> impl Future<Output = SessionResult<Self::Session>> + Send;
}
