use thiserror::Error;

/// Failure reported by a [`Session`](crate::core::session::Session).
///
/// A failing statement is not necessarily fatal: the probe engine treats most of
/// them as corruption signals. Only `closed` errors end a worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SessionError {
    pub message: String,
    /// SQLSTATE reported by the server, if any.
    pub code: Option<String>,
    /// The underlying connection is gone.
    pub closed: bool,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            closed: false,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
            closed: false,
        }
    }

    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            closed: true,
        }
    }

    pub fn is_connection_lost(&self) -> bool {
        self.closed
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl From<tokio_postgres::Error> for SessionError {
    fn from(e: tokio_postgres::Error) -> Self {
        let message = match e.as_db_error() {
            Some(db) => db.message().to_string(),
            None => e.to_string(),
        };

        Self {
            message,
            code: e.code().map(|c| c.code().to_string()),
            closed: e.is_closed(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CtidScanError {
    #[error("Relation {schema}.{table} does not exist")]
    RelationNotFound { schema: String, table: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CtidScanResult<T> = Result<T, CtidScanError>;
