use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::{configuration::ConnectionParams, error::SessionError};

use super::session::{Connector, Session, SessionResult, TextRow};

const BEGIN_READ_ONLY: &str = "BEGIN TRANSACTION READ ONLY";

/// [`Session`] over a tokio-postgres connection.
///
/// A read-only transaction is opened lazily by the first statement after a
/// commit or rollback.
pub struct PgSession {
    client: Client,
    connection_task: JoinHandle<()>,
    in_transaction: bool,
    label: String,
}

impl PgSession {
    pub async fn connect(params: &ConnectionParams, label: &str) -> SessionResult<Self> {
        let (client, connection) = params.to_pg_config().connect(NoTls).await?;

        let database = params.database.clone();
        let owner = label.to_string();
        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("{}|Connection to {} ended: {}", owner, database, e);
            }
        });

        info!("{}|Connected to {}:{}/{}", label, params.host, params.port, params.database);

        Ok(Self {
            client,
            connection_task,
            in_transaction: false,
            label: label.to_string(),
        })
    }

    async fn begin_if_needed(&mut self) -> SessionResult<()> {
        if !self.in_transaction {
            self.client.batch_execute(BEGIN_READ_ONLY).await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn end_transaction(&mut self, statement: &str) -> SessionResult<()> {
        if !self.in_transaction {
            return Ok(());
        }

        let result = self.client.batch_execute(statement).await;
        self.in_transaction = false;
        result.map_err(SessionError::from)
    }
}

impl Session for PgSession {
    async fn query(&mut self, sql: &str) -> SessionResult<Vec<TextRow>> {
        self.begin_if_needed().await?;

        let messages = self.client.simple_query(sql).await?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut values = Vec::with_capacity(row.len());
                for idx in 0..row.len() {
                    values.push(row.try_get(idx)?.map(str::to_string));
                }
                rows.push(values);
            }
        }

        Ok(rows)
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        self.end_transaction("ROLLBACK").await
    }

    async fn commit(&mut self) -> SessionResult<()> {
        self.end_transaction("COMMIT").await
    }

    async fn close(mut self) -> SessionResult<()> {
        let result = self.end_transaction("COMMIT").await;

        drop(self.client);
        if let Err(e) = self.connection_task.await {
            debug!("{}|Connection task did not shut down cleanly: {}", self.label, e);
        }

        result
    }
}

#[derive(Clone, Debug)]
pub struct PgConnector {
    params: ConnectionParams,
}

impl PgConnector {
    pub fn new(params: ConnectionParams) -> Self {
        Self { params }
    }
}

impl Connector for PgConnector {
    type Session = PgSession;

    async fn connect(&self, label: &str) -> SessionResult<PgSession> {
        PgSession::connect(&self.params, label).await
    }
}
