// MS-SQL Connection
// One dedicated tiberius client per provider, behind an engine-session trait

use async_trait::async_trait;
use thiserror::Error;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::db::query::{ResultColumn, RowSet};

/// SQL Server error number for an expired login password
const PASSWORD_EXPIRED: u32 = 18488;

/// Engine-level failures, before they are classified by a provider
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Password expired. Please change your password using another tool.")]
    PasswordExpired,

    #[error("{0}")]
    QueryFailed(String),

    #[error("Session already closed")]
    Closed,
}

impl From<tiberius::error::Error> for SessionError {
    fn from(err: tiberius::error::Error) -> Self {
        match &err {
            tiberius::error::Error::Server(e) if e.code() == PASSWORD_EXPIRED => SessionError::PasswordExpired,
            tiberius::error::Error::Server(e) => SessionError::QueryFailed(e.message().to_string()),
            tiberius::error::Error::Io { .. } => SessionError::ConnectionFailed(err.to_string()),
            _ => SessionError::QueryFailed(err.to_string()),
        }
    }
}

/// A live, exclusively owned connection to one engine
#[async_trait]
pub trait EngineSession: Send {
    /// Run a batch and return its first result set
    async fn query(&mut self, sql: &str) -> Result<RowSet, SessionError>;

    /// Run a statement that reports affected rows instead of a result set
    async fn execute(&mut self, sql: &str) -> Result<u64, SessionError>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens engine sessions from a connection string
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, connection_string: &str) -> Result<Box<dyn EngineSession>, SessionError>;
}

pub type TiberiusClient = Client<Compat<TcpStream>>;

/// Parse an ADO.NET style connection string (`Server=host,1433;Database=db;User Id=..;Password=..`)
pub fn parse_connection_string(connection_string: &str) -> Result<Config, SessionError> {
    Config::from_ado_string(connection_string).map_err(|e| SessionError::InvalidConnectionString(e.to_string()))
}

/// Mask password values so connection strings can be logged
pub fn redact_connection_string(connection_string: &str) -> String {
    connection_string
        .split(';')
        .map(|part| {
            let key = part.split('=').next().unwrap_or("").trim().to_ascii_lowercase();
            if part.contains('=') && (key == "password" || key == "pwd") {
                let (k, _) = part.split_once('=').unwrap_or((part, ""));
                format!("{}=***", k)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Session over a single tiberius client
pub struct TiberiusSession {
    client: Option<TiberiusClient>,
}

impl TiberiusSession {
    pub fn new(client: TiberiusClient) -> Self {
        Self { client: Some(client) }
    }

    fn client(&mut self) -> Result<&mut TiberiusClient, SessionError> {
        self.client.as_mut().ok_or(SessionError::Closed)
    }
}

#[async_trait]
impl EngineSession for TiberiusSession {
    async fn query(&mut self, sql: &str) -> Result<RowSet, SessionError> {
        let client = self.client()?;
        let mut stream = client.simple_query(sql).await?;
        let columns: Vec<ResultColumn> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(ResultColumn::from).collect())
            .unwrap_or_default();
        let result_sets = stream.into_results().await?;

        let rows = result_sets.first().map(Vec::as_slice).unwrap_or_default();
        Ok(RowSet::from_tiberius(columns, rows))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SessionError> {
        let client = self.client()?;
        let result = client.execute(sql, &[]).await?;
        Ok(result.total())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        match self.client.take() {
            Some(client) => client.close().await.map_err(SessionError::from),
            None => Ok(()),
        }
    }
}

/// Opens dedicated (non-pooled) tiberius connections
#[derive(Debug, Default, Clone)]
pub struct TiberiusConnector;

#[async_trait]
impl Connector for TiberiusConnector {
    async fn open(&self, connection_string: &str) -> Result<Box<dyn EngineSession>, SessionError> {
        let config = parse_connection_string(connection_string)?;

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| SessionError::ConnectionFailed(format!("TCP connection failed: {}", e)))?;

        tcp.set_nodelay(true)
            .map_err(|e| SessionError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e)))?;

        let client = Client::connect(config, tcp.compat_write()).await.map_err(|e| match SessionError::from(e) {
            SessionError::QueryFailed(msg) => SessionError::ConnectionFailed(msg),
            other => other,
        })?;

        Ok(Box::new(TiberiusSession::new(client)))
    }
}
