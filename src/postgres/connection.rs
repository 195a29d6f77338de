// ABOUTME: PostgreSQL connection utilities and the replay connection
// ABOUTME: Handles connection string parsing, TLS setup, and connection lifecycle

use crate::error::{Error, Result};
use crate::migration::SqlConnection;
use crate::utils;
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

/// Connect to PostgreSQL database with TLS support
pub async fn connect(connection_string: &str) -> Result<Client> {
    utils::validate_connection_string(connection_string)?;

    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .map_err(|e| Error::Connection(format!("Failed to build TLS connector: {}", e)))?;
    let tls = MakeTlsConnector::new(tls_connector);

    let (client, connection) = tokio_postgres::connect(connection_string, tls)
        .await
        .map_err(|e| describe_connect_error(&e.to_string()))?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    Ok(client)
}

/// Connect with automatic retry for transient failures
pub async fn connect_with_retry(connection_string: &str) -> Result<Client> {
    utils::retry_with_backoff(
        || connect(connection_string),
        3,                      // Max 3 retries
        Duration::from_secs(1), // Start with 1 second delay
    )
    .await
}

fn describe_connect_error(error_msg: &str) -> Error {
    let message = if error_msg.contains("password authentication failed") {
        "Authentication failed: Invalid username or password.\n\
         Please verify your database credentials."
            .to_string()
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        format!(
            "Database does not exist: {}\n\
             Please create the database first or check the connection URL.",
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect")
    {
        format!(
            "Connection refused: Unable to reach database server.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
        format!(
            "Connection timeout: Database server did not respond in time.\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("SSL") || error_msg.contains("TLS") {
        format!(
            "TLS/SSL error: Failed to establish secure connection.\n\
             Please verify SSL/TLS configuration.\n\
             Error: {}",
            error_msg
        )
    } else {
        format!("Failed to connect to database: {}", error_msg)
    };

    Error::Connection(message)
}

/// Target connection that package scripts are replayed on.
///
/// Opens lazily; `close` drops the client, which ends the session.
pub struct PgConnection {
    connection_string: String,
    client: Option<Client>,
}

impl PgConnection {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            client: None,
        }
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    fn is_open(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    async fn open(&mut self) -> Result<()> {
        if !self.is_open() {
            self.client = Some(connect_with_retry(&self.connection_string).await?);
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Connection("connection is not open".to_string()))?;

        // Simple query protocol: a batch may hold several statements.
        client
            .batch_execute(sql)
            .await
            .map_err(|e| Error::Connection(format_db_error(&e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }
}

/// Database error text including the server's message when there is one
pub(crate) fn format_db_error(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => error.to_string(),
    }
}
