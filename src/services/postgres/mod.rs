mod bulk;
mod metadata;

pub use bulk::PostgresBulkImportService;
pub use metadata::PostgresMetadataService;

use super::{ConnectionInfo, PlatformDataService, PlatformServices, PlatformSession};
use crate::config::Config;
use crate::parser::SqlBatchParser;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor, Row};
use std::sync::Arc;

/// Build the PostgreSQL service bundle for the compile-time registry
pub fn create_services(config: &Config) -> PlatformServices {
    PlatformServices {
        data: Arc::new(PostgresDataService::new(config)),
        metadata: Arc::new(PostgresMetadataService::new(config)),
        bulk: Arc::new(PostgresBulkImportService),
    }
}

/// Quote a SQL string literal, doubling embedded quotes. The generic session
/// API carries no bind parameters, so bookkeeping SQL is rendered as text.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Validate and double-quote a SQL identifier. PostgreSQL identifier rules:
/// letters, digits, underscore, dollar; not starting with a digit.
pub(crate) fn quote_identifier(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if !valid {
        return Err(anyhow::anyhow!(
            "invalid SQL identifier '{}': must contain only letters, numbers, underscores, and dollar signs, starting with a letter or underscore",
            name
        ));
    }
    Ok(format!("\"{}\"", name))
}

pub struct PostgresDataService {
    connection_string: String,
    command_timeout_secs: u64,
}

impl PostgresDataService {
    pub fn new(config: &Config) -> Self {
        Self {
            connection_string: config.connection_string.clone(),
            command_timeout_secs: config.command_timeout_secs,
        }
    }

    fn options(&self) -> Result<PgConnectOptions> {
        self.connection_string
            .parse::<PgConnectOptions>()
            .context("invalid PostgreSQL connection string")
    }
}

#[async_trait]
impl PlatformDataService for PostgresDataService {
    async fn create_session(&self) -> Result<Box<dyn PlatformSession>> {
        let options = self.options()?;
        let mut conn = PgConnection::connect_with(&options)
            .await
            .context("failed to connect to target database")?;
        if self.command_timeout_secs > 0 {
            let sql = format!(
                "SET statement_timeout = '{}s'",
                self.command_timeout_secs
            );
            conn.execute(sql.as_str()).await?;
        }
        Ok(Box::new(PostgresSession {
            conn,
            in_transaction: false,
        }))
    }

    fn break_statements(&self, text: &str) -> Vec<String> {
        SqlBatchParser::semicolon()
            .parse(text)
            .into_iter()
            .map(|batch| batch.text)
            .collect()
    }

    fn is_transactional_ddl_supported(&self) -> bool {
        true
    }

    fn connection_info(&self) -> ConnectionInfo {
        let (host, database) = self
            .options()
            .map(|options| {
                (
                    options.get_host().to_string(),
                    options.get_database().unwrap_or("postgres").to_string(),
                )
            })
            .unwrap_or_else(|_| ("<invalid>".to_string(), "<invalid>".to_string()));
        ConnectionInfo {
            platform: "postgres".to_string(),
            database,
            host,
        }
    }

    fn default_schema(&self) -> String {
        "public".to_string()
    }
}

/// One open connection with manual transaction control. Batches may contain
/// multiple statements, so execution goes through `raw_sql`.
pub struct PostgresSession {
    conn: PgConnection,
    in_transaction: bool,
}

/// Plain (non-async-trait) helper so the `Executor` impl for `&mut PgConnection`
/// is resolved with its normal HRTB signature instead of through async-trait's
/// boxed-future desugaring, which otherwise fails to type-check here.
pub(crate) async fn raw_execute(conn: &mut PgConnection, sql: &str) -> Result<u64> {
    let result = conn.execute(sql).await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl PlatformSession for PostgresSession {
    async fn begin(&mut self) -> Result<()> {
        raw_execute(&mut self.conn, "BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        raw_execute(&mut self.conn, "COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        raw_execute(&mut self.conn, "ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        raw_execute(&mut self.conn, sql).await
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let rows = sqlx::query(sql).fetch_all(&mut self.conn).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut columns = Vec::with_capacity(row.len());
            for index in 0..row.len() {
                columns.push(row.try_get::<Option<String>, _>(index)?);
            }
            result.push(columns);
        }
        Ok(result)
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}
