use super::{quote_identifier, quote_literal, raw_execute};
use crate::config::Config;
use crate::constants::{TOOL_NAME, TOOL_VERSION};
use crate::services::{DbVersionRecord, MetadataService, PlatformSession, VersionStatus};
use crate::version::LocalVersion;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

const RECORD_COLUMNS: &str = "id::text, version, status, \
     extract(epoch from applied_on_utc)::bigint::text, \
     applied_by_user, applied_by_tool, applied_by_tool_version, \
     failed_script_path, failed_script_error";

/// Bookkeeping table access. Table reads and writes go through the caller's
/// session so they share its transaction scope; database existence and
/// creation go through a maintenance-database connection.
pub struct PostgresMetadataService {
    connection_string: String,
    schema: String,
    table: String,
}

impl PostgresMetadataService {
    pub fn new(config: &Config) -> Self {
        Self {
            connection_string: config.connection_string.clone(),
            schema: config.meta_schema.clone(),
            table: config.meta_table.clone(),
        }
    }

    fn qualified_table(&self) -> Result<String> {
        Ok(format!(
            "{}.{}",
            quote_identifier(&self.schema)?,
            quote_identifier(&self.table)?
        ))
    }

    fn target_database(&self) -> Result<(PgConnectOptions, String)> {
        let options = self
            .connection_string
            .parse::<PgConnectOptions>()
            .context("invalid PostgreSQL connection string")?;
        let database = options.get_database().unwrap_or("postgres").to_string();
        Ok((options, database))
    }

    async fn maintenance_connection(&self) -> Result<PgConnection> {
        let (options, _) = self.target_database()?;
        let admin = options.database("postgres");
        PgConnection::connect_with(&admin)
            .await
            .context("failed to connect to the maintenance database")
    }

    async fn fetch_records(
        &self,
        session: &mut dyn PlatformSession,
        where_clause: &str,
    ) -> Result<Vec<DbVersionRecord>> {
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY id",
            RECORD_COLUMNS,
            self.qualified_table()?,
            where_clause
        );
        session.query(&sql).await?.iter().map(parse_record).collect()
    }
}

fn parse_record(columns: &Vec<Option<String>>) -> Result<DbVersionRecord> {
    let text = |index: usize| -> Result<String> {
        columns
            .get(index)
            .cloned()
            .flatten()
            .ok_or_else(|| anyhow::anyhow!("bookkeeping column {} was unexpectedly NULL", index))
    };
    let epoch: i64 = text(3)?.parse().context("bad applied_on_utc epoch")?;
    Ok(DbVersionRecord {
        id: text(0)?.parse().context("bad version record id")?,
        version: text(1)?,
        status: VersionStatus::parse(&text(2)?)?,
        applied_on_utc: DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| anyhow::anyhow!("applied_on_utc out of range"))?,
        applied_by_user: text(4)?,
        applied_by_tool: text(5)?,
        applied_by_tool_version: text(6)?,
        failed_script_path: columns.get(7).cloned().flatten(),
        failed_script_error: columns.get(8).cloned().flatten(),
    })
}

#[async_trait]
impl MetadataService for PostgresMetadataService {
    async fn is_database_exists(&self) -> Result<bool> {
        let (_, database) = self.target_database()?;
        let mut conn = self.maintenance_connection().await?;
        let row = sqlx::query_scalar::<_, i32>("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(&database)
            .fetch_optional(&mut conn)
            .await?;
        Ok(row.is_some())
    }

    async fn create_database(&self) -> Result<()> {
        let (_, database) = self.target_database()?;
        let mut conn = self.maintenance_connection().await?;
        // CREATE DATABASE cannot take bind parameters
        let sql = format!("CREATE DATABASE {}", quote_identifier(&database)?);
        raw_execute(&mut conn, &sql)
            .await
            .with_context(|| format!("failed to create database '{}'", database))?;
        Ok(())
    }

    async fn configure(&self, session: &mut dyn PlatformSession) -> Result<()> {
        session
            .execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_identifier(&self.schema)?
            ))
            .await?;
        session
            .execute(&format!(
                r#"
        CREATE TABLE IF NOT EXISTS {} (
            id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
            version TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            applied_on_utc TIMESTAMPTZ NOT NULL DEFAULT now(),
            applied_by_user TEXT NOT NULL DEFAULT CURRENT_USER,
            applied_by_tool TEXT NOT NULL,
            applied_by_tool_version TEXT NOT NULL,
            failed_script_path TEXT,
            failed_script_error TEXT
        )
        "#,
                self.qualified_table()?
            ))
            .await
            .context("failed to configure the bookkeeping table")?;
        Ok(())
    }

    async fn get_all_versions(
        &self,
        session: &mut dyn PlatformSession,
    ) -> Result<Vec<DbVersionRecord>> {
        self.fetch_records(session, "").await
    }

    async fn get_all_applied_versions(
        &self,
        session: &mut dyn PlatformSession,
    ) -> Result<Vec<DbVersionRecord>> {
        self.fetch_records(session, "WHERE status = 'Successful'")
            .await
    }

    async fn insert_version(&self, session: &mut dyn PlatformSession, version: &str) -> Result<()> {
        // A version begins as Failed ("not yet known good") and is promoted on
        // completion; retrying a failed version resets its record in place.
        let sql = format!(
            "INSERT INTO {table} \
             (version, status, applied_by_tool, applied_by_tool_version) \
             VALUES ({version}, 'Failed', {tool}, {tool_version}) \
             ON CONFLICT (version) DO UPDATE SET \
             status = 'Failed', \
             applied_on_utc = now(), \
             applied_by_user = CURRENT_USER, \
             applied_by_tool = EXCLUDED.applied_by_tool, \
             applied_by_tool_version = EXCLUDED.applied_by_tool_version, \
             failed_script_path = NULL, \
             failed_script_error = NULL",
            table = self.qualified_table()?,
            version = quote_literal(version),
            tool = quote_literal(TOOL_NAME),
            tool_version = quote_literal(TOOL_VERSION),
        );
        session.execute(&sql).await?;
        Ok(())
    }

    async fn mark_version_successful(
        &self,
        session: &mut dyn PlatformSession,
        version: &str,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {table} SET status = 'Successful', \
             failed_script_path = NULL, failed_script_error = NULL \
             WHERE version = {version}",
            table = self.qualified_table()?,
            version = quote_literal(version),
        );
        session.execute(&sql).await?;
        Ok(())
    }

    async fn mark_version_failed(
        &self,
        session: &mut dyn PlatformSession,
        version: &str,
        failed_script_path: &str,
        failed_script_error: &str,
    ) -> Result<()> {
        // The in-flight record may have rolled back with its transaction, so
        // failure recording is an upsert on a fresh session.
        let sql = format!(
            "INSERT INTO {table} \
             (version, status, applied_by_tool, applied_by_tool_version, \
              failed_script_path, failed_script_error) \
             VALUES ({version}, 'Failed', {tool}, {tool_version}, {path}, {error}) \
             ON CONFLICT (version) DO UPDATE SET \
             status = 'Failed', \
             failed_script_path = EXCLUDED.failed_script_path, \
             failed_script_error = EXCLUDED.failed_script_error",
            table = self.qualified_table()?,
            version = quote_literal(version),
            tool = quote_literal(TOOL_NAME),
            tool_version = quote_literal(TOOL_VERSION),
            path = quote_literal(failed_script_path),
            error = quote_literal(failed_script_error),
        );
        session.execute(&sql).await?;
        Ok(())
    }

    async fn get_current_version(
        &self,
        session: &mut dyn PlatformSession,
    ) -> Result<Option<String>> {
        // Version strings do not sort correctly as text (v10 < v2), so the
        // winner is picked by sequence key after parsing.
        let applied = self.get_all_applied_versions(session).await?;
        let mut current: Option<LocalVersion> = None;
        for record in applied {
            let version = LocalVersion::parse(&record.version)?;
            if current
                .as_ref()
                .is_none_or(|best| version.sequence_key() >= best.sequence_key())
            {
                current = Some(version);
            }
        }
        Ok(current.map(|version| version.name))
    }
}
