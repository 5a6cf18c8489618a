pub mod postgres;
pub mod tokens;

use crate::config::Config;
use crate::error::MigrationError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// Terminal status of a version record in the bookkeeping table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    Successful,
    Failed,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "Successful",
            Self::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Successful" => Ok(Self::Successful),
            "Failed" => Ok(Self::Failed),
            other => Err(anyhow::anyhow!("unknown version status '{}'", other)),
        }
    }
}

/// One row of the bookkeeping table. Rows are created when a version begins
/// applying and promoted to Successful when it completes; this engine never
/// deletes them.
#[derive(Debug, Clone)]
pub struct DbVersionRecord {
    pub id: i64,
    pub version: String,
    pub status: VersionStatus,
    pub applied_on_utc: DateTime<Utc>,
    pub applied_by_user: String,
    pub applied_by_tool: String,
    pub applied_by_tool_version: String,
    pub failed_script_path: Option<String>,
    pub failed_script_error: Option<String>,
}

/// Redacted description of the target, for logging
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub platform: String,
    pub database: String,
    pub host: String,
}

/// One open connection to the target database with explicit transaction
/// control. A session lives for exactly one run/erase call and is closed on
/// every exit path.
#[async_trait]
pub trait PlatformSession: Send {
    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;

    /// Execute one batch, returning affected row count
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Fetch rows as text columns. Callers cast in SQL; this is the lowest
    /// common denominator the bookkeeping queries need.
    async fn query(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>>;

    fn in_transaction(&self) -> bool;
}

/// Vendor entry point: sessions, batch breakdown, and capability flags
#[async_trait]
pub trait PlatformDataService: Send + Sync {
    async fn create_session(&self) -> Result<Box<dyn PlatformSession>>;

    /// Split raw script text into executable batches (comment- and
    /// literal-aware; see `parser::SqlBatchParser`)
    fn break_statements(&self, text: &str) -> Vec<String>;

    fn is_transactional_ddl_supported(&self) -> bool;

    fn connection_info(&self) -> ConnectionInfo;

    /// Schema used when a bulk file omits its schema segment
    fn default_schema(&self) -> String;
}

/// Bookkeeping operations. Table reads and writes travel through the caller's
/// session so they share its transaction scope; database-level existence and
/// creation use the service's own maintenance connection.
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn is_database_exists(&self) -> Result<bool>;
    async fn create_database(&self) -> Result<()>;

    /// Ensure the bookkeeping schema and table exist
    async fn configure(&self, session: &mut dyn PlatformSession) -> Result<()>;

    async fn get_all_versions(
        &self,
        session: &mut dyn PlatformSession,
    ) -> Result<Vec<DbVersionRecord>>;

    /// Records with Successful status only
    async fn get_all_applied_versions(
        &self,
        session: &mut dyn PlatformSession,
    ) -> Result<Vec<DbVersionRecord>>;

    /// Create (or reset, when retrying a failed version) the record for a
    /// version that is beginning to apply
    async fn insert_version(&self, session: &mut dyn PlatformSession, version: &str) -> Result<()>;

    /// Promote to Successful, clearing any failure fields
    async fn mark_version_successful(
        &self,
        session: &mut dyn PlatformSession,
        version: &str,
    ) -> Result<()>;

    async fn mark_version_failed(
        &self,
        session: &mut dyn PlatformSession,
        version: &str,
        failed_script_path: &str,
        failed_script_error: &str,
    ) -> Result<()>;

    /// Highest Successful version by sequence key, if any
    async fn get_current_version(
        &self,
        session: &mut dyn PlatformSession,
    ) -> Result<Option<String>>;
}

/// Imports one bulk CSV file into its destination table through the caller's
/// session (and therefore inside its transaction scope, when one is open).
#[async_trait]
pub trait BulkImportService: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        session: &mut dyn PlatformSession,
        file: &Path,
        destination_schema: &str,
        separator: char,
        batch_size: usize,
        timeout_secs: u64,
        tokens: &[(String, String)],
    ) -> Result<()>;
}

/// Replaces `${token}` markers in script text
pub trait TokenReplacementService: Send + Sync {
    fn replace(&self, tokens: &[(String, String)], text: &str) -> String;
}

/// The full set of collaborators for one platform
pub struct PlatformServices {
    pub data: Arc<dyn PlatformDataService>,
    pub metadata: Arc<dyn MetadataService>,
    pub bulk: Arc<dyn BulkImportService>,
}

impl std::fmt::Debug for PlatformServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformServices").finish_non_exhaustive()
    }
}

/// Compile-time platform registry. Adding an engine means adding a match arm
/// here; there is no runtime plugin loading.
pub fn create_platform(config: &Config) -> Result<PlatformServices> {
    match config.platform.as_str() {
        "postgres" | "postgresql" => Ok(postgres::create_services(config)),
        other => Err(MigrationError::UnsupportedPlatform(other.to_string()).into()),
    }
}
