mod resolve;

pub use resolve::resolve_pending;

use crate::config::{Config, TransactionMode};
use crate::constants::{
    DRAFT_DIRECTORY, ERASE_DIRECTORY, INIT_DIRECTORY, POST_DIRECTORY, PRE_DIRECTORY,
};
use crate::error::MigrationError;
use crate::services::{
    BulkImportService, DbVersionRecord, MetadataService, PlatformDataService, PlatformServices,
    PlatformSession, TokenReplacementService,
};
use crate::services::tokens::DefaultTokenReplacer;
use crate::version::LocalVersion;
use crate::workspace::{VersionDirectory, Workspace, directory};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one run did (or, for verify, would do)
#[derive(Debug, Default)]
pub struct RunReport {
    pub applied_versions: Vec<String>,
    pub scripts: usize,
    pub batches: usize,
    pub bulk_files: usize,
    pub verify_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Apply,
    Verify,
}

/// The migration state machine: resolves pending versions, sequences the
/// fixed phases, manages transaction scope, and records per-version status.
///
/// One session is opened per run/erase call and dropped on every exit path;
/// execution is strictly sequential because later scripts may depend on the
/// side effects of earlier ones.
pub struct Migrator {
    config: Config,
    workspace: Workspace,
    data: Arc<dyn PlatformDataService>,
    metadata: Arc<dyn MetadataService>,
    bulk: Arc<dyn BulkImportService>,
    tokens: Box<dyn TokenReplacementService>,
}

impl Migrator {
    pub fn new(config: &Config, services: PlatformServices) -> Self {
        Self {
            workspace: Workspace::new(config.workspace.clone()),
            config: config.clone(),
            data: services.data,
            metadata: services.metadata,
            bulk: services.bulk,
            tokens: Box::new(DefaultTokenReplacer),
        }
    }

    /// Apply all pending work: `_init` → `_pre` → pending versions ascending →
    /// `_draft` → `_post`, under the configured transaction mode.
    pub async fn run(&self) -> Result<RunReport> {
        self.execute(RunMode::Apply).await
    }

    /// Dry-run the same pipeline: resolve pending work and read, token-replace
    /// and batch-parse every script a run would execute, without executing
    /// anything or advancing the bookkeeping table.
    pub async fn verify(&self) -> Result<RunReport> {
        self.execute(RunMode::Verify).await
    }

    async fn execute(&self, mode: RunMode) -> Result<RunReport> {
        self.workspace.validate()?;

        let target = self.target_version()?;
        let info = self.data.connection_info();

        if !self.metadata.is_database_exists().await? {
            if mode == RunMode::Apply && self.config.auto_create_database {
                info!("database '{}' does not exist, creating it", info.database);
                self.metadata.create_database().await?;
            } else {
                anyhow::bail!(
                    "database '{}' does not exist on '{}' (pass --auto-create to create it)",
                    info.database,
                    info.host
                );
            }
        }

        let mut session = self.data.create_session().await?;
        self.metadata.configure(session.as_mut()).await?;

        let records = self.metadata.get_all_versions(session.as_mut()).await?;
        let pending = resolve_pending(
            self.workspace.version_directories()?,
            &records,
            target.as_ref(),
            self.config.continue_after_failure,
        )?;

        info!(
            "{} pending version(s) toward {} on '{}/{}'",
            pending.len(),
            target
                .as_ref()
                .map(|v| v.sem_version())
                .unwrap_or_else(|| "latest".to_string()),
            info.host,
            info.database
        );

        let mut report = RunReport {
            verify_only: mode == RunMode::Verify,
            ..Default::default()
        };

        let result = match mode {
            RunMode::Apply => self.apply_all(session.as_mut(), &pending, &mut report).await,
            RunMode::Verify => self.verify_all(&pending, &mut report).await,
        };

        if let Err(error) = result {
            if session.in_transaction() {
                if let Err(rollback_error) = session.rollback().await {
                    warn!("rollback after failure also failed: {:#}", rollback_error);
                }
            }
            return Err(error);
        }

        Ok(report)
    }

    /// Execute `_erase` scripts only, in one transaction where the platform
    /// supports transactional DDL. Bookkeeping rows are never touched.
    pub async fn erase(&self) -> Result<()> {
        self.workspace.validate()?;

        let info = self.data.connection_info();
        if !self.metadata.is_database_exists().await? {
            anyhow::bail!("database '{}' does not exist", info.database);
        }

        let base = self.workspace.phase_path(ERASE_DIRECTORY);
        let scripts = directory::collect_scripts(&base, self.environment_code())?;
        info!(
            "erasing application objects from '{}/{}' ({} script(s))",
            info.host,
            info.database,
            scripts.len()
        );

        let mut session = self.data.create_session().await?;
        let transactional = self.data.is_transactional_ddl_supported();
        if transactional {
            session.begin().await?;
        }

        let mut report = RunReport::default();
        match self.run_scripts(session.as_mut(), &scripts, &mut report).await {
            Ok(()) => {
                if transactional {
                    session.commit().await?;
                }
                Ok(())
            }
            Err(error) => {
                if session.in_transaction() {
                    if let Err(rollback_error) = session.rollback().await {
                        warn!("rollback after failure also failed: {:#}", rollback_error);
                    }
                }
                Err(error)
            }
        }
    }

    /// Read-only bookkeeping query: every recorded version
    pub async fn get_all_versions(&self) -> Result<Vec<DbVersionRecord>> {
        let mut session = self.data.create_session().await?;
        self.metadata.configure(session.as_mut()).await?;
        self.metadata.get_all_versions(session.as_mut()).await
    }

    /// Read-only bookkeeping query: Successful versions only
    pub async fn get_all_applied_versions(&self) -> Result<Vec<DbVersionRecord>> {
        let mut session = self.data.create_session().await?;
        self.metadata.configure(session.as_mut()).await?;
        self.metadata
            .get_all_applied_versions(session.as_mut())
            .await
    }

    /// Highest Successful version, if any
    pub async fn get_current_version(&self) -> Result<Option<String>> {
        let mut session = self.data.create_session().await?;
        self.metadata.configure(session.as_mut()).await?;
        self.metadata.get_current_version(session.as_mut()).await
    }

    fn environment_code(&self) -> Option<&str> {
        self.config.environment_code.as_deref()
    }

    fn target_version(&self) -> Result<Option<LocalVersion>> {
        match &self.config.target_version {
            Some(raw) => Ok(Some(LocalVersion::parse(raw)?)),
            None => self.workspace.latest_version(),
        }
    }

    async fn apply_all(
        &self,
        session: &mut dyn PlatformSession,
        pending: &[VersionDirectory],
        report: &mut RunReport,
    ) -> Result<()> {
        let mode = self.config.transaction_mode;
        if mode == TransactionMode::Session {
            session.begin().await?;
        }

        self.apply_phase(session, INIT_DIRECTORY, mode, report).await?;
        self.apply_phase(session, PRE_DIRECTORY, mode, report).await?;
        for directory in pending {
            self.apply_version(session, directory, mode, report).await?;
        }
        // _draft runs in full on every call, regardless of prior runs
        self.apply_phase(session, DRAFT_DIRECTORY, mode, report).await?;
        self.apply_phase(session, POST_DIRECTORY, mode, report).await?;

        if mode == TransactionMode::Session {
            session.commit().await?;
        }
        Ok(())
    }

    /// One non-version phase. VERSION mode gives each phase its own
    /// transaction; SESSION mode rides the run-wide one; NONE autocommits.
    async fn apply_phase(
        &self,
        session: &mut dyn PlatformSession,
        phase: &str,
        mode: TransactionMode,
        report: &mut RunReport,
    ) -> Result<()> {
        let base = self.workspace.phase_path(phase);
        let scripts = directory::collect_scripts(&base, self.environment_code())?;
        if scripts.is_empty() {
            debug!("phase {} has no scripts", phase);
            return Ok(());
        }
        info!("phase {} ({} script(s))", phase, scripts.len());

        let unit_transaction = mode == TransactionMode::Version;
        if unit_transaction {
            session.begin().await?;
        }
        match self.run_scripts(session, &scripts, report).await {
            Ok(()) => {
                if unit_transaction {
                    session.commit().await?;
                }
                Ok(())
            }
            Err(error) => {
                if unit_transaction {
                    session.rollback().await?;
                }
                Err(error)
            }
        }
    }

    async fn apply_version(
        &self,
        session: &mut dyn PlatformSession,
        directory: &VersionDirectory,
        mode: TransactionMode,
        report: &mut RunReport,
    ) -> Result<()> {
        directory.validate_transaction_layout()?;
        let sem_version = directory.version.sem_version();

        if directory.has_explicit_transaction && !self.data.is_transactional_ddl_supported() {
            warn!(
                "version directory '{}' requests an explicit transaction, but the platform does not guarantee transactional DDL; DDL statements may not roll back",
                directory.path.display()
            );
        }

        // An explicit _transaction marker forces a version-scoped transaction
        // even when the configured mode is NONE
        let unit_transaction = mode == TransactionMode::Version
            || (mode == TransactionMode::None && directory.has_explicit_transaction);

        info!("applying version {} from '{}'", sem_version, directory.path.display());
        if unit_transaction {
            session.begin().await?;
        }
        self.metadata.insert_version(session, &sem_version).await?;

        match self.apply_version_contents(session, directory, report).await {
            Ok(()) => {
                self.metadata
                    .mark_version_successful(session, &sem_version)
                    .await?;
                if unit_transaction {
                    session.commit().await?;
                }
                report.applied_versions.push(sem_version);
                Ok(())
            }
            Err(error) => {
                // Roll back the current unit: the whole run in SESSION mode,
                // just this version in VERSION mode, nothing in NONE mode
                if session.in_transaction() {
                    if let Err(rollback_error) = session.rollback().await {
                        warn!("rollback after failure also failed: {:#}", rollback_error);
                    }
                }
                if mode != TransactionMode::Session {
                    self.record_failure(&sem_version, &error).await;
                }
                Err(error)
            }
        }
    }

    async fn apply_version_contents(
        &self,
        session: &mut dyn PlatformSession,
        directory: &VersionDirectory,
        report: &mut RunReport,
    ) -> Result<()> {
        let scripts = directory::collect_scripts(&directory.path, self.environment_code())?;
        self.run_scripts(session, &scripts, report).await?;

        // Bulk files import after the directory's SQL scripts
        for bulk_file in self.bulk_files(&directory.path)? {
            info!("importing bulk file '{}'", bulk_file.display());
            self.bulk
                .run(
                    session,
                    &bulk_file,
                    &self.data.default_schema(),
                    self.config.bulk_separator,
                    self.config.bulk_batch_size,
                    self.config.command_timeout_secs,
                    &self.config.tokens,
                )
                .await
                .map_err(|error| MigrationError::bulk_import(&bulk_file, &error))?;
            report.bulk_files += 1;
        }
        Ok(())
    }

    async fn run_scripts(
        &self,
        session: &mut dyn PlatformSession,
        scripts: &[PathBuf],
        report: &mut RunReport,
    ) -> Result<()> {
        for script in scripts {
            let batches = self.prepare_script(script)?;
            debug!("executing '{}' ({} batch(es))", script.display(), batches.len());
            for batch in batches {
                session
                    .execute(&batch)
                    .await
                    .map_err(|error| MigrationError::script_execution(script, &error))?;
                report.batches += 1;
            }
            report.scripts += 1;
        }
        Ok(())
    }

    /// Read a script, replace tokens, and break it into batches
    fn prepare_script(&self, script: &Path) -> Result<Vec<String>> {
        let raw = std::fs::read_to_string(script)
            .with_context(|| format!("failed to read script '{}'", script.display()))?;
        let text = self.tokens.replace(&self.config.tokens, &raw);
        Ok(self.data.break_statements(&text))
    }

    /// Order and validate a version directory's bulk files
    fn bulk_files(&self, version_path: &Path) -> Result<Vec<PathBuf>> {
        let files = directory::list_files_with_extension(version_path, "csv")?;
        let files = directory::filter_files(version_path, self.environment_code(), files)?;
        Ok(crate::bulk::ordered_bulk_files(&files)?
            .into_iter()
            .map(|bulk| bulk.path)
            .collect())
    }

    async fn record_failure(&self, sem_version: &str, error: &anyhow::Error) {
        let (path, message) = match error.downcast_ref::<MigrationError>() {
            Some(MigrationError::ScriptExecution { path, message })
            | Some(MigrationError::BulkImport { path, message }) => {
                (path.display().to_string(), message.clone())
            }
            _ => (String::new(), format!("{:#}", error)),
        };

        // A fresh autocommit session: the failing one may hold a broken or
        // rolled-back transaction
        let result = async {
            let mut session = self.data.create_session().await?;
            self.metadata
                .mark_version_failed(session.as_mut(), sem_version, &path, &message)
                .await
        }
        .await;
        if let Err(record_error) = result {
            warn!(
                "failed to record failure of version {}: {:#}",
                sem_version, record_error
            );
        }
    }

    async fn verify_all(
        &self,
        pending: &[VersionDirectory],
        report: &mut RunReport,
    ) -> Result<()> {
        self.verify_phase(INIT_DIRECTORY, report)?;
        self.verify_phase(PRE_DIRECTORY, report)?;
        for directory in pending {
            directory.validate_transaction_layout()?;
            let scripts = directory::collect_scripts(&directory.path, self.environment_code())?;
            self.verify_scripts(&scripts, report)?;
            report.bulk_files += self.bulk_files(&directory.path)?.len();
            report.applied_versions.push(directory.version.sem_version());
        }
        self.verify_phase(DRAFT_DIRECTORY, report)?;
        self.verify_phase(POST_DIRECTORY, report)?;
        Ok(())
    }

    fn verify_phase(&self, phase: &str, report: &mut RunReport) -> Result<()> {
        let base = self.workspace.phase_path(phase);
        let scripts = directory::collect_scripts(&base, self.environment_code())?;
        self.verify_scripts(&scripts, report)
    }

    fn verify_scripts(&self, scripts: &[PathBuf], report: &mut RunReport) -> Result<()> {
        for script in scripts {
            let batches = self.prepare_script(script)?;
            report.batches += batches.len();
            report.scripts += 1;
        }
        Ok(())
    }
}
