//! In-memory fake collaborators for exercising the migration engine without a
//! database. The fakes honor the transaction contract: statements and
//! bookkeeping writes staged inside an open transaction disappear on rollback.

use crate::parser::SqlBatchParser;
use crate::services::{
    BulkImportService, ConnectionInfo, DbVersionRecord, MetadataService, PlatformDataService,
    PlatformServices, PlatformSession, VersionStatus,
};
use crate::version::LocalVersion;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared state behind all fake services: the "database"
#[derive(Default)]
pub struct FakeDatabase {
    pub exists: bool,
    pub configured: bool,
    /// Substring that makes statement execution fail when present
    pub fail_on: Option<String>,
    committed: Vec<String>,
    staged: Vec<String>,
    records: Vec<DbVersionRecord>,
    staged_ops: Vec<RecordOp>,
    transaction_open: bool,
    next_id: i64,
}

enum RecordOp {
    Insert(String),
    MarkSuccessful(String),
    MarkFailed(String, String, String),
}

impl FakeDatabase {
    /// Every statement that survived its transaction scope
    pub fn committed_statements(&self) -> Vec<String> {
        self.committed.clone()
    }

    pub fn records(&self) -> Vec<DbVersionRecord> {
        self.records.clone()
    }

    pub fn successful_versions(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| record.status == VersionStatus::Successful)
            .map(|record| record.version.clone())
            .collect()
    }

    pub fn record_for(&self, version: &str) -> Option<DbVersionRecord> {
        self.records
            .iter()
            .find(|record| record.version == version)
            .cloned()
    }

    fn run_statement(&mut self, sql: &str) -> Result<u64> {
        if let Some(marker) = &self.fail_on
            && sql.contains(marker.as_str())
        {
            return Err(anyhow::anyhow!("simulated execution failure at '{}'", marker));
        }
        if self.transaction_open {
            self.staged.push(sql.to_string());
        } else {
            self.committed.push(sql.to_string());
        }
        Ok(0)
    }

    fn push_op(&mut self, op: RecordOp) {
        if self.transaction_open {
            self.staged_ops.push(op);
        } else {
            self.apply_op(&op);
        }
    }

    fn apply_op(&mut self, op: &RecordOp) {
        match op {
            RecordOp::Insert(version) => {
                if let Some(existing) = self.records.iter_mut().find(|r| r.version == *version) {
                    existing.status = VersionStatus::Failed;
                    existing.applied_on_utc = Utc::now();
                    existing.failed_script_path = None;
                    existing.failed_script_error = None;
                } else {
                    self.next_id += 1;
                    self.records.push(DbVersionRecord {
                        id: self.next_id,
                        version: version.clone(),
                        status: VersionStatus::Failed,
                        applied_on_utc: Utc::now(),
                        applied_by_user: "tester".to_string(),
                        applied_by_tool: crate::constants::TOOL_NAME.to_string(),
                        applied_by_tool_version: crate::constants::TOOL_VERSION.to_string(),
                        failed_script_path: None,
                        failed_script_error: None,
                    });
                }
            }
            RecordOp::MarkSuccessful(version) => {
                if let Some(existing) = self.records.iter_mut().find(|r| r.version == *version) {
                    existing.status = VersionStatus::Successful;
                    existing.failed_script_path = None;
                    existing.failed_script_error = None;
                }
            }
            RecordOp::MarkFailed(version, path, error) => {
                if let Some(existing) = self.records.iter_mut().find(|r| r.version == *version) {
                    existing.status = VersionStatus::Failed;
                    existing.failed_script_path = Some(path.clone());
                    existing.failed_script_error = Some(error.clone());
                } else {
                    self.next_id += 1;
                    self.records.push(DbVersionRecord {
                        id: self.next_id,
                        version: version.clone(),
                        status: VersionStatus::Failed,
                        applied_on_utc: Utc::now(),
                        applied_by_user: "tester".to_string(),
                        applied_by_tool: crate::constants::TOOL_NAME.to_string(),
                        applied_by_tool_version: crate::constants::TOOL_VERSION.to_string(),
                        failed_script_path: Some(path.clone()),
                        failed_script_error: Some(error.clone()),
                    });
                }
            }
        }
    }

    /// Records as seen from inside the current transaction (committed state
    /// with staged operations applied)
    fn visible_records(&self) -> Vec<DbVersionRecord> {
        let mut view = self.clone_for_view();
        for op in &self.staged_ops {
            view.apply_op(op);
        }
        view.records
    }

    fn clone_for_view(&self) -> FakeDatabase {
        FakeDatabase {
            exists: self.exists,
            configured: self.configured,
            fail_on: None,
            committed: Vec::new(),
            staged: Vec::new(),
            records: self.records.clone(),
            staged_ops: Vec::new(),
            transaction_open: false,
            next_id: self.next_id,
        }
    }

    fn commit_transaction(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        self.committed.extend(staged);
        let ops = std::mem::take(&mut self.staged_ops);
        for op in &ops {
            self.apply_op(op);
        }
        self.transaction_open = false;
    }

    fn rollback_transaction(&mut self) {
        self.staged.clear();
        self.staged_ops.clear();
        self.transaction_open = false;
    }
}

/// Entry point: a fake platform whose services all share one [`FakeDatabase`]
pub struct FakePlatform;

impl FakePlatform {
    pub fn new() -> (Arc<Mutex<FakeDatabase>>, PlatformServices) {
        Self::with_transactional_ddl(true)
    }

    pub fn with_transactional_ddl(supported: bool) -> (Arc<Mutex<FakeDatabase>>, PlatformServices) {
        let db = Arc::new(Mutex::new(FakeDatabase {
            exists: true,
            ..Default::default()
        }));
        let services = Self::services_for(&db, supported);
        (db, services)
    }

    /// A fresh service bundle over an existing fake database, for tests that
    /// run several migrator configurations against the same state
    pub fn services_for(
        db: &Arc<Mutex<FakeDatabase>>,
        transactional_ddl: bool,
    ) -> PlatformServices {
        PlatformServices {
            data: Arc::new(FakeDataService {
                db: db.clone(),
                transactional_ddl,
            }),
            metadata: Arc::new(FakeMetadataService { db: db.clone() }),
            bulk: Arc::new(FakeBulkImportService { db: db.clone() }),
        }
    }
}

pub struct FakeDataService {
    db: Arc<Mutex<FakeDatabase>>,
    transactional_ddl: bool,
}

#[async_trait]
impl PlatformDataService for FakeDataService {
    async fn create_session(&self) -> Result<Box<dyn PlatformSession>> {
        Ok(Box::new(FakeSession {
            db: self.db.clone(),
        }))
    }

    fn break_statements(&self, text: &str) -> Vec<String> {
        SqlBatchParser::go()
            .parse(text)
            .into_iter()
            .map(|batch| batch.text)
            .collect()
    }

    fn is_transactional_ddl_supported(&self) -> bool {
        self.transactional_ddl
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            platform: "fake".to_string(),
            database: "fakedb".to_string(),
            host: "localhost".to_string(),
        }
    }

    fn default_schema(&self) -> String {
        "public".to_string()
    }
}

pub struct FakeSession {
    db: Arc<Mutex<FakeDatabase>>,
}

#[async_trait]
impl PlatformSession for FakeSession {
    async fn begin(&mut self) -> Result<()> {
        self.db.lock().unwrap().transaction_open = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.db.lock().unwrap().commit_transaction();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.db.lock().unwrap().rollback_transaction();
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.db.lock().unwrap().run_statement(sql)
    }

    async fn query(&mut self, _sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        // The fake metadata service reads shared state directly
        Ok(Vec::new())
    }

    fn in_transaction(&self) -> bool {
        self.db.lock().unwrap().transaction_open
    }
}

pub struct FakeMetadataService {
    db: Arc<Mutex<FakeDatabase>>,
}

#[async_trait]
impl MetadataService for FakeMetadataService {
    async fn is_database_exists(&self) -> Result<bool> {
        Ok(self.db.lock().unwrap().exists)
    }

    async fn create_database(&self) -> Result<()> {
        self.db.lock().unwrap().exists = true;
        Ok(())
    }

    async fn configure(&self, _session: &mut dyn PlatformSession) -> Result<()> {
        self.db.lock().unwrap().configured = true;
        Ok(())
    }

    async fn get_all_versions(
        &self,
        _session: &mut dyn PlatformSession,
    ) -> Result<Vec<DbVersionRecord>> {
        Ok(self.db.lock().unwrap().visible_records())
    }

    async fn get_all_applied_versions(
        &self,
        _session: &mut dyn PlatformSession,
    ) -> Result<Vec<DbVersionRecord>> {
        Ok(self
            .db
            .lock()
            .unwrap()
            .visible_records()
            .into_iter()
            .filter(|record| record.status == VersionStatus::Successful)
            .collect())
    }

    async fn insert_version(
        &self,
        _session: &mut dyn PlatformSession,
        version: &str,
    ) -> Result<()> {
        self.db
            .lock()
            .unwrap()
            .push_op(RecordOp::Insert(version.to_string()));
        Ok(())
    }

    async fn mark_version_successful(
        &self,
        _session: &mut dyn PlatformSession,
        version: &str,
    ) -> Result<()> {
        self.db
            .lock()
            .unwrap()
            .push_op(RecordOp::MarkSuccessful(version.to_string()));
        Ok(())
    }

    async fn mark_version_failed(
        &self,
        _session: &mut dyn PlatformSession,
        version: &str,
        failed_script_path: &str,
        failed_script_error: &str,
    ) -> Result<()> {
        self.db.lock().unwrap().push_op(RecordOp::MarkFailed(
            version.to_string(),
            failed_script_path.to_string(),
            failed_script_error.to_string(),
        ));
        Ok(())
    }

    async fn get_current_version(
        &self,
        session: &mut dyn PlatformSession,
    ) -> Result<Option<String>> {
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

pub struct FakeBulkImportService {
    db: Arc<Mutex<FakeDatabase>>,
}

#[async_trait]
impl BulkImportService for FakeBulkImportService {
    async fn run(
        &self,
        _session: &mut dyn PlatformSession,
        file: &Path,
        destination_schema: &str,
        separator: char,
        batch_size: usize,
        _timeout_secs: u64,
        _tokens: &[(String, String)],
    ) -> Result<()> {
        let bulk = crate::bulk::BulkFile::parse(file)?;
        let content = std::fs::read_to_string(file)?;
        let rows = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .skip(1)
            .count();
        let statement = format!(
            "BULK IMPORT {} rows={} separator={} batch={}",
            bulk.qualified_table(destination_schema),
            rows,
            separator,
            batch_size
        );
        self.db.lock().unwrap().run_statement(&statement)?;
        Ok(())
    }
}
