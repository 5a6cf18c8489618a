//! Shared scaffolding for the integration suites: a tempdir workspace with the
//! reserved layout, and a migrator wired to the in-memory fake platform.

#![allow(dead_code)]

use anyhow::Result;
use dbmt::Migrator;
use dbmt::config::{Config, TransactionMode};
use dbmt::testing::{FakeDatabase, FakePlatform};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub struct TestWorkspace {
    temp: TempDir,
}

impl TestWorkspace {
    /// A workspace with the reserved directories and one empty v0.00
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        for dir in ["_init", "_pre", "v0.00", "_draft", "_post", "_erase"] {
            std::fs::create_dir_all(temp.path().join(dir))?;
        }
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Write a file, creating parent directories as needed
    pub fn write(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.temp.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

pub fn test_config(root: &Path, mode: TransactionMode) -> Config {
    Config {
        workspace: root.to_path_buf(),
        environment_code: None,
        platform: "fake".to_string(),
        connection_string: "fake://localhost/fakedb".to_string(),
        auto_create_database: false,
        command_timeout_secs: 30,
        meta_schema: "dbmt".to_string(),
        meta_table: "dbversion".to_string(),
        target_version: None,
        transaction_mode: mode,
        continue_after_failure: false,
        tokens: Vec::new(),
        bulk_separator: ',',
        bulk_batch_size: 500,
    }
}

pub fn fake_migrator(config: &Config) -> (Arc<Mutex<FakeDatabase>>, Migrator) {
    let (db, services) = FakePlatform::new();
    (db, Migrator::new(config, services))
}

/// Committed statements containing the given fragment
pub fn committed_containing(db: &Arc<Mutex<FakeDatabase>>, fragment: &str) -> Vec<String> {
    db.lock()
        .unwrap()
        .committed_statements()
        .into_iter()
        .filter(|sql| sql.contains(fragment))
        .collect()
}
