use crate::config::{merge::Merge, types::*};
use crate::constants::{DEFAULT_META_SCHEMA, DEFAULT_META_TABLE};
use anyhow::{Result, anyhow};
use std::path::PathBuf;

pub struct ConfigBuilder {
    config_input: ConfigInput,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config_input: ConfigInput::default(),
        }
    }

    pub fn with_file(mut self, file_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(file_input);
        self
    }

    pub fn with_cli_args(mut self, cli_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(cli_input);
        self
    }

    pub fn resolve(self) -> Result<Config> {
        let workspace_input = self.config_input.workspace.as_ref();
        let database_input = self.config_input.database.as_ref();
        let migration_input = self.config_input.migration.as_ref();
        let bulk_input = self.config_input.bulk.as_ref();

        let workspace: PathBuf = workspace_input
            .and_then(|w| w.path.clone())
            .or_else(|| std::env::var("DBMT_WORKSPACE").ok())
            .unwrap_or_else(|| ".".to_string())
            .into();

        let environment_code = workspace_input
            .and_then(|w| w.environment.clone())
            .or_else(|| std::env::var("DBMT_ENVIRONMENT").ok())
            .filter(|code| !code.trim().is_empty());

        let connection_string = database_input
            .and_then(|d| d.connection_string.clone())
            .or_else(|| std::env::var("DBMT_CONNECTION_STRING").ok())
            .ok_or_else(|| {
                anyhow!(
                    "no connection string configured; pass --connection, set database.connection_string in dbmt.yaml, or export DBMT_CONNECTION_STRING"
                )
            })?;

        let platform = database_input
            .and_then(|d| d.platform.clone())
            .or_else(|| std::env::var("DBMT_PLATFORM").ok())
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase();

        Ok(Config {
            workspace,
            environment_code,
            platform,
            connection_string,
            auto_create_database: database_input.and_then(|d| d.auto_create).unwrap_or(false),
            command_timeout_secs: database_input
                .and_then(|d| d.command_timeout_secs)
                .unwrap_or(30),
            meta_schema: database_input
                .and_then(|d| d.meta_schema.clone())
                .unwrap_or_else(|| DEFAULT_META_SCHEMA.to_string()),
            meta_table: database_input
                .and_then(|d| d.meta_table.clone())
                .unwrap_or_else(|| DEFAULT_META_TABLE.to_string()),
            target_version: migration_input.and_then(|m| m.target_version.clone()),
            transaction_mode: migration_input
                .and_then(|m| m.transaction_mode)
                .unwrap_or_default(),
            continue_after_failure: migration_input
                .and_then(|m| m.continue_after_failure)
                .unwrap_or(false),
            tokens: migration_input
                .and_then(|m| m.tokens.clone())
                .map(|tokens| tokens.into_iter().collect())
                .unwrap_or_default(),
            bulk_separator: bulk_input.and_then(|b| b.separator).unwrap_or(','),
            bulk_batch_size: bulk_input.and_then(|b| b.batch_size).unwrap_or(500),
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
