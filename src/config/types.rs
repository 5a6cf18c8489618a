use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw configuration input - all fields Optional for merging
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigInput {
    pub workspace: Option<WorkspaceInput>,
    pub database: Option<DatabaseInput>,
    pub migration: Option<MigrationInput>,
    pub bulk: Option<BulkInput>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkspaceInput {
    pub path: Option<String>,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseInput {
    pub platform: Option<String>,
    pub connection_string: Option<String>,
    pub auto_create: Option<bool>,
    pub command_timeout_secs: Option<u64>,
    pub meta_schema: Option<String>,
    pub meta_table: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MigrationInput {
    pub target_version: Option<String>,
    pub transaction_mode: Option<TransactionMode>,
    pub continue_after_failure: Option<bool>,
    pub tokens: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BulkInput {
    pub separator: Option<char>,
    pub batch_size: Option<usize>,
}

/// Transaction scope applied while running migrations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// Autocommit per batch; no rollback on failure
    None,
    /// One transaction spans the entire run
    #[default]
    Session,
    /// One transaction per version directory (and per non-version phase)
    Version,
}

/// Resolved configuration with all defaults applied. Passed by reference into
/// the migrator; nothing in the engine mutates it.
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: PathBuf,
    pub environment_code: Option<String>,
    pub platform: String,
    pub connection_string: String,
    pub auto_create_database: bool,
    pub command_timeout_secs: u64,
    pub meta_schema: String,
    pub meta_table: String,
    pub target_version: Option<String>,
    pub transaction_mode: TransactionMode,
    pub continue_after_failure: bool,
    pub tokens: Vec<(String, String)>,
    pub bulk_separator: char,
    pub bulk_batch_size: usize,
}

/// Workspace-related CLI arguments shared by the subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct WorkspaceArgs {
    /// Path to the migration workspace
    #[arg(long, short = 'p')]
    pub workspace: Option<String>,

    /// Environment code for environment-aware scripts (e.g. dev, test, prod)
    #[arg(long, short = 'e')]
    pub environment: Option<String>,
}

impl From<WorkspaceArgs> for WorkspaceInput {
    fn from(args: WorkspaceArgs) -> Self {
        Self {
            path: args.workspace,
            environment: args.environment,
        }
    }
}

/// Database-related CLI arguments shared by the subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// Target platform (currently: postgres)
    #[arg(long)]
    pub platform: Option<String>,

    /// Connection string for the target database
    #[arg(long, short = 'c')]
    pub connection: Option<String>,

    /// Create the target database when it does not exist
    #[arg(long)]
    pub auto_create: bool,

    /// Command timeout in seconds for individual statements
    #[arg(long)]
    pub command_timeout: Option<u64>,

    /// Schema of the bookkeeping version table
    #[arg(long)]
    pub meta_schema: Option<String>,

    /// Name of the bookkeeping version table
    #[arg(long)]
    pub meta_table: Option<String>,
}

impl From<DatabaseArgs> for DatabaseInput {
    fn from(args: DatabaseArgs) -> Self {
        Self {
            platform: args.platform,
            connection_string: args.connection,
            auto_create: args.auto_create.then_some(true),
            command_timeout_secs: args.command_timeout,
            meta_schema: args.meta_schema,
            meta_table: args.meta_table,
        }
    }
}

/// Migration-related CLI arguments
#[derive(Args, Debug, Clone, Default)]
pub struct MigrationArgs {
    /// Highest version to apply; omitted means latest on disk
    #[arg(long, short = 't')]
    pub target_version: Option<String>,

    /// Transaction scope for this run
    #[arg(long, value_enum)]
    pub transaction_mode: Option<TransactionMode>,

    /// Retry versions that failed in a previous run
    #[arg(long)]
    pub continue_after_failure: bool,

    /// Token replacements applied to script text, as key=value
    #[arg(long = "token", short = 'k', value_parser = parse_token)]
    pub tokens: Vec<(String, String)>,

    /// Field separator for bulk CSV files
    #[arg(long)]
    pub bulk_separator: Option<char>,

    /// Row batch size for bulk CSV import
    #[arg(long)]
    pub bulk_batch_size: Option<usize>,
}

fn parse_token(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("token '{}' must be key=value", raw))
}

impl MigrationArgs {
    pub fn to_inputs(&self) -> (MigrationInput, BulkInput) {
        (
            MigrationInput {
                target_version: self.target_version.clone(),
                transaction_mode: self.transaction_mode,
                continue_after_failure: self.continue_after_failure.then_some(true),
                tokens: (!self.tokens.is_empty()).then(|| self.tokens.iter().cloned().collect()),
            },
            BulkInput {
                separator: self.bulk_separator,
                batch_size: self.bulk_batch_size,
            },
        )
    }
}
