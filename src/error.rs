use std::path::PathBuf;

/// Domain error taxonomy for the migration engine.
///
/// Services below the orchestrator propagate `anyhow::Error`; the orchestrator
/// wraps failures into one of these variants before rethrowing so callers can
/// tell a broken workspace apart from a broken script.
#[derive(thiserror::Error, Debug)]
pub enum MigrationError {
    /// The workspace layout is invalid. The message enumerates every required
    /// path as Found/Missing, or names the offending structural rule.
    #[error("{0}")]
    Structure(String),

    #[error("unsupported platform '{0}'")]
    UnsupportedPlatform(String),

    #[error("script '{path}' failed: {message}")]
    ScriptExecution { path: PathBuf, message: String },

    #[error("bulk file '{path}' failed: {message}")]
    BulkImport { path: PathBuf, message: String },

    /// Malformed version directory or bulk file name.
    #[error("{0}")]
    Naming(String),

    /// A previous run left this version in Failed state and
    /// continue-after-failure was not set.
    #[error(
        "version '{version}' failed in a previous run{detail}; \
         pass --continue-after-failure to retry it"
    )]
    PreviousRunFailed { version: String, detail: String },
}

impl MigrationError {
    pub fn script_execution(path: impl Into<PathBuf>, source: &anyhow::Error) -> Self {
        Self::ScriptExecution {
            path: path.into(),
            message: format!("{:#}", source),
        }
    }

    pub fn bulk_import(path: impl Into<PathBuf>, source: &anyhow::Error) -> Self {
        Self::BulkImport {
            path: path.into(),
            message: format!("{:#}", source),
        }
    }
}
