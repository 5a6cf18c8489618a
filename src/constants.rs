use once_cell::sync::Lazy;
use std::collections::HashSet;

// Reserved workspace directory names
pub const INIT_DIRECTORY: &str = "_init";
pub const PRE_DIRECTORY: &str = "_pre";
pub const DRAFT_DIRECTORY: &str = "_draft";
pub const POST_DIRECTORY: &str = "_post";
pub const ERASE_DIRECTORY: &str = "_erase";
pub const TRANSACTION_DIRECTORY: &str = "_transaction";

// Per-directory sort manifest file name
pub const SEQUENCE_MANIFEST: &str = "_sequence.ini";

// Configuration file name
pub const CONFIG_FILENAME: &str = "dbmt.yaml";

// Recorded into the bookkeeping table with every applied version
pub const TOOL_NAME: &str = "dbmt";
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// Bookkeeping table defaults
pub const DEFAULT_META_SCHEMA: &str = "dbmt";
pub const DEFAULT_META_TABLE: &str = "dbversion";

/// Underscore-prefixed names that are workspace structure, not environment tags
pub static RESERVED_DIRECTORIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        INIT_DIRECTORY,
        PRE_DIRECTORY,
        DRAFT_DIRECTORY,
        POST_DIRECTORY,
        ERASE_DIRECTORY,
        TRANSACTION_DIRECTORY,
    ])
});

/// Conventional environment codes recognized in filename suffixes even when
/// no matching `_<code>` directory exists in the workspace
pub static CONVENTIONAL_ENVIRONMENTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "dev",
        "test",
        "qa",
        "uat",
        "staging",
        "prod",
        "production",
        "local",
    ])
});
