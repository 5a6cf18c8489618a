/// End-to-end tests that drive the migrator against tempdir workspaces and
/// the in-memory fake platform
pub mod bulk_files;
pub mod directory_sorting;
pub mod environment_filtering;
pub mod transaction_modes;
