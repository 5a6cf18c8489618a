use crate::config::types::*;

/// Trait for merging optional configuration values
pub trait Merge<T> {
    fn merge(self, other: T) -> T;
}

impl Merge<ConfigInput> for ConfigInput {
    fn merge(self, other: ConfigInput) -> ConfigInput {
        ConfigInput {
            workspace: match (self.workspace, other.workspace) {
                (Some(a), Some(b)) => Some(a.merge_with(b)),
                (a, b) => b.or(a),
            },
            database: match (self.database, other.database) {
                (Some(a), Some(b)) => Some(a.merge_with(b)),
                (a, b) => b.or(a),
            },
            migration: match (self.migration, other.migration) {
                (Some(a), Some(b)) => Some(a.merge_with(b)),
                (a, b) => b.or(a),
            },
            bulk: match (self.bulk, other.bulk) {
                (Some(a), Some(b)) => Some(a.merge_with(b)),
                (a, b) => b.or(a),
            },
        }
    }
}

impl WorkspaceInput {
    pub fn merge_with(self, other: WorkspaceInput) -> WorkspaceInput {
        WorkspaceInput {
            path: other.path.or(self.path),
            environment: other.environment.or(self.environment),
        }
    }
}

impl DatabaseInput {
    pub fn merge_with(self, other: DatabaseInput) -> DatabaseInput {
        DatabaseInput {
            platform: other.platform.or(self.platform),
            connection_string: other.connection_string.or(self.connection_string),
            auto_create: other.auto_create.or(self.auto_create),
            command_timeout_secs: other.command_timeout_secs.or(self.command_timeout_secs),
            meta_schema: other.meta_schema.or(self.meta_schema),
            meta_table: other.meta_table.or(self.meta_table),
        }
    }
}

impl MigrationInput {
    pub fn merge_with(self, other: MigrationInput) -> MigrationInput {
        MigrationInput {
            target_version: other.target_version.or(self.target_version),
            transaction_mode: other.transaction_mode.or(self.transaction_mode),
            continue_after_failure: other.continue_after_failure.or(self.continue_after_failure),
            // Token maps combine, later layers winning on key collisions
            tokens: match (self.tokens, other.tokens) {
                (Some(mut base), Some(overlay)) => {
                    base.extend(overlay);
                    Some(base)
                }
                (a, b) => b.or(a),
            },
        }
    }
}

impl BulkInput {
    pub fn merge_with(self, other: BulkInput) -> BulkInput {
        BulkInput {
            separator: other.separator.or(self.separator),
            batch_size: other.batch_size.or(self.batch_size),
        }
    }
}
