use crate::error::MigrationError;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// A bulk data file scheduled for import after its version directory's SQL
/// scripts. Named `[sequenceno.][schema.]table.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFile {
    pub path: PathBuf,
    pub sequence: Option<u32>,
    pub schema: Option<String>,
    pub table: String,
}

impl BulkFile {
    pub fn parse(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let segments: Vec<&str> = stem.split('.').collect();

        let (sequence, schema, table) = match segments.as_slice() {
            [table] if !table.is_empty() => (None, None, *table),
            [first, table] if !table.is_empty() => match first.parse::<u32>() {
                Ok(sequence) => (Some(sequence), None, *table),
                Err(_) => (None, Some(*first), *table),
            },
            [first, schema, table] if !table.is_empty() => {
                let sequence = first.parse::<u32>().map_err(|_| naming_error(path))?;
                (Some(sequence), Some(*schema), *table)
            }
            _ => return Err(naming_error(path).into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            sequence,
            schema: schema.map(str::to_string),
            table: table.to_string(),
        })
    }

    /// Schema-qualified destination, falling back to the platform default.
    pub fn qualified_table(&self, default_schema: &str) -> String {
        format!(
            "{}.{}",
            self.schema.as_deref().unwrap_or(default_schema),
            self.table
        )
    }
}

fn naming_error(path: &Path) -> MigrationError {
    MigrationError::Naming(format!(
        "Bulk file name must have maximum 3 segments ([sequenceno.][schema.]table.csv): '{}'",
        path.display()
    ))
}

/// Parse and order a version directory's bulk files: sequence number first,
/// then path, so multiple files targeting one table import deterministically.
pub fn ordered_bulk_files(files: &[PathBuf]) -> Result<Vec<BulkFile>> {
    let mut bulk: Vec<BulkFile> = files
        .iter()
        .map(|path| BulkFile::parse(path))
        .collect::<Result<_>>()?;
    bulk.sort_by(|a, b| {
        let left = (a.sequence.unwrap_or(u32::MAX), &a.path);
        let right = (b.sequence.unwrap_or(u32::MAX), &b.path);
        left.cmp(&right)
    });
    Ok(bulk)
}
