use super::{quote_identifier, quote_literal};
use crate::bulk::BulkFile;
use crate::services::tokens::DefaultTokenReplacer;
use crate::services::{BulkImportService, PlatformSession, TokenReplacementService};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Imports a CSV file as batched INSERT statements through the caller's
/// session. The first line names the destination columns; values equal to
/// `NULL` (or empty) become SQL NULL. Field quoting beyond the separator is
/// deliberately out of scope.
pub struct PostgresBulkImportService;

#[async_trait]
impl BulkImportService for PostgresBulkImportService {
    async fn run(
        &self,
        session: &mut dyn PlatformSession,
        file: &Path,
        destination_schema: &str,
        separator: char,
        batch_size: usize,
        timeout_secs: u64,
        tokens: &[(String, String)],
    ) -> Result<()> {
        let bulk = BulkFile::parse(file)?;
        let destination = qualified_destination(&bulk, destination_schema)?;

        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read bulk file {}", file.display()))?;
        let content = DefaultTokenReplacer.replace(tokens, &raw);

        let mut lines = content.lines().filter(|line| !line.trim().is_empty());
        let Some(header) = lines.next() else {
            return Ok(());
        };
        let columns = header
            .split(separator)
            .map(|column| quote_identifier(column.trim()))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        if timeout_secs > 0 {
            session
                .execute(&format!("SET statement_timeout = '{}s'", timeout_secs))
                .await?;
        }

        let rows: Vec<String> = lines.map(|line| render_row(line, separator)).collect();
        let effective_batch = if batch_size == 0 { rows.len().max(1) } else { batch_size };

        for chunk in rows.chunks(effective_batch) {
            let sql = format!(
                "INSERT INTO {} ({}) VALUES\n{}",
                destination,
                columns,
                chunk.join(",\n")
            );
            session
                .execute(&sql)
                .await
                .with_context(|| format!("bulk insert into {} failed", destination))?;
        }

        Ok(())
    }
}

fn qualified_destination(bulk: &BulkFile, default_schema: &str) -> Result<String> {
    let schema = bulk.schema.as_deref().unwrap_or(default_schema);
    Ok(format!(
        "{}.{}",
        quote_identifier(schema)?,
        quote_identifier(&bulk.table)?
    ))
}

fn render_row(line: &str, separator: char) -> String {
    let values: Vec<String> = line
        .split(separator)
        .map(|value| {
            let value = value.trim();
            if value.is_empty() || value.eq_ignore_ascii_case("null") {
                "NULL".to_string()
            } else {
                quote_literal(value)
            }
        })
        .collect();
    format!("({})", values.join(", "))
}
