use crate::error::MigrationError;
use crate::services::{DbVersionRecord, VersionStatus};
use crate::version::LocalVersion;
use crate::workspace::VersionDirectory;
use anyhow::Result;

/// Decide which version directories this run applies.
///
/// Candidates are strictly greater than the highest Successful version and no
/// greater than the target. Versions at or below the highest applied are
/// skipped in full, even when their directories gained new files after they
/// were applied. A Failed record among the candidates blocks the run unless
/// continue-after-failure is set, in which case that version re-applies from
/// its start.
pub fn resolve_pending(
    directories: Vec<VersionDirectory>,
    records: &[DbVersionRecord],
    target: Option<&LocalVersion>,
    continue_after_failure: bool,
) -> Result<Vec<VersionDirectory>> {
    let mut current_key = None;
    for record in records {
        if record.status != VersionStatus::Successful {
            continue;
        }
        let key = LocalVersion::parse(&record.version)?.sequence_key();
        if current_key.is_none_or(|current| key > current) {
            current_key = Some(key);
        }
    }

    let target_key = target.map(LocalVersion::sequence_key);

    let mut pending = Vec::new();
    for directory in directories {
        let key = directory.version.sequence_key();
        if current_key.is_some_and(|current| key <= current) {
            continue;
        }
        if target_key.is_some_and(|target| key > target) {
            continue;
        }

        let previous_failure = records.iter().find(|record| {
            record.status == VersionStatus::Failed
                && record.version == directory.version.sem_version()
        });
        if let Some(failure) = previous_failure
            && !continue_after_failure
        {
            let detail = match &failure.failed_script_path {
                Some(path) => format!(" (at '{}')", path),
                None => String::new(),
            };
            return Err(MigrationError::PreviousRunFailed {
                version: failure.version.clone(),
                detail,
            }
            .into());
        }

        pending.push(directory);
    }

    Ok(pending)
}
