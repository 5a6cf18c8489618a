use anyhow::Result;
use crate::helpers::{TestWorkspace, committed_containing, fake_migrator, test_config};
use dbmt::Migrator;
use dbmt::config::TransactionMode;
use dbmt::services::VersionStatus;
use dbmt::testing::FakePlatform;

const FAILING_VERSION: &str = "CREATE TABLE widgets (id INT)\n\
GO\n\
CREATE PROCEDURE get_widgets AS SELECT * FROM widgets\n\
GO\n\
SELECT 1/0\n";

fn failing_workspace() -> Result<TestWorkspace> {
    let ws = TestWorkspace::new()?;
    ws.write("v0.00/01_base.sql", "CREATE TABLE base (id INT)")?;
    ws.write("v1.00/01_widgets.sql", FAILING_VERSION)?;
    Ok(ws)
}

#[tokio::test]
async fn test_version_mode_failure_rolls_back_only_current_version() -> Result<()> {
    let ws = failing_workspace()?;
    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    db.lock().unwrap().fail_on = Some("1/0".to_string());

    let err = migrator.run().await.unwrap_err();
    assert!(err.to_string().contains("01_widgets.sql"));

    // v0.00 committed and recorded; nothing from v1.00 survived
    assert_eq!(committed_containing(&db, "base").len(), 1);
    assert!(committed_containing(&db, "widgets").is_empty());

    let db = db.lock().unwrap();
    assert_eq!(
        db.record_for("v0.00").unwrap().status,
        VersionStatus::Successful
    );
    let failed = db.record_for("v1.00").unwrap();
    assert_eq!(failed.status, VersionStatus::Failed);
    assert!(
        failed
            .failed_script_path
            .as_deref()
            .unwrap()
            .contains("01_widgets.sql")
    );
    assert!(
        failed
            .failed_script_error
            .as_deref()
            .unwrap()
            .contains("simulated")
    );
    Ok(())
}

#[tokio::test]
async fn test_version_mode_failure_leaves_current_version_unset() -> Result<()> {
    let ws = TestWorkspace::new()?;
    std::fs::remove_dir(ws.root().join("v0.00"))?;
    ws.write("v1.00/01_widgets.sql", FAILING_VERSION)?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    db.lock().unwrap().fail_on = Some("1/0".to_string());

    migrator.run().await.unwrap_err();
    // The only version rolled back, so no version ever became current
    assert_eq!(migrator.get_current_version().await?, None);
    Ok(())
}

#[tokio::test]
async fn test_session_mode_failure_rolls_back_the_whole_run() -> Result<()> {
    let ws = failing_workspace()?;
    ws.write("_pre/01_settings.sql", "CREATE TABLE settings (k TEXT)")?;

    let config = test_config(ws.root(), TransactionMode::Session);
    let (db, migrator) = fake_migrator(&config);
    db.lock().unwrap().fail_on = Some("1/0".to_string());

    migrator.run().await.unwrap_err();

    let db = db.lock().unwrap();
    // Everything applied earlier in the same call rolled back with the failure
    assert!(db.committed_statements().is_empty());
    // No partial record is possible: the version inserts rolled back too
    assert!(db.records().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_none_mode_commits_everything_before_the_faulty_batch() -> Result<()> {
    let ws = failing_workspace()?;
    let config = test_config(ws.root(), TransactionMode::None);
    let (db, migrator) = fake_migrator(&config);
    db.lock().unwrap().fail_on = Some("1/0".to_string());

    migrator.run().await.unwrap_err();

    // Autocommit: the batches before the fault persist, nothing rolls back
    assert_eq!(committed_containing(&db, "base").len(), 1);
    assert_eq!(committed_containing(&db, "CREATE TABLE widgets").len(), 1);
    assert_eq!(committed_containing(&db, "get_widgets").len(), 1);

    let failed = db.lock().unwrap().record_for("v1.00").unwrap();
    assert_eq!(failed.status, VersionStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_failed_version_blocks_until_continue_after_failure() -> Result<()> {
    let ws = failing_workspace()?;
    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    db.lock().unwrap().fail_on = Some("1/0".to_string());
    migrator.run().await.unwrap_err();

    // A plain re-run refuses to pass the failed version
    let err = migrator.run().await.unwrap_err();
    assert!(err.to_string().contains("--continue-after-failure"));

    // Fix the script, opt into resumption, and the version is retried from
    // its start and promoted
    ws.write(
        "v1.00/01_widgets.sql",
        "CREATE TABLE widgets (id INT)\nGO\nCREATE PROCEDURE get_widgets AS SELECT 1\n",
    )?;
    db.lock().unwrap().fail_on = None;

    let mut retry_config = test_config(ws.root(), TransactionMode::Version);
    retry_config.continue_after_failure = true;
    let retry = Migrator::new(&retry_config, FakePlatform::services_for(&db, true));
    let report = retry.run().await?;

    assert_eq!(report.applied_versions, vec!["v1.00"]);
    let record = db.lock().unwrap().record_for("v1.00").unwrap();
    assert_eq!(record.status, VersionStatus::Successful);
    assert!(record.failed_script_path.is_none());
    assert!(record.failed_script_error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_pre_phase_failure_under_version_mode_records_no_version() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("_pre/01_bad.sql", "SELECT 1/0")?;
    ws.write("v0.00/01.sql", "CREATE TABLE a (id INT)")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    db.lock().unwrap().fail_on = Some("1/0".to_string());

    migrator.run().await.unwrap_err();
    let db = db.lock().unwrap();
    assert!(db.records().is_empty());
    assert!(db.committed_statements().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_transaction_marker_forces_rollback_under_none_mode() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write(
        "v1.00/_transaction/01_widgets.sql",
        "CREATE TABLE widgets (id INT)\nGO\nSELECT 1/0",
    )?;

    let config = test_config(ws.root(), TransactionMode::None);
    let (db, migrator) = fake_migrator(&config);
    db.lock().unwrap().fail_on = Some("1/0".to_string());

    migrator.run().await.unwrap_err();
    // The marker demanded an explicit transaction, so nothing persists even
    // though the configured mode is NONE
    assert!(committed_containing(&db, "widgets").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_transaction_marker_is_honored_without_transactional_ddl() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/_transaction/01.sql", "CREATE TABLE a (id INT)")?;

    let config = test_config(ws.root(), TransactionMode::None);
    let (db, services) = FakePlatform::with_transactional_ddl(false);
    let migrator = Migrator::new(&config, services);

    // The marker still wraps the version; the platform limitation is the
    // operator's informed choice
    migrator.run().await?;
    assert_eq!(committed_containing(&db, "CREATE TABLE a").len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_erase_on_non_transactional_platform_skips_the_transaction() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("_erase/01_drop.sql", "DROP TABLE a")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, services) = FakePlatform::with_transactional_ddl(false);
    let migrator = Migrator::new(&config, services);

    migrator.erase().await?;
    assert_eq!(committed_containing(&db, "DROP TABLE a").len(), 1);
    Ok(())
}
