use anyhow::Result;
use crate::helpers::{TestWorkspace, committed_containing, fake_migrator, test_config};
use dbmt::config::TransactionMode;

fn environment_workspace() -> Result<TestWorkspace> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/01_tables.sql", "CREATE TABLE users (id INT)")?;
    ws.write("v1.00/_test/02_seed.sql", "INSERT INTO users VALUES (1) -- test seed")?;
    ws.write("v1.00/_dev/02_seed.sql", "INSERT INTO users VALUES (999) -- dev seed")?;
    ws.write("v1.00/_prod/02_seed.sql", "INSERT INTO users VALUES (0) -- prod seed")?;
    ws.write("v1.00/03_views_dev.sql", "CREATE VIEW debug_users AS SELECT 1")?;
    Ok(ws)
}

#[tokio::test]
async fn test_environment_code_selects_matching_scripts() -> Result<()> {
    let ws = environment_workspace()?;
    let mut config = test_config(ws.root(), TransactionMode::Version);
    config.environment_code = Some("test".to_string());
    let (db, migrator) = fake_migrator(&config);

    migrator.run().await?;

    // Default and _test-tagged scripts run; _dev/_prod-tagged ones do not
    assert_eq!(committed_containing(&db, "CREATE TABLE users").len(), 1);
    assert_eq!(committed_containing(&db, "test seed").len(), 1);
    assert!(committed_containing(&db, "dev seed").is_empty());
    assert!(committed_containing(&db, "prod seed").is_empty());
    assert!(committed_containing(&db, "debug_users").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_filename_suffix_tags_follow_the_code() -> Result<()> {
    let ws = environment_workspace()?;
    let mut config = test_config(ws.root(), TransactionMode::Version);
    config.environment_code = Some("dev".to_string());
    let (db, migrator) = fake_migrator(&config);

    migrator.run().await?;

    assert_eq!(committed_containing(&db, "dev seed").len(), 1);
    assert_eq!(committed_containing(&db, "debug_users").len(), 1);
    assert!(committed_containing(&db, "test seed").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_missing_environment_code_is_a_structural_error() -> Result<()> {
    let ws = environment_workspace()?;
    let config = test_config(ws.root(), TransactionMode::Version);
    let (_db, migrator) = fake_migrator(&config);

    let err = migrator.run().await.unwrap_err();
    assert!(err.to_string().contains("no environment code"));
    Ok(())
}

#[tokio::test]
async fn test_workspace_without_environment_tags_needs_no_code() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/01_create_tables.sql", "CREATE TABLE users (id INT)")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    migrator.run().await?;

    // "tables" is an ordinary name suffix, not an environment tag
    assert_eq!(committed_containing(&db, "CREATE TABLE users").len(), 1);
    Ok(())
}
