use anyhow::Result;
use crate::helpers::{TestWorkspace, fake_migrator, test_config};
use dbmt::config::TransactionMode;

fn execution_order(statements: &[String], fragments: &[&str]) -> Vec<usize> {
    fragments
        .iter()
        .map(|fragment| {
            statements
                .iter()
                .position(|sql| sql.contains(fragment))
                .unwrap_or_else(|| panic!("'{}' was never executed", fragment))
        })
        .collect()
}

#[tokio::test]
async fn test_scripts_execute_alphabetically_by_default() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/02_tables.sql", "CREATE TABLE two (id INT)")?;
    ws.write("v1.00/01_schema.sql", "CREATE TABLE one (id INT)")?;
    ws.write("v1.00/sub/03_data.sql", "CREATE TABLE three (id INT)")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    migrator.run().await?;

    let statements = db.lock().unwrap().committed_statements();
    let order = execution_order(&statements, &["one", "two", "three"]);
    assert!(order[0] < order[1]);
    assert!(order[1] < order[2]);
    Ok(())
}

#[tokio::test]
async fn test_sequence_manifest_reorders_listed_files_first() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/a.sql", "CREATE TABLE alpha (id INT)")?;
    ws.write("v1.00/b.sql", "CREATE TABLE bravo (id INT)")?;
    ws.write("v1.00/c.sql", "CREATE TABLE charlie (id INT)")?;
    // charlie first, then bravo; alpha unlisted appends afterward; the
    // dangling entry is skipped without error
    ws.write("v1.00/_sequence.ini", "c.sql\nb.sql\nno_such_file.sql\n")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    migrator.run().await?;

    let statements = db.lock().unwrap().committed_statements();
    let order = execution_order(&statements, &["charlie", "bravo", "alpha"]);
    assert!(order[0] < order[1]);
    assert!(order[1] < order[2]);
    Ok(())
}

#[tokio::test]
async fn test_nested_directories_sort_independently() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/tables/01.sql", "CREATE TABLE t1 (id INT)")?;
    ws.write("v1.00/tables/02.sql", "CREATE TABLE t2 (id INT)")?;
    ws.write("v1.00/views/01.sql", "CREATE VIEW v1 AS SELECT 1")?;
    // The subdirectory manifest flips only its own files
    ws.write("v1.00/tables/_sequence.ini", "02.sql\n")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    migrator.run().await?;

    let statements = db.lock().unwrap().committed_statements();
    let order = execution_order(&statements, &["TABLE t2", "TABLE t1", "VIEW v1"]);
    assert!(order[0] < order[1], "manifest puts 02 before 01");
    assert!(order[1] < order[2], "tables/ sorts before views/");
    Ok(())
}
