use anyhow::Result;
use crate::helpers::{TestWorkspace, committed_containing, fake_migrator, test_config};
use dbmt::config::TransactionMode;

#[tokio::test]
async fn test_bulk_files_import_after_the_version_scripts() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/01_tables.sql", "CREATE TABLE customers (id INT, name TEXT)")?;
    ws.write("v1.00/customers.csv", "id,name\n1,alice\n2,bob\n")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    let report = migrator.run().await?;

    assert_eq!(report.bulk_files, 1);
    let statements = db.lock().unwrap().committed_statements();
    let table = statements
        .iter()
        .position(|sql| sql.contains("CREATE TABLE customers"))
        .unwrap();
    let import = statements
        .iter()
        .position(|sql| sql.contains("BULK IMPORT public.customers"))
        .unwrap();
    assert!(table < import);
    assert!(statements[import].contains("rows=2"));
    Ok(())
}

#[tokio::test]
async fn test_bulk_sequence_numbers_order_imports() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/01_tables.sql", "CREATE TABLE orders (id INT)")?;
    ws.write("v1.00/02.orders.csv", "id\n3\n4\n")?;
    ws.write("v1.00/01.orders.csv", "id\n1\n2\n")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    migrator.run().await?;

    let imports = committed_containing(&db, "BULK IMPORT");
    assert_eq!(imports.len(), 2);
    // Both target the same table; the sequence number decides who goes first,
    // and both land in the default schema
    assert!(imports[0].contains("public.orders"));
    assert!(imports[1].contains("public.orders"));
    Ok(())
}

#[tokio::test]
async fn test_bulk_schema_segment_overrides_default() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/01_tables.sql", "CREATE TABLE sales.orders (id INT)")?;
    ws.write("v1.00/sales.orders.csv", "id\n1\n")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    migrator.run().await?;

    assert_eq!(committed_containing(&db, "BULK IMPORT sales.orders").len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_malformed_bulk_name_is_a_naming_error() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/01_tables.sql", "CREATE TABLE a (id INT)")?;
    ws.write("v1.00/01.sales.orders.extra.csv", "id\n1\n")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (_db, migrator) = fake_migrator(&config);

    let err = migrator.run().await.unwrap_err();
    assert!(err.to_string().contains("maximum 3 segments"));
    Ok(())
}

#[tokio::test]
async fn test_bulk_failure_rolls_back_the_version_with_its_scripts() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/01_tables.sql", "CREATE TABLE customers (id INT)")?;
    ws.write("v1.00/customers.csv", "id\n1\n")?;

    let config = test_config(ws.root(), TransactionMode::Version);
    let (db, migrator) = fake_migrator(&config);
    // The import statement itself trips the failure marker
    db.lock().unwrap().fail_on = Some("BULK IMPORT".to_string());

    let err = migrator.run().await.unwrap_err();
    assert!(err.to_string().contains("customers.csv"));
    // The version's SQL rolled back together with the failed import
    assert!(committed_containing(&db, "CREATE TABLE customers").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_bulk_separator_and_batch_size_are_passed_through() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("v1.00/01_tables.sql", "CREATE TABLE items (id INT)")?;
    ws.write("v1.00/items.csv", "id|name\n1|bolt\n")?;

    let mut config = test_config(ws.root(), TransactionMode::Version);
    config.bulk_separator = '|';
    config.bulk_batch_size = 50;
    let (db, migrator) = fake_migrator(&config);
    migrator.run().await?;

    let imports = committed_containing(&db, "BULK IMPORT public.items");
    assert_eq!(imports.len(), 1);
    assert!(imports[0].contains("separator=|"));
    assert!(imports[0].contains("batch=50"));
    Ok(())
}
