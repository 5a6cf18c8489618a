use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_help_lists_subcommands() -> Result<()> {
    Command::cargo_bin("dbmt")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("erase"))
        .stdout(predicate::str::contains("list"));
    Ok(())
}

#[test]
fn test_init_scaffolds_the_reserved_layout() -> Result<()> {
    let temp = TempDir::new()?;
    Command::cargo_bin("dbmt")?
        .current_dir(temp.path())
        .args(["init", "--workspace", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    for dir in ["_init", "_pre", "v0.00", "_draft", "_post", "_erase"] {
        assert!(temp.path().join(dir).is_dir(), "missing {}", dir);
    }
    assert!(temp.path().join("dbmt.yaml").is_file());
    Ok(())
}

#[test]
fn test_erase_refuses_without_force() -> Result<()> {
    let temp = TempDir::new()?;
    Command::cargo_bin("dbmt")?
        .current_dir(temp.path())
        .args(["erase", "--connection", "postgres://localhost/app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    Ok(())
}

#[test]
fn test_run_requires_a_connection_string() -> Result<()> {
    let temp = TempDir::new()?;
    Command::cargo_bin("dbmt")?
        .current_dir(temp.path())
        .env_remove("DBMT_CONNECTION_STRING")
        .args(["run", "--workspace", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("connection string"));
    Ok(())
}

#[test]
fn test_unsupported_platform_is_reported() -> Result<()> {
    let temp = TempDir::new()?;
    Command::cargo_bin("dbmt")?
        .current_dir(temp.path())
        .args([
            "run",
            "--workspace",
            ".",
            "--connection",
            "oracle://localhost/app",
            "--platform",
            "oracle",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported platform"));
    Ok(())
}
