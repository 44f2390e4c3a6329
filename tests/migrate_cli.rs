use std::process::Command;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tempfile::tempdir;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_migrate")
}

fn run(args: &[&str]) -> Result<String> {
    let output = Command::new(bin())
        .env("BMI_LEDGER_LOG", "off")
        .args(args)
        .output()?;
    assert!(
        output.status.success(),
        "migrate {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[test]
fn list_and_status_leave_missing_db_alone() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("empty.sqlite3");
    let db_arg = db.to_str().unwrap();

    let listed = run(&["--db", db_arg, "list"])?;
    assert!(listed.contains("0001_subjects.sql"));
    assert!(listed.contains("pending"));
    assert!(!db.exists());

    let status = run(&["--db", db_arg, "status"])?;
    assert!(status.contains("Applied: 0/2"));
    assert!(status.contains("Head: <none>"));
    assert!(!db.exists());
    Ok(())
}

#[tokio::test]
async fn up_applies_everything_once() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("nested").join("mig.sqlite3");
    let db_arg = db.to_str().unwrap();

    let first = run(&["--db", db_arg, "up"])?;
    assert!(first.contains("Applied 2 migration(s)."));
    let second = run(&["--db", db_arg, "up"])?;
    assert!(second.contains("Nothing to apply."));

    let status = run(&["--db", db_arg, "status"])?;
    assert!(status.contains("Applied: 2/2"));
    assert!(status.contains("Head: 0002_observations.sql"));

    let mut conn = SqliteConnectOptions::new().filename(&db).connect().await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(&mut conn)
        .await?;
    assert_eq!(count, 2);
    conn.close().await?;
    Ok(())
}
