use anyhow::{Context, Result};
use bmi_ledger_lib::{db, migrate, Config};
use clap::{Parser, Subcommand};
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "migrate", about = "bmi-ledger migration helper")]
struct Cli {
    /// Optional explicit DB path
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List migrations and show applied/pending
    List,
    /// Show current migration status
    Status,
    /// Apply pending migrations
    Up,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    bmi_ledger_lib::init_logging();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => Config::from_env()?.db_path,
    };

    match cli.cmd {
        Cmd::List => list(&db_path).await,
        Cmd::Status => status(&db_path).await,
        Cmd::Up => up(&db_path).await,
    }
}

async fn open_existing(db: &Path) -> Result<Option<SqliteConnection>> {
    if !db.exists() {
        return Ok(None);
    }
    let options = db::connect_options(db).create_if_missing(false);
    let conn = db::open_connection(&options)
        .await
        .with_context(|| format!("open sqlite database at {}", db.display()))?;
    Ok(Some(conn))
}

/// Pending file names, or all of them when the database does not exist yet.
async fn pending_for(db: &Path) -> Result<Vec<&'static str>> {
    match open_existing(db).await? {
        Some(mut conn) => {
            let pending = migrate::pending(&mut conn).await;
            db::close_connection(conn).await;
            pending
        }
        None => Ok(migrate::MIGRATIONS.iter().map(|(name, _)| *name).collect()),
    }
}

async fn list(db: &Path) -> Result<()> {
    let pending = pending_for(db).await?;
    println!("DB: {}", db.display());
    for (name, _) in migrate::MIGRATIONS {
        let state = if pending.contains(name) {
            "pending"
        } else {
            "applied"
        };
        println!("{:<32}  {}", name, state);
    }
    Ok(())
}

async fn status(db: &Path) -> Result<()> {
    let pending = pending_for(db).await?;
    let total = migrate::MIGRATIONS.len();
    let head = migrate::MIGRATIONS
        .iter()
        .rev()
        .map(|(name, _)| *name)
        .find(|name| !pending.contains(name))
        .unwrap_or("<none>");
    println!("DB: {}", db.display());
    println!("Applied: {}/{}", total - pending.len(), total);
    println!("Head: {}", head);
    Ok(())
}

async fn up(db: &Path) -> Result<()> {
    if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database parent directory {}", parent.display()))?;
    }
    let mut conn = db::open_connection(&db::connect_options(db))
        .await
        .with_context(|| format!("open sqlite database at {}", db.display()))?;
    let applied = migrate::apply_migrations(&mut conn).await;
    db::close_connection(conn).await;

    match applied? {
        0 => println!("Nothing to apply."),
        n => println!("Applied {n} migration(s)."),
    }
    Ok(())
}
