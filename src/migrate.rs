use sha2::{Digest, Sha256};
use sqlx::{Connection, Executor, Row, SqliteConnection};
use std::collections::HashMap;

use crate::time::now_ms;
use tracing::{error, info};

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    if trimmed.chars().count() > 160 {
        let head: String = trimmed.chars().take(160).collect();
        format!("{head}…")
    } else {
        trimmed.to_string()
    }
}

pub static MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_subjects.sql",
        include_str!("../migrations/0001_subjects.sql"),
    ),
    (
        "0002_observations.sql",
        include_str!("../migrations/0002_observations.sql"),
    ),
];

/// Migration body without comments or blank lines.
fn clean(raw_sql: &str) -> String {
    raw_sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn checksum(raw_sql: &str) -> String {
    format!("{:x}", Sha256::digest(clean(raw_sql).as_bytes()))
}

async fn ensure_migrations_table(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version   TEXT PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum TEXT NOT NULL\
         )",
    )
    .await?;
    Ok(())
}

/// Applied versions mapped to their stored checksum. Empty when the
/// bookkeeping table has not been created yet.
pub async fn applied_versions(conn: &mut SqliteConnection) -> anyhow::Result<HashMap<String, String>> {
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations'",
    )
    .fetch_optional(&mut *conn)
    .await?;
    if exists.is_none() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query("SELECT version, checksum FROM schema_migrations")
        .fetch_all(&mut *conn)
        .await?;
    let mut applied = HashMap::new();
    for r in rows {
        if let (Ok(v), Ok(c)) = (
            r.try_get::<String, _>("version"),
            r.try_get::<String, _>("checksum"),
        ) {
            applied.insert(v, c);
        }
    }
    Ok(applied)
}

/// File names of migrations that have not been applied yet, in order.
pub async fn pending(conn: &mut SqliteConnection) -> anyhow::Result<Vec<&'static str>> {
    let applied = applied_versions(conn).await?;
    Ok(MIGRATIONS
        .iter()
        .map(|(filename, _)| *filename)
        .filter(|filename| !applied.contains_key(*filename))
        .collect())
}

/// Apply every pending migration. Returns how many were applied.
pub async fn apply_migrations(conn: &mut SqliteConnection) -> anyhow::Result<usize> {
    ensure_migrations_table(conn).await?;
    let applied = applied_versions(conn).await?;
    let mut count = 0;

    for (filename, raw_sql) in MIGRATIONS {
        let cleaned = clean(raw_sql);
        let checksum = checksum(raw_sql);

        if let Some(stored) = applied.get(*filename) {
            if stored != &checksum {
                anyhow::bail!("migration {} edited after application", filename);
            }
            info!(target: "bmi_ledger", event = "migration_skip_file", file = %filename);
            continue;
        }

        let mut tx = conn.begin().await?;
        for stmt in cleaned.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            let upper = s.to_ascii_uppercase();
            if upper == "BEGIN" || upper == "COMMIT" {
                continue;
            }
            info!(target: "bmi_ledger", event = "migration_stmt", file = %filename, sql = %preview(s));
            if let Err(e) = sqlx::query(s).execute(&mut *tx).await {
                error!(target: "bmi_ledger", event = "migration_stmt_error", file = %filename, sql = %preview(s), error = %e);
                return Err(e.into());
            }
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?, ?, ?)",
        )
        .bind(*filename)
        .bind(now_ms())
        .bind(&checksum)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        count += 1;
        info!(target: "bmi_ledger", event = "migration_file_applied", file = %filename);
    }

    Ok(count)
}
