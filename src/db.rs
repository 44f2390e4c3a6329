use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use tracing::{info, warn};

pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings shared by every operation against `db_path`.
pub fn connect_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .log_statements(log::LevelFilter::Off)
}

/// Open a fresh connection. Callers own it for one operation and hand it
/// back to [`close_connection`].
pub async fn open_connection(
    options: &SqliteConnectOptions,
) -> Result<SqliteConnection, sqlx::Error> {
    let conn = options.connect().await?;
    info!(target: "bmi_ledger", event = "db_connection_open");
    Ok(conn)
}

pub async fn close_connection(conn: SqliteConnection) {
    match conn.close().await {
        Ok(()) => info!(target: "bmi_ledger", event = "db_connection_close"),
        Err(err) => warn!(
            target: "bmi_ledger",
            event = "db_connection_close_failed",
            error = %err
        ),
    }
}

pub async fn log_effective_pragmas(conn: &mut SqliteConnection) {
    let (sqlite_ver,): (String,) = sqlx::query_as("select sqlite_version()")
        .fetch_one(&mut *conn)
        .await
        .unwrap_or((String::from("unknown"),));

    let jm: (String,) = sqlx::query_as("PRAGMA journal_mode;")
        .fetch_one(&mut *conn)
        .await
        .unwrap_or((String::from("unknown"),));

    let fks: (i64,) = sqlx::query_as("PRAGMA foreign_keys;")
        .fetch_one(&mut *conn)
        .await
        .unwrap_or((i64::MIN,));

    let busy: (i64,) = sqlx::query_as("PRAGMA busy_timeout;")
        .fetch_one(&mut *conn)
        .await
        .unwrap_or((i64::MIN,));

    info!(
        target: "bmi_ledger",
        event = "db_open",
        sqlite_version = %sqlite_ver,
        journal_mode = %jm.0,
        foreign_keys = %fks.0,
        busy_timeout_ms = %busy.0
    );

    if !jm.0.eq_ignore_ascii_case("wal") {
        warn!(
            target: "bmi_ledger",
            event = "db_open_warning",
            msg = "journal_mode != WAL; running with reduced crash safety"
        );
    }
}
