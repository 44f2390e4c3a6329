#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use bmi_ledger_lib::{Config, RecordStore};
use tempfile::TempDir;

/// A store backed by a fresh database file. Keep the `TempDir` alive for
/// as long as the store is used.
pub async fn temp_store() -> (TempDir, RecordStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::with_db_path(dir.path().join("bmi_ledger.sqlite3"));
    let store = RecordStore::open(&config).await.expect("open store");
    (dir, store)
}
