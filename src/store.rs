//! Record store: durable BMI observations partitioned by subject key.
//!
//! Every subject shares one `observations` table; a partition is a row in
//! `subjects`. Subject keys only ever reach SQL as bound parameters.
//! Each operation opens its own connection and closes it before returning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Connection, Row, SqliteConnection};
use thiserror::Error;
use tracing::{debug, info};

use crate::calculator::{Calculation, Category};
use crate::config::Config;
use crate::subject::SubjectKey;
use crate::time::now_ms;
use crate::{db, migrate, AppError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not prepare the database directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not open the database: {source}")]
    Connect {
        #[source]
        source: sqlx::Error,
    },
    #[error("The database schema could not be prepared: {source}")]
    Migration {
        #[source]
        source: anyhow::Error,
    },
    #[error("Database error while trying to {operation}: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Stored record has an unreadable {column} value `{value}`")]
    Decode { column: &'static str, value: String },
    #[error("The name `{name}` does not belong to subject `{key}`")]
    SubjectMismatch { key: SubjectKey, name: String },
}

impl StorageError {
    pub fn query(operation: &'static str, source: sqlx::Error) -> Self {
        StorageError::Query { operation, source }
    }

    fn connect(source: sqlx::Error) -> Self {
        StorageError::Connect { source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Directory { .. } => "STORAGE/DIRECTORY",
            StorageError::Connect { .. } => "STORAGE/CONNECT",
            StorageError::Migration { .. } => "STORAGE/MIGRATION",
            StorageError::Query { .. } => "STORAGE/QUERY",
            StorageError::Decode { .. } => "STORAGE/DECODE",
            StorageError::SubjectMismatch { .. } => "STORAGE/SUBJECT_MISMATCH",
        }
    }

    pub fn operation(&self) -> Option<&'static str> {
        match self {
            StorageError::Query { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    /// The underlying cause, converted for the error chain shown to users.
    pub fn into_source(self) -> Option<AppError> {
        match self {
            StorageError::Directory { source, .. } => Some(AppError::from(source)),
            StorageError::Connect { source } | StorageError::Query { source, .. } => {
                Some(AppError::from(source))
            }
            StorageError::Migration { source } => Some(AppError::from(source)),
            StorageError::Decode { .. } | StorageError::SubjectMismatch { .. } => None,
        }
    }
}

/// An observation waiting to be saved. The BMI and category always come
/// from a [`Calculation`], so they cannot disagree with height and weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    subject_name: String,
    calculation: Calculation,
}

impl Observation {
    pub fn new(subject_name: impl Into<String>, calculation: Calculation) -> Self {
        Self {
            subject_name: subject_name.into(),
            calculation,
        }
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn calculation(&self) -> &Calculation {
        &self.calculation
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObservation {
    pub id: i64,
    pub subject_key: SubjectKey,
    pub subject_name: String,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: f64,
    pub category: Category,
    /// Milliseconds since the Unix epoch, assigned by the store.
    pub recorded_at: i64,
}

impl TryFrom<&SqliteRow> for StoredObservation {
    type Error = StorageError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let get = |source| StorageError::query("read history", source);
        let category: String = row.try_get("category").map_err(get)?;
        let category = category
            .parse::<Category>()
            .map_err(|_| StorageError::Decode {
                column: "category",
                value: category.clone(),
            })?;
        Ok(Self {
            id: row.try_get("id").map_err(get)?,
            subject_key: decode_key(row, "subject_key")?,
            subject_name: row.try_get("subject_name").map_err(get)?,
            height_cm: row.try_get("height_cm").map_err(get)?,
            weight_kg: row.try_get("weight_kg").map_err(get)?,
            bmi: row.try_get("bmi").map_err(get)?,
            category,
            recorded_at: row.try_get("recorded_at").map_err(get)?,
        })
    }
}

/// Read a key column back, refusing anything the allow-list would not
/// have produced.
fn decode_key(row: &SqliteRow, column: &'static str) -> Result<SubjectKey, StorageError> {
    let raw: String = row
        .try_get(column)
        .map_err(|source| StorageError::query("read subject key", source))?;
    SubjectKey::parse(&raw).map_err(|_| StorageError::Decode { column, value: raw })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectSummary {
    pub key: SubjectKey,
    pub display_name: Option<String>,
    pub created_at: i64,
    pub observations: i64,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    db_path: PathBuf,
    options: SqliteConnectOptions,
}

impl RecordStore {
    /// Prepare the database file and bring its schema up to date.
    pub async fn open(config: &Config) -> Result<Self, StorageError> {
        let db_path = config.db_path.clone();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        info!(target: "bmi_ledger", event = "db_path", path = %db_path.display());

        let store = Self {
            options: db::connect_options(&db_path),
            db_path,
        };

        let mut conn = store.connect().await?;
        let migrated = migrate::apply_migrations(&mut conn)
            .await
            .map_err(|source| StorageError::Migration { source });
        if migrated.is_ok() {
            db::log_effective_pragmas(&mut conn).await;
        }
        db::close_connection(conn).await;
        migrated?;

        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn connect(&self) -> Result<SqliteConnection, StorageError> {
        db::open_connection(&self.options)
            .await
            .map_err(StorageError::connect)
    }

    /// Create the partition for `key` if it does not exist yet. Returns
    /// `true` when this call created it.
    pub async fn ensure_partition(&self, key: &SubjectKey) -> Result<bool, StorageError> {
        let mut conn = self.connect().await?;
        let result = upsert_subject(&mut conn, key, None).await;
        db::close_connection(conn).await;
        let created = result?;
        if created {
            info!(target: "bmi_ledger", event = "partition_created", subject = %key);
        }
        Ok(created)
    }

    /// Insert one observation for `key`, creating the partition on first use.
    pub async fn append(
        &self,
        key: &SubjectKey,
        observation: &Observation,
    ) -> Result<StoredObservation, StorageError> {
        if SubjectKey::from_name(observation.subject_name()).ok().as_ref() != Some(key) {
            return Err(StorageError::SubjectMismatch {
                key: key.clone(),
                name: observation.subject_name().to_string(),
            });
        }
        let started = Instant::now();
        let mut conn = self.connect().await?;
        let result = append_in(&mut conn, key, observation).await;
        db::close_connection(conn).await;
        let stored = result?;
        info!(
            target: "bmi_ledger",
            event = "observation_saved",
            subject = %key,
            id = stored.id,
            bmi = stored.bmi,
            category = stored.category.as_str(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(stored)
    }

    /// Observations for `key`, oldest first. Unknown subjects yield an empty list.
    pub async fn list(&self, key: &SubjectKey) -> Result<Vec<StoredObservation>, StorageError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(
            "SELECT id, subject_key, subject_name, height_cm, weight_kg, bmi, category, recorded_at \
             FROM observations WHERE subject_key = ? ORDER BY recorded_at, id",
        )
        .bind(key.as_str())
        .fetch_all(&mut conn)
        .await
        .map_err(|source| StorageError::query("list history", source));
        db::close_connection(conn).await;

        let rows = result?;
        debug!(target: "bmi_ledger", event = "history_listed", subject = %key, rows = rows.len());
        rows.iter().map(StoredObservation::try_from).collect()
    }

    pub async fn subjects(&self) -> Result<Vec<SubjectSummary>, StorageError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(
            "SELECT s.key, s.display_name, s.created_at, COUNT(o.id) AS observations \
             FROM subjects s LEFT JOIN observations o ON o.subject_key = s.key \
             GROUP BY s.key, s.display_name, s.created_at ORDER BY s.key",
        )
        .fetch_all(&mut conn)
        .await
        .map_err(|source| StorageError::query("list subjects", source));
        db::close_connection(conn).await;

        let get = |source| StorageError::query("list subjects", source);
        result?
            .iter()
            .map(|row| -> Result<SubjectSummary, StorageError> {
                Ok(SubjectSummary {
                    key: decode_key(row, "key")?,
                    display_name: row.try_get("display_name").map_err(get)?,
                    created_at: row.try_get("created_at").map_err(get)?,
                    observations: row.try_get("observations").map_err(get)?,
                })
            })
            .collect()
    }
}

/// Insert the subject row or fill in a missing display name. Returns
/// whether the row is new.
async fn upsert_subject(
    conn: &mut SqliteConnection,
    key: &SubjectKey,
    display_name: Option<&str>,
) -> Result<bool, StorageError> {
    let existed: Option<i64> = sqlx::query_scalar("SELECT 1 FROM subjects WHERE key = ?")
        .bind(key.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|source| StorageError::query("look up subject", source))?;

    sqlx::query(
        "INSERT INTO subjects (key, display_name, created_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET display_name = COALESCE(subjects.display_name, excluded.display_name)",
    )
    .bind(key.as_str())
    .bind(display_name)
    .bind(now_ms())
    .execute(&mut *conn)
    .await
    .map_err(|source| StorageError::query("create subject", source))?;

    Ok(existed.is_none())
}

async fn append_in(
    conn: &mut SqliteConnection,
    key: &SubjectKey,
    observation: &Observation,
) -> Result<StoredObservation, StorageError> {
    let calc = observation.calculation();
    let mut tx = conn
        .begin()
        .await
        .map_err(|source| StorageError::query("begin save", source))?;

    upsert_subject(&mut *tx, key, Some(observation.subject_name())).await?;

    // Keep recorded_at non-decreasing per subject even if the clock steps back.
    let last: Option<i64> =
        sqlx::query_scalar("SELECT MAX(recorded_at) FROM observations WHERE subject_key = ?")
            .bind(key.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|source| StorageError::query("save observation", source))?;
    let recorded_at = last.map_or(now_ms(), |last| last.max(now_ms()));

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO observations \
         (subject_key, subject_name, height_cm, weight_kg, bmi, category, recorded_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(key.as_str())
    .bind(observation.subject_name())
    .bind(calc.height_cm())
    .bind(calc.weight_kg())
    .bind(calc.bmi())
    .bind(calc.category().as_str())
    .bind(recorded_at)
    .fetch_one(&mut *tx)
    .await
    .map_err(|source| StorageError::query("save observation", source))?;

    tx.commit()
        .await
        .map_err(|source| StorageError::query("commit save", source))?;

    Ok(StoredObservation {
        id,
        subject_key: key.clone(),
        subject_name: observation.subject_name().to_string(),
        height_cm: calc.height_cm(),
        weight_kg: calc.weight_kg(),
        bmi: calc.bmi(),
        category: calc.category(),
        recorded_at,
    })
}
