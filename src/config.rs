use std::env;
use std::path::PathBuf;

/// Application identifier used for the per-user data directory.
pub const APP_IDENTIFIER: &str = "com.bmi-ledger";
/// Database file name inside the data directory.
pub const DB_FILE_NAME: &str = "bmi_ledger.sqlite3";
pub const LOG_FILE_NAME: &str = "bmi_ledger.log";

pub const DB_PATH_ENV: &str = "BMI_LEDGER_DB";
/// Test hook: treat this directory as the application data directory.
pub const FAKE_APPDATA_ENV: &str = "BMI_LEDGER_FAKE_APPDATA";
pub const LOG_FILTER_ENV: &str = "BMI_LEDGER_LOG";
pub const DEFAULT_LOG_FILTER: &str = "bmi_ledger=info,sqlx=warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_filter: String,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir()?;
        let db_path = env::var_os(DB_PATH_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME));
        let log_filter = env::var(LOG_FILTER_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            db_path,
            data_dir,
            log_filter,
        })
    }

    /// Configuration rooted at an explicit database file.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let data_dir = db_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            db_path,
            data_dir,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }

    /// Keep everything resolved from the environment but store records in
    /// `db_path`. Logs stay under the data directory.
    pub fn with_db_override(self, db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..self
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn resolve_data_dir() -> anyhow::Result<PathBuf> {
    if let Some(fake) = env::var_os(FAKE_APPDATA_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(fake));
    }

    let base = dirs::data_dir()
        .or_else(|| env::current_dir().ok())
        .ok_or_else(|| anyhow::anyhow!("failed to resolve application data directory"))?;
    Ok(base.join(APP_IDENTIFIER))
}
