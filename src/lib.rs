//! BMI calculator with a per-subject observation history backed by SQLite.

pub mod calculator;
pub mod config;
pub mod controller;
pub mod db;
mod error;
pub mod logging;
pub mod migrate;
pub mod store;
pub mod subject;
pub mod time;
pub mod util;

pub use calculator::{calculate, Calculation, Category, InputError};
pub use config::Config;
pub use controller::{CalculationResult, Controller, HistoryRow, UiMessage};
pub use error::{AppError, AppResult};
pub use logging::{init_file_logging, init_logging};
pub use store::{Observation, RecordStore, StorageError, StoredObservation, SubjectSummary};
pub use subject::SubjectKey;
