//! Glue between what the user types and the calculator/record store.
//!
//! Every action returns [`AppResult`]; the caller turns errors into a
//! [`UiMessage`] and carries on. Nothing here retries.

use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::calculator::{self, Calculation, Field};
use crate::store::{Observation, RecordStore, StoredObservation, SubjectSummary};
use crate::subject::{self, SubjectKey};
use crate::time::format_record_time;
use crate::{AppError, AppResult};

/// Outcome of the Calculate action. Saving takes one of these, so there
/// is nothing to save until a calculation has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalculationResult {
    calculation: Calculation,
}

impl CalculationResult {
    pub fn calculation(&self) -> &Calculation {
        &self.calculation
    }

    /// Text for the results label.
    pub fn summary(&self) -> String {
        format!(
            "{}\nYour BMI is {:.2} kg/m\u{00B2}",
            self.calculation.category().label(),
            self.calculation.bmi()
        )
    }
}

pub const HISTORY_HEADERS: [&str; 5] = ["Record Time", "Height", "Weight", "BMI", "Category"];

/// One line of the history table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub record_time: String,
    pub recorded_at: i64,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: f64,
    pub category: String,
}

impl HistoryRow {
    pub fn cells(&self) -> [String; 5] {
        [
            self.record_time.clone(),
            format!("{}", self.height_cm),
            format!("{}", self.weight_kg),
            format!("{:.2}", self.bmi),
            self.category.clone(),
        ]
    }
}

impl From<&StoredObservation> for HistoryRow {
    fn from(obs: &StoredObservation) -> Self {
        Self {
            record_time: format_record_time(obs.recorded_at),
            recorded_at: obs.recorded_at,
            height_cm: obs.height_cm,
            weight_kg: obs.weight_kg,
            bmi: obs.bmi,
            category: obs.category.label().to_string(),
        }
    }
}

/// What a message box would show for an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiMessage {
    pub title: &'static str,
    pub text: String,
}

impl From<&AppError> for UiMessage {
    fn from(error: &AppError) -> Self {
        let title = if error.is_input() {
            "Input Error"
        } else if error.is_storage() {
            "Database Error"
        } else {
            "Error"
        };
        Self {
            title,
            text: error.message().to_string(),
        }
    }
}

impl fmt::Display for UiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.text)
    }
}

fn report(action: &'static str, error: AppError) -> AppError {
    let error = error.with_context("action", action);
    error.log_with_event("controller_error");
    error
}

pub struct Controller {
    store: RecordStore,
}

impl Controller {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    #[allow(clippy::result_large_err)]
    pub fn calculate(&self, height_text: &str, weight_text: &str) -> AppResult<CalculationResult> {
        calculate_text(height_text, weight_text).map_err(|err| report("calculate", err))
    }

    pub async fn save(&self, name: &str, result: &CalculationResult) -> AppResult<StoredObservation> {
        let key = SubjectKey::from_name(name)
            .map_err(|err| report("save", AppError::from(err)))?;
        let observation = Observation::new(subject::display_name(name), result.calculation);
        let stored = self
            .store
            .append(&key, &observation)
            .await
            .map_err(|err| report("save", AppError::from(err).with_context("subject", key.as_str())))?;
        info!(target: "bmi_ledger", event = "controller_save", subject = %key, id = stored.id);
        Ok(stored)
    }

    pub async fn history(&self, name: &str) -> AppResult<Vec<HistoryRow>> {
        let key = SubjectKey::from_name(name)
            .map_err(|err| report("history", AppError::from(err)))?;
        let rows = self
            .store
            .list(&key)
            .await
            .map_err(|err| report("history", AppError::from(err).with_context("subject", key.as_str())))?;
        Ok(rows.iter().map(HistoryRow::from).collect())
    }

    pub async fn subjects(&self) -> AppResult<Vec<SubjectSummary>> {
        self.store
            .subjects()
            .await
            .map_err(|err| report("subjects", AppError::from(err)))
    }
}

/// Parse both boxes and compute. Height is checked before weight.
#[allow(clippy::result_large_err)]
pub fn calculate_text(height_text: &str, weight_text: &str) -> AppResult<CalculationResult> {
    let height = calculator::parse_measurement(Field::Height, height_text)?;
    let weight = calculator::parse_measurement(Field::Weight, weight_text)?;
    let calculation = calculator::calculate(height, weight)?;
    Ok(CalculationResult { calculation })
}
