//! BMI arithmetic and weight-status classification.
//!
//! Everything here is pure: no I/O, no logging, no clock.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest height (cm) or weight (kg) the calculator accepts.
pub const MAX_MEASUREMENT: f64 = 300.0;

pub const UNDERWEIGHT_BELOW: f64 = 18.5;
pub const NORMAL_BELOW: f64 = 24.9;
pub const OVERWEIGHT_BELOW: f64 = 29.9;

/// The user-facing input a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Height,
    Weight,
    Name,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Height => "height",
            Field::Weight => "weight",
            Field::Name => "name",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("Please enter a valid number for {field}.")]
    NonNumeric { field: Field, text: String },
    #[error("The {field} must be greater than 0 and at most 300.")]
    OutOfRange { field: Field, value: f64 },
    #[error("The height is too small to compute a BMI.")]
    HeightTooSmall { value: f64 },
    #[error("Please enter a name.")]
    EmptyName,
    #[error("Names may only contain letters, digits and spaces.")]
    InvalidName { name: String },
    #[error("Names may be at most {max} characters long.")]
    NameTooLong { max: usize },
}

impl InputError {
    pub fn code(&self) -> &'static str {
        match self {
            InputError::NonNumeric { .. } => "INPUT/NON_NUMERIC",
            InputError::OutOfRange { .. } => "INPUT/OUT_OF_RANGE",
            InputError::HeightTooSmall { .. } => "INPUT/HEIGHT_TOO_SMALL",
            InputError::EmptyName => "INPUT/EMPTY_NAME",
            InputError::InvalidName { .. } => "INPUT/INVALID_NAME",
            InputError::NameTooLong { .. } => "INPUT/NAME_TOO_LONG",
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            InputError::NonNumeric { field, .. } | InputError::OutOfRange { field, .. } => {
                Some(field.as_str())
            }
            InputError::HeightTooSmall { .. } => Some(Field::Height.as_str()),
            InputError::EmptyName
            | InputError::InvalidName { .. }
            | InputError::NameTooLong { .. } => Some(Field::Name.as_str()),
        }
    }
}

/// Weight status derived from a BMI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl Category {
    /// Classify a BMI value. Each boundary belongs to the band above it.
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < UNDERWEIGHT_BELOW {
            Category::Underweight
        } else if bmi < NORMAL_BELOW {
            Category::Normal
        } else if bmi < OVERWEIGHT_BELOW {
            Category::Overweight
        } else {
            Category::Obese
        }
    }

    /// Label shown next to the result.
    pub fn label(self) -> &'static str {
        match self {
            Category::Underweight => "Underweight",
            Category::Normal => "Normal weight",
            Category::Overweight => "Overweight",
            Category::Obese => "Obese",
        }
    }

    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Underweight => "underweight",
            Category::Normal => "normal",
            Category::Overweight => "overweight",
            Category::Obese => "obese",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "underweight" => Ok(Category::Underweight),
            "normal" => Ok(Category::Normal),
            "overweight" => Ok(Category::Overweight),
            "obese" => Ok(Category::Obese),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Result of one BMI computation. Only [`calculate`] builds these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calculation {
    height_cm: f64,
    weight_kg: f64,
    bmi: f64,
    category: Category,
}

impl Calculation {
    pub fn height_cm(&self) -> f64 {
        self.height_cm
    }

    pub fn weight_kg(&self) -> f64 {
        self.weight_kg
    }

    pub fn bmi(&self) -> f64 {
        self.bmi
    }

    pub fn category(&self) -> Category {
        self.category
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn check_range(field: Field, value: f64) -> Result<f64, InputError> {
    if value.is_finite() && value > 0.0 && value <= MAX_MEASUREMENT {
        Ok(value)
    } else {
        Err(InputError::OutOfRange { field, value })
    }
}

/// Parse what the user typed into a height or weight box.
pub fn parse_measurement(field: Field, text: &str) -> Result<f64, InputError> {
    let trimmed = text.trim();
    let value: f64 = trimmed.parse().map_err(|_| InputError::NonNumeric {
        field,
        text: trimmed.to_string(),
    })?;
    if value.is_nan() {
        return Err(InputError::NonNumeric {
            field,
            text: trimmed.to_string(),
        });
    }
    check_range(field, value)
}

/// Compute BMI for a height in centimetres and a weight in kilograms.
pub fn calculate(height_cm: f64, weight_kg: f64) -> Result<Calculation, InputError> {
    let height_cm = check_range(Field::Height, height_cm)?;
    let weight_kg = check_range(Field::Weight, weight_kg)?;

    let height_m = height_cm / 100.0;
    let bmi = round2(weight_kg / (height_m * height_m));
    // Heights near zero overflow the quotient.
    if !bmi.is_finite() {
        return Err(InputError::HeightTooSmall { value: height_cm });
    }

    Ok(Calculation {
        height_cm,
        weight_kg,
        bmi,
        category: Category::from_bmi(bmi),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_adult_is_normal_weight() {
        let calc = calculate(180.0, 75.0).unwrap();
        assert_eq!(calc.bmi(), 23.15);
        assert_eq!(calc.category(), Category::Normal);
        assert_eq!(calc.category().label(), "Normal weight");
    }

    #[test]
    fn heavy_short_adult_is_obese() {
        let calc = calculate(160.0, 90.0).unwrap();
        assert_eq!(calc.bmi(), 35.16);
        assert_eq!(calc.category(), Category::Obese);
    }

    #[test]
    fn thresholds_belong_to_the_upper_band() {
        assert_eq!(Category::from_bmi(18.4), Category::Underweight);
        assert_eq!(Category::from_bmi(18.5), Category::Normal);
        assert_eq!(Category::from_bmi(24.8), Category::Normal);
        assert_eq!(Category::from_bmi(24.9), Category::Overweight);
        assert_eq!(Category::from_bmi(29.8), Category::Overweight);
        assert_eq!(Category::from_bmi(29.9), Category::Obese);
    }

    #[test]
    fn zero_and_oversized_values_are_rejected() {
        assert!(matches!(
            calculate(0.0, 70.0),
            Err(InputError::OutOfRange {
                field: Field::Height,
                ..
            })
        ));
        assert!(matches!(
            calculate(170.0, 300.5),
            Err(InputError::OutOfRange {
                field: Field::Weight,
                ..
            })
        ));
        assert!(calculate(-5.0, 70.0).is_err());
        assert!(calculate(f64::INFINITY, 70.0).is_err());
        assert!(calculate(300.0, 300.0).is_ok());
    }

    #[test]
    fn vanishing_height_is_rejected_instead_of_infinite_bmi() {
        let err = calculate(1e-200, 70.0).unwrap_err();
        assert!(matches!(err, InputError::HeightTooSmall { .. }));
        assert_eq!(err.code(), "INPUT/HEIGHT_TOO_SMALL");
        assert_eq!(err.field(), Some("height"));

        let tiny = calculate(0.001, 300.0).unwrap();
        assert!(tiny.bmi().is_finite());
    }

    #[test]
    fn parse_measurement_trims_and_validates() {
        assert_eq!(parse_measurement(Field::Height, " 172.5 ").unwrap(), 172.5);
        assert!(matches!(
            parse_measurement(Field::Weight, "seventy"),
            Err(InputError::NonNumeric { .. })
        ));
        assert!(matches!(
            parse_measurement(Field::Weight, ""),
            Err(InputError::NonNumeric { .. })
        ));
        assert!(matches!(
            parse_measurement(Field::Weight, "NaN"),
            Err(InputError::NonNumeric { .. })
        ));
        assert!(matches!(
            parse_measurement(Field::Height, "0"),
            Err(InputError::OutOfRange { .. })
        ));
    }

    #[test]
    fn category_round_trips_through_storage_form() {
        for category in [
            Category::Underweight,
            Category::Normal,
            Category::Overweight,
            Category::Obese,
        ] {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!("fat".parse::<Category>().is_err());
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(23.148), 23.15);
        assert_eq!(round2(35.156_25), 35.16);
    }
}
