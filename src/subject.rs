use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::calculator::InputError;

pub const MAX_KEY_LEN: usize = 64;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9 ]+$").unwrap());
static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(_[a-z0-9]+)*$").unwrap());

/// Partition key for a subject: lowercase ASCII alphanumerics joined by `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
    /// Normalize a free-text name. `"John Doe"` becomes `john_doe`.
    pub fn from_name(name: &str) -> Result<Self, InputError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(InputError::EmptyName);
        }
        if !NAME_RE.is_match(trimmed) {
            return Err(InputError::InvalidName {
                name: trimmed.to_string(),
            });
        }
        let key = trimmed
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .collect::<Vec<_>>()
            .join("_");
        if key.len() > MAX_KEY_LEN {
            return Err(InputError::NameTooLong { max: MAX_KEY_LEN });
        }
        Ok(Self(key))
    }

    /// Accept an already-normalized key, e.g. one read back from the database.
    pub fn parse(key: &str) -> Result<Self, InputError> {
        if key.len() > MAX_KEY_LEN {
            return Err(InputError::NameTooLong { max: MAX_KEY_LEN });
        }
        if KEY_RE.is_match(key) {
            Ok(Self(key.to_string()))
        } else {
            Err(InputError::InvalidName {
                name: key.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl PartialEq<str> for SubjectKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SubjectKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl AsRef<str> for SubjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trimmed display form of a name, with inner whitespace collapsed.
pub fn display_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}
