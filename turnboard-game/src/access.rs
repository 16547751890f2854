use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::ACCESS_CODE_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessCodeError {
    #[error("access code must be {expected} digits, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("access code may only contain ASCII digits")]
    NonDigit,
}

/// Six-digit code teams type to join a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessCode(String);

impl AccessCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccessCode {
    type Err = AccessCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let actual = trimmed.chars().count();
        if actual != ACCESS_CODE_LEN {
            return Err(AccessCodeError::WrongLength {
                expected: ACCESS_CODE_LEN,
                actual,
            });
        }
        if !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(AccessCodeError::NonDigit);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for AccessCode {
    type Error = AccessCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccessCode> for String {
    fn from(value: AccessCode) -> Self {
        value.0
    }
}

impl fmt::Display for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
