//! Duration and size normalization.
//!
//! Sizing props accept either a raw number already in the unit the resource
//! definition wants, or a human-readable string such as `"10 seconds"` or
//! `"128 MB"`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
  #[error("invalid duration '{input}': {message}")]
  Duration { input: String, message: String },

  #[error("invalid size '{0}': expected '<n> MB' or '<n> GB'")]
  Size(String),
}

/// A timeout given in seconds or as a human-readable duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
  Seconds(u64),
  Human(String),
}

impl DurationInput {
  pub fn to_seconds(&self) -> Result<u64, UnitsError> {
    match self {
      DurationInput::Seconds(secs) => Ok(*secs),
      DurationInput::Human(input) => {
        let duration = humantime::parse_duration(input.trim()).map_err(|e| UnitsError::Duration {
          input: input.clone(),
          message: e.to_string(),
        })?;
        whole_seconds(input, duration)
      }
    }
  }
}

fn whole_seconds(input: &str, duration: Duration) -> Result<u64, UnitsError> {
  if duration.subsec_nanos() != 0 {
    return Err(UnitsError::Duration {
      input: input.to_string(),
      message: "must be a whole number of seconds".to_string(),
    });
  }
  Ok(duration.as_secs())
}

impl From<u64> for DurationInput {
  fn from(secs: u64) -> Self {
    DurationInput::Seconds(secs)
  }
}

impl From<&str> for DurationInput {
  fn from(input: &str) -> Self {
    DurationInput::Human(input.to_string())
  }
}

/// A memory size given in MiB or as `"<n> MB"` / `"<n> GB"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeInput {
  Mebibytes(u64),
  Human(String),
}

impl SizeInput {
  pub fn to_mebibytes(&self) -> Result<u64, UnitsError> {
    match self {
      SizeInput::Mebibytes(mib) => Ok(*mib),
      SizeInput::Human(input) => parse_size(input),
    }
  }
}

fn parse_size(input: &str) -> Result<u64, UnitsError> {
  let invalid = || UnitsError::Size(input.to_string());
  let trimmed = input.trim();
  let split = trimmed.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
  let (number, unit) = trimmed.split_at(split);
  let value: u64 = number.parse().map_err(|_| invalid())?;

  match unit.trim() {
    "MB" => Ok(value),
    "GB" => value.checked_mul(1024).ok_or_else(invalid),
    _ => Err(invalid()),
  }
}

impl From<u64> for SizeInput {
  fn from(mib: u64) -> Self {
    SizeInput::Mebibytes(mib)
  }
}

impl From<&str> for SizeInput {
  fn from(input: &str) -> Self {
    SizeInput::Human(input.to_string())
  }
}
