//! Construct paths and the logical ids derived from them.

use std::fmt;

use crate::consts::{MAX_LOGICAL_ID_LEN, PATH_HASH_LEN};
use crate::error::SynthError;
use crate::util::hash::md5_hex;

/// Path of a construct relative to its stack, e.g. `Site/Edge/FunctionAsset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopePath(Vec<String>);

impl ScopePath {
  /// The stack itself.
  pub fn root() -> Self {
    Self(Vec::new())
  }

  pub fn is_root(&self) -> bool {
    self.0.is_empty()
  }

  pub fn child(&self, id: &str) -> Result<Self, SynthError> {
    validate_id(id)?;
    let mut components = self.0.clone();
    components.push(id.to_string());
    Ok(Self(components))
  }

  pub fn components(&self) -> &[String] {
    &self.0
  }

  /// Last path component, empty for the root.
  pub fn id(&self) -> &str {
    self.0.last().map(String::as_str).unwrap_or("")
  }

  /// Derive a logical id from the path.
  ///
  /// A top-level construct keeps its (alphanumeric) id. Nested constructs get
  /// the concatenated alphanumeric components followed by an 8-character hash
  /// of the full path, so that distinct paths never collide.
  pub fn logical_id(&self) -> String {
    let human: Vec<String> = self.0.iter().map(|c| alphanumeric(c)).collect();

    if let [only] = human.as_slice() {
      if only.len() <= MAX_LOGICAL_ID_LEN {
        return only.clone();
      }
    }

    let hash = md5_hex(self.to_string().as_bytes())[..PATH_HASH_LEN].to_uppercase();
    let mut human = human.concat();
    human.truncate(MAX_LOGICAL_ID_LEN - PATH_HASH_LEN);
    format!("{human}{hash}")
  }
}

impl fmt::Display for ScopePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.join("/"))
  }
}

fn alphanumeric(s: &str) -> String {
  s.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Construct ids become path components and token targets, so they may not
/// contain path or token delimiters.
pub fn validate_id(id: &str) -> Result<(), SynthError> {
  let invalid = |reason: &str| SynthError::InvalidId {
    id: id.to_string(),
    reason: reason.to_string(),
  };

  if id.is_empty() {
    return Err(invalid("id is empty"));
  }
  if let Some(c) = id.chars().find(|c| matches!(c, '/' | ':' | '{' | '}' | '$')) {
    return Err(invalid(&format!("contains reserved character '{c}'")));
  }
  if !id.chars().any(|c| c.is_ascii_alphanumeric()) {
    return Err(invalid("needs at least one alphanumeric character"));
  }
  Ok(())
}
