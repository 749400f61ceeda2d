//! Content-derived logical ids for function versions.
//!
//! A version resource is immutable: the deployment engine only publishes a new
//! version when the resource's logical id changes. Folding a digest of the
//! function parameters into the id makes replacement happen exactly when the
//! parameters change.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::consts::MAX_LOGICAL_ID_LEN;
use crate::util::hash::md5_hex;

#[derive(Debug, Error)]
pub enum IdentityError {
  #[error("expected one rendered resource but found {0}")]
  UnexpectedResourceCount(usize),

  #[error("rendered resource has no Properties.FunctionParams")]
  MissingFunctionParams,

  #[error("failed to serialize function parameters: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Digest of a single rendered function resource.
///
/// `rendered` has the template shape `{"Resources": {<id>: {...}}}` with
/// exactly one entry; only `Properties.FunctionParams` contributes. Map keys
/// are serialized in sorted order, so equal parameters give equal digests.
pub fn calculate_hash(rendered: &Value) -> Result<String, IdentityError> {
  let resources = rendered
    .get("Resources")
    .and_then(Value::as_object)
    .ok_or(IdentityError::UnexpectedResourceCount(0))?;
  if resources.len() != 1 {
    return Err(IdentityError::UnexpectedResourceCount(resources.len()));
  }

  let params = resources
    .values()
    .next()
    .and_then(|body| body.get("Properties"))
    .and_then(|props| props.get("FunctionParams"))
    .ok_or(IdentityError::MissingFunctionParams)?;

  let digest = md5_hex(serde_json::to_string(params)?.as_bytes());
  debug!(digest = %digest, "hashed function parameters");
  Ok(digest)
}

/// Keep the last `max_len` characters of `s`.
pub fn trim_from_start(s: &str, max_len: usize) -> &str {
  let count = s.chars().count();
  if count <= max_len {
    return s;
  }
  let start = s
    .char_indices()
    .nth(count - max_len)
    .map(|(i, _)| i)
    .unwrap_or(s.len());
  &s[start..]
}

/// `original` trimmed from the front so that appending `digest` stays within
/// the logical id limit.
pub fn versioned_logical_id(original: &str, digest: &str) -> String {
  let room = MAX_LOGICAL_ID_LEN.saturating_sub(digest.len());
  format!("{}{}", trim_from_start(original, room), digest)
}
