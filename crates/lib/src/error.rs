//! Crate-level synthesis error.
//!
//! Each module owns its own error enum; `SynthError` aggregates them so that
//! construct code can propagate with `?`.

use std::path::PathBuf;

use thiserror::Error;

use crate::asset::AssetError;
use crate::identity::IdentityError;
use crate::replace::ReplaceError;
use crate::token::TokenError;
use crate::units::UnitsError;
use crate::wrapper::WrapperError;

#[derive(Debug, Error)]
pub enum SynthError {
  #[error("token error: {0}")]
  Token(#[from] TokenError),

  #[error("wrapper error: {0}")]
  Wrapper(#[from] WrapperError),

  #[error("asset error: {0}")]
  Asset(#[from] AssetError),

  #[error("identity error: {0}")]
  Identity(#[from] IdentityError),

  #[error("replacement error: {0}")]
  Replace(#[from] ReplaceError),

  #[error("invalid sizing: {0}")]
  Units(#[from] UnitsError),

  #[error("failed to serialize: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("invalid construct id '{id}': {reason}")]
  InvalidId { id: String, reason: String },

  #[error("invalid permission '{0}'")]
  InvalidPermission(String),

  #[error("bundle directory not found: {0}")]
  BundleNotFound(PathBuf),

  #[error("construct already exists at path '{0}'")]
  DuplicateConstruct(String),

  #[error("two resources rendered the same logical id '{0}'")]
  DuplicateLogicalId(String),

  #[error("no construct at path '{0}'")]
  UnknownConstruct(String),

  #[error("singleton '{0}' is registered with a different construct type")]
  SingletonTypeMismatch(String),

  #[error("stack is sealed; cannot modify '{0}' after synthesis started")]
  Sealed(String),

  #[error("deferred value for '{0}' evaluated before the stack was sealed")]
  PrematureResolution(String),

  #[error("deferred value for '{0}' depends on itself")]
  DeferredCycle(String),
}
