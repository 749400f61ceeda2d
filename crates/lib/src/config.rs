//! Synthesis configuration.
//!
//! There is no config file: defaults are built in and a handful of
//! environment variables override them.

use std::path::PathBuf;

use crate::consts::{APP_NAME, CUSTOM_RESOURCES_SUPPORT_DIR, EDGE_FUNCTION_SUPPORT_DIR};
use crate::lambda::Runtime;

pub const ASSET_BUCKET_ENV: &str = "EDGEKIT_ASSET_BUCKET";
pub const SUPPORT_DIR_ENV: &str = "EDGEKIT_SUPPORT_DIR";
pub const PARTITION_ENV: &str = "EDGEKIT_PARTITION";

const DEFAULT_ASSET_BUCKET: &str = "edgekit-assets";
const DEFAULT_PARTITION: &str = "aws";

#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
  /// Bucket every function asset is addressed in.
  pub asset_bucket: String,
  /// Root of the provider handler code: `edge-function/` holds the bucket,
  /// function and version providers, `custom-resources/` the stack's
  /// custom-resource handler. Packaged as assets when a provider is created.
  pub support_dir: PathBuf,
  /// Partition used in ARNs. `None` renders the `AWS::Partition` pseudo parameter.
  pub partition: Option<String>,
  pub function_runtime: Runtime,
  pub provider_runtime: Runtime,
}

impl SynthConfig {
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      asset_bucket: std::env::var(ASSET_BUCKET_ENV).unwrap_or(defaults.asset_bucket),
      support_dir: std::env::var(SUPPORT_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or(defaults.support_dir),
      partition: std::env::var(PARTITION_ENV).ok().or(defaults.partition),
      ..defaults
    }
  }

  pub fn default_support_dir() -> PathBuf {
    data_dir().join("support")
  }

  pub fn with_support_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.support_dir = dir.into();
    self
  }

  pub fn edge_function_support_dir(&self) -> PathBuf {
    self.support_dir.join(EDGE_FUNCTION_SUPPORT_DIR)
  }

  pub fn custom_resources_support_dir(&self) -> PathBuf {
    self.support_dir.join(CUSTOM_RESOURCES_SUPPORT_DIR)
  }

  pub fn with_asset_bucket(mut self, bucket: &str) -> Self {
    self.asset_bucket = bucket.to_string();
    self
  }
}

impl Default for SynthConfig {
  fn default() -> Self {
    Self {
      asset_bucket: DEFAULT_ASSET_BUCKET.to_string(),
      support_dir: Self::default_support_dir(),
      partition: Some(DEFAULT_PARTITION.to_string()),
      function_runtime: Runtime::Nodejs18,
      provider_runtime: Runtime::Nodejs16,
    }
  }
}

/// Data directory for the application, following XDG on unix.
#[cfg(not(windows))]
fn data_dir() -> PathBuf {
  std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".local").join("share")))
    .unwrap_or_else(|_| std::env::temp_dir())
    .join(APP_NAME)
}

#[cfg(windows)]
fn data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
    .join(APP_NAME)
}
