//! The synthesized output of a stack.
//!
//! A cloud assembly is what synthesis hands to the deployment side: the
//! rendered template plus the list of asset sources that must be packaged and
//! uploaded before the template is submitted.
//!
//! # Layout
//!
//! ```text
//! <out_dir>/
//! ├── <stack>.template.json
//! └── <stack>.assets.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::util::hash::ContentHash;

#[derive(Debug, Error)]
pub enum AssemblyError {
  #[error("failed to create assembly directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid assembly json: {0}")]
  Json(#[from] serde_json::Error),
}

/// A directory to package and the address it will be uploaded to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSource {
  /// Construct path of the asset.
  pub id: String,
  pub source_dir: PathBuf,
  pub hash: ContentHash,
  pub bucket: String,
  pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAssembly {
  pub stack_name: String,
  pub template: Value,
  pub assets: Vec<AssetSource>,
}

impl CloudAssembly {
  pub fn template_path(out_dir: &Path, stack_name: &str) -> PathBuf {
    out_dir.join(format!("{stack_name}.template.json"))
  }

  pub fn assets_path(out_dir: &Path, stack_name: &str) -> PathBuf {
    out_dir.join(format!("{stack_name}.assets.json"))
  }

  /// Rendered body of one resource by logical id.
  pub fn resource(&self, logical_id: &str) -> Option<&Value> {
    self.template.get("Resources")?.get(logical_id)
  }

  /// `(logical id, body)` of every resource with the given type.
  pub fn resources_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
    self
      .template
      .get("Resources")
      .and_then(Value::as_object)
      .into_iter()
      .flatten()
      .filter(move |(_, body)| body.get("Type").and_then(Value::as_str) == Some(resource_type))
      .map(|(id, body)| (id.as_str(), body))
  }

  /// Write the template and asset manifest. Writes go through a temp file
  /// and a rename so readers never see a partial file.
  pub fn write(&self, out_dir: &Path) -> Result<(), AssemblyError> {
    fs::create_dir_all(out_dir).map_err(|source| AssemblyError::CreateDir {
      path: out_dir.to_path_buf(),
      source,
    })?;

    let template_path = Self::template_path(out_dir, &self.stack_name);
    write_atomic(&template_path, &serde_json::to_string_pretty(&self.template)?)?;

    let assets_path = Self::assets_path(out_dir, &self.stack_name);
    write_atomic(&assets_path, &serde_json::to_string_pretty(&self.assets)?)?;

    info!(
      stack = %self.stack_name,
      template = %template_path.display(),
      assets = self.assets.len(),
      "wrote cloud assembly"
    );
    Ok(())
  }

  pub fn read(out_dir: &Path, stack_name: &str) -> Result<Self, AssemblyError> {
    let template = serde_json::from_str(&read(&Self::template_path(out_dir, stack_name))?)?;
    let assets = serde_json::from_str(&read(&Self::assets_path(out_dir, stack_name))?)?;
    Ok(Self {
      stack_name: stack_name.to_string(),
      template,
      assets,
    })
  }
}

fn read(path: &Path) -> Result<String, AssemblyError> {
  fs::read_to_string(path).map_err(|source| AssemblyError::Read {
    path: path.to_path_buf(),
    source,
  })
}

fn write_atomic(path: &Path, content: &str) -> Result<(), AssemblyError> {
  let write_err = |source| AssemblyError::Write {
    path: path.to_path_buf(),
    source,
  };
  let temp_path = path.with_extension("json.tmp");
  fs::write(&temp_path, content).map_err(write_err)?;
  fs::rename(&temp_path, path).map_err(write_err)
}
