//! Deploy-time asset handling.
//!
//! Synthesis only addresses assets. This module does the I/O afterwards:
//! [`publish_assets`] packages every asset of a [`CloudAssembly`] and uploads
//! it to an [`ObjectStore`], and [`run_asset_replacer`] performs the work of
//! an asset replacer custom resource: download an uploaded artifact, apply its
//! replacement rules to an extracted copy and upload the result under the
//! replacer's own output key. The source object is never rewritten, since
//! identical bundles share it.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use tokio::task;
use tracing::{debug, info};

use crate::assembly::{AssetSource, CloudAssembly};
use crate::asset::{AssetError, extract_archive, package_directory};
use crate::replace::{ReplaceError, ReplaceReport, ReplacementRule, apply_replacements};
use crate::util::hash::{ContentHash, hash_directory};

#[derive(Debug, Error)]
pub enum DeployError {
  #[error("object not found: s3://{bucket}/{key}")]
  NotFound { bucket: String, key: String },

  #[error("invalid object address s3://{bucket}/{key}")]
  InvalidAddress { bucket: String, key: String },

  #[error("object store io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("asset {id} changed since synthesis: expected {expected}, found {actual}")]
  StaleAsset {
    id: String,
    expected: ContentHash,
    actual: ContentHash,
  },

  #[error(transparent)]
  Asset(#[from] AssetError),

  #[error(transparent)]
  Replace(#[from] ReplaceError),

  #[error("background task failed: {0}")]
  Join(#[from] task::JoinError),
}

/// Minimal bucket/key blob storage.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
  async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), DeployError>;
  async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, DeployError>;
  async fn exists(&self, bucket: &str, key: &str) -> Result<bool, DeployError>;
}

/// An [`ObjectStore`] backed by a local directory: `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
  root: PathBuf,
}

impl LocalObjectStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, DeployError> {
    let valid_segment = |s: &str| !s.is_empty() && s != "." && s != ".." && !s.contains('\\');
    if !valid_segment(bucket) || bucket.contains('/') || !key.split('/').all(valid_segment) {
      return Err(DeployError::InvalidAddress {
        bucket: bucket.to_string(),
        key: key.to_string(),
      });
    }
    Ok(self.root.join(bucket).join(key))
  }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> DeployError + '_ {
  move |source| DeployError::Io {
    path: path.to_path_buf(),
    source,
  }
}

impl ObjectStore for LocalObjectStore {
  async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), DeployError> {
    let path = self.object_path(bucket, key)?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }

    let temp_path = path.with_extension("partial");
    fs::write(&temp_path, &body).await.map_err(io_err(&temp_path))?;
    fs::rename(&temp_path, &path).await.map_err(io_err(&path))?;
    debug!(bucket = %bucket, key = %key, bytes = body.len(), "stored object");
    Ok(())
  }

  async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, DeployError> {
    let path = self.object_path(bucket, key)?;
    match fs::read(&path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(DeployError::NotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
      }),
      Err(e) => Err(io_err(&path)(e)),
    }
  }

  async fn exists(&self, bucket: &str, key: &str) -> Result<bool, DeployError> {
    let path = self.object_path(bucket, key)?;
    fs::try_exists(&path).await.map_err(io_err(&path))
  }
}

/// Outcome of [`publish_assets`], as `bucket/key` addresses.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
  pub uploaded: Vec<String>,
  pub skipped: Vec<String>,
}

/// Package and upload every asset of `assembly`.
///
/// Assets whose key is already present are skipped, so identical bundles are
/// uploaded once. A bundle whose content no longer matches the hash recorded
/// at synthesis is rejected.
pub async fn publish_assets<S: ObjectStore>(assembly: &CloudAssembly, store: &S) -> Result<PublishReport, DeployError> {
  let mut report = PublishReport::default();

  for asset in &assembly.assets {
    let address = format!("{}/{}", asset.bucket, asset.key);
    if store.exists(&asset.bucket, &asset.key).await? {
      debug!(asset = %asset.id, address = %address, "asset already published");
      report.skipped.push(address);
      continue;
    }

    let source = asset.clone();
    let bytes = task::spawn_blocking(move || package_verified(&source)).await??;
    let size = bytes.len();
    store.put(&asset.bucket, &asset.key, bytes).await?;

    info!(asset = %asset.id, address = %address, bytes = size, "published asset");
    report.uploaded.push(address);
  }

  info!(
    stack = %assembly.stack_name,
    uploaded = report.uploaded.len(),
    skipped = report.skipped.len(),
    "published assets"
  );
  Ok(report)
}

fn package_verified(asset: &AssetSource) -> Result<Vec<u8>, DeployError> {
  let actual = hash_directory(&asset.source_dir).map_err(AssetError::from)?;
  if actual != asset.hash {
    return Err(DeployError::StaleAsset {
      id: asset.id.clone(),
      expected: asset.hash.clone(),
      actual,
    });
  }
  Ok(package_directory(&asset.source_dir)?)
}

/// Properties of a `Custom::AssetReplacer` resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReplacerProps {
  pub bucket: String,
  /// The published asset, read only.
  pub key: String,
  /// Where the replaced artifact is written.
  pub output_key: String,
  #[serde(default)]
  pub replacements: Vec<ReplacementRule>,
}

/// Apply replacement rules to an uploaded artifact, storing the result at
/// `output_key`.
pub async fn run_asset_replacer<S: ObjectStore>(
  store: &S,
  props: &AssetReplacerProps,
) -> Result<ReplaceReport, DeployError> {
  if props.output_key == props.key {
    return Err(DeployError::InvalidAddress {
      bucket: props.bucket.clone(),
      key: props.output_key.clone(),
    });
  }

  let bytes = store.get(&props.bucket, &props.key).await?;

  let rules = props.replacements.clone();
  let (report, repacked) = task::spawn_blocking(move || -> Result<_, DeployError> {
    let workdir = tempfile::tempdir().map_err(io_err(&std::env::temp_dir()))?;
    extract_archive(&bytes, workdir.path())?;
    let report = apply_replacements(workdir.path(), &rules)?;
    let repacked = package_directory(workdir.path())?;
    Ok((report, repacked))
  })
  .await??;

  store.put(&props.bucket, &props.output_key, repacked).await?;

  info!(
    bucket = %props.bucket,
    key = %props.key,
    output_key = %props.output_key,
    modified = report.files_modified.len(),
    replacements = report.replacements,
    "replaced asset content"
  );
  Ok(report)
}
