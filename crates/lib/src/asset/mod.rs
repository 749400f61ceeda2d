//! Function assets: local directories packaged for upload.
//!
//! An [`Asset`] turns a bundle directory into an addressable `{bucket, key}`
//! pair at construction time. The key is derived from the directory's content
//! hash, so identical bundles share one uploaded object; the asset itself does
//! no deduplication and every construction registers a new entry.
//!
//! # Packaging
//!
//! ```text
//! <bucket>/
//! └── <sha256>.zip      # deterministic zip of the bundle directory
//! ```

mod package;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::info;

use crate::assembly::AssetSource;
use crate::construct::{ScopePath, Stack};
use crate::error::SynthError;
use crate::util::hash::{ContentHash, HashError, hash_directory};

pub use package::{extract_archive, package_directory};

#[derive(Debug, Error)]
pub enum AssetError {
  #[error("asset directory not found: {0}")]
  NotFound(PathBuf),

  #[error("asset path is not a directory: {0}")]
  NotADirectory(PathBuf),

  #[error("failed to hash asset: {0}")]
  Hash(#[from] HashError),

  #[error("asset io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("archive error: {0}")]
  Zip(#[from] zip::result::ZipError),
}

/// A bundle directory registered with a stack for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
  path: ScopePath,
  source_dir: PathBuf,
  hash: ContentHash,
  bucket: String,
  key: String,
}

impl Asset {
  pub fn new(stack: &Stack, scope: &ScopePath, id: &str, dir: &Path) -> Result<Rc<Asset>, SynthError> {
    let path = scope.child(id)?;
    stack.ensure_open(&path.to_string())?;

    if !dir.exists() {
      return Err(AssetError::NotFound(dir.to_path_buf()).into());
    }
    if !dir.is_dir() {
      return Err(AssetError::NotADirectory(dir.to_path_buf()).into());
    }

    let source_dir = dunce::canonicalize(dir).map_err(|source| AssetError::Io {
      path: dir.to_path_buf(),
      source,
    })?;
    let hash = hash_directory(&source_dir).map_err(AssetError::from)?;
    let key = format!("{}.zip", hash);

    info!(
      stack = %stack.name(),
      path = %path,
      source = %source_dir.display(),
      key = %key,
      "registering asset"
    );

    let asset = Rc::new(Asset {
      path,
      source_dir,
      hash,
      bucket: stack.config().asset_bucket.clone(),
      key,
    });
    stack.register_asset(Rc::clone(&asset))?;
    Ok(asset)
  }

  pub fn path(&self) -> &ScopePath {
    &self.path
  }

  pub fn source_dir(&self) -> &Path {
    &self.source_dir
  }

  pub fn hash(&self) -> &ContentHash {
    &self.hash
  }

  pub fn bucket_name(&self) -> &str {
    &self.bucket
  }

  pub fn object_key(&self) -> &str {
    &self.key
  }

  pub fn source(&self) -> AssetSource {
    AssetSource {
      id: self.path.to_string(),
      source_dir: self.source_dir.clone(),
      hash: self.hash.clone(),
      bucket: self.bucket.clone(),
      key: self.key.clone(),
    }
  }
}
