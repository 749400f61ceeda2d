//! Hashing utilities.
//!
//! - `hash_directory()`: sha256 over a directory tree, used to address assets
//! - `hash_file()`: sha256 of a single file
//! - `md5_hex()`: md5 digest used for logical-id stabilization and path ids

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A full 64-character sha256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Hash a directory's structure and contents.
///
/// Each entry contributes one line keyed by its `/`-separated relative path:
/// `F:<path>:<sha256>` for files and `D:<path>` for directories. Symlinks are
/// followed, matching what [`crate::asset::package_directory`] packs, so a
/// link's target content is part of the hash. Timestamps and permissions are
/// ignored.
pub fn hash_directory(root: &Path) -> Result<ContentHash, HashError> {
  let mut lines = Vec::new();

  for entry in WalkDir::new(root).min_depth(1).follow_links(true).sort_by_file_name() {
    let entry = entry.map_err(|e| HashError::Walk {
      path: root.display().to_string(),
      message: e.to_string(),
    })?;
    let rel = relative_slash_path(root, entry.path());
    let kind = entry.file_type();

    if kind.is_dir() {
      lines.push(format!("D:{rel}"));
    } else if kind.is_file() {
      lines.push(format!("F:{rel}:{}", hash_file(entry.path())?));
    }
  }

  lines.sort();
  let mut hasher = Sha256::new();
  for line in &lines {
    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }
  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError::Read {
    path: path.display().to_string(),
    source,
  };
  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Lowercase hex md5 of `data` (always 32 characters).
pub fn md5_hex(data: &[u8]) -> String {
  format!("{:x}", md5::compute(data))
}

/// Relative path from `root` to `path`, joined with `/` on every platform.
pub fn relative_slash_path(root: &Path, path: &Path) -> String {
  let rel = path.strip_prefix(root).unwrap_or(path);
  rel
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}
