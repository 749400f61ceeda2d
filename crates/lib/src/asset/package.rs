//! Deterministic zip packaging of asset directories.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::util::hash::relative_slash_path;

use super::AssetError;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> AssetError + '_ {
  move |source| AssetError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Zip `src` into memory.
///
/// Entries are sorted and stamped with a fixed timestamp, so the same tree
/// always yields the same bytes.
pub fn package_directory(src: &Path) -> Result<Vec<u8>, AssetError> {
  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .last_modified_time(DateTime::default())
    .unix_permissions(0o644);

  let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
  let mut files = 0usize;

  for entry in WalkDir::new(src).min_depth(1).follow_links(true).sort_by_file_name() {
    let entry = entry.map_err(|e| AssetError::Io {
      path: src.to_path_buf(),
      source: e.into(),
    })?;
    let name = relative_slash_path(src, entry.path());

    if entry.file_type().is_dir() {
      writer.add_directory(format!("{name}/"), options.unix_permissions(0o755))?;
    } else if entry.file_type().is_file() {
      let content = fs::read(entry.path()).map_err(io_err(entry.path()))?;
      writer.start_file(name, options)?;
      writer.write_all(&content).map_err(io_err(entry.path()))?;
      files += 1;
    }
  }

  let bytes = writer.finish()?.into_inner();
  debug!(source = %src.display(), files, bytes = bytes.len(), "packaged directory");
  Ok(bytes)
}

/// Unpack a zip produced by [`package_directory`] into `dest`.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<(), AssetError> {
  fs::create_dir_all(dest).map_err(io_err(dest))?;
  let mut archive = ZipArchive::new(Cursor::new(bytes))?;
  archive.extract(dest)?;
  Ok(())
}
