//! Shared test fixtures: bundles, provider support code and stacks.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::config::SynthConfig;
use crate::consts::{CUSTOM_RESOURCES_SUPPORT_DIR, EDGE_FUNCTION_SUPPORT_DIR};
use crate::construct::Stack;

/// Write `files` (relative path, content) into a fresh temp directory.
pub fn bundle_dir(files: &[(&str, &str)]) -> TempDir {
  let temp = TempDir::new().unwrap();
  for (rel, content) in files {
    let path = temp.path().join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }
  temp
}

/// A bundle with an ESM handler at `src/index.js`.
pub fn esm_bundle() -> TempDir {
  bundle_dir(&[(
    "src/index.js",
    "export const handler = async (event) => ({ status: \"200\", url: \"{{ API_URL }}\" });",
  )])
}

/// Provider handler code laid out the way the support directory expects.
pub fn support_dir() -> TempDir {
  let temp = TempDir::new().unwrap();
  support_dir_at(temp.path());
  temp
}

/// Write the provider handler code into `root`.
pub fn support_dir_at(root: &Path) {
  let edge = root.join(EDGE_FUNCTION_SUPPORT_DIR);
  let custom = root.join(CUSTOM_RESOURCES_SUPPORT_DIR);
  fs::create_dir_all(&edge).unwrap();
  fs::create_dir_all(&custom).unwrap();
  for handler in ["s3-bucket.js", "edge-lambda.js", "edge-lambda-version.js"] {
    fs::write(edge.join(handler), "exports.handler = async () => ({});").unwrap();
  }
  fs::write(custom.join("index.js"), "exports.handler = async () => ({});").unwrap();
}

pub fn stack(name: &str, support: &Path) -> Stack {
  let config = SynthConfig::default()
    .with_support_dir(support)
    .with_asset_bucket("test-assets");
  Stack::new(name, config).unwrap()
}
