//! Shared test helpers for integration tests.

use std::fs;
use std::path::Path;

use edgekit_lib::config::SynthConfig;
use edgekit_lib::construct::Stack;
use tempfile::TempDir;

/// Isolated synthesis environment.
///
/// Each test gets its own bundle, provider support code and object store root.
pub struct TestEnv {
  pub bundle: TempDir,
  pub support: TempDir,
  pub store: TempDir,
}

impl TestEnv {
  /// A bundle with an ESM handler at `src/index.js` reading `{{ API_URL }}`.
  pub fn esm() -> Self {
    let env = Self::empty();
    env.write_bundle_file(
      "src/index.js",
      "export const handler = async (event) => ({ status: \"200\", api: \"{{ API_URL }}\" });\n",
    );
    env
  }

  /// A bundle with a CommonJS handler at `lib/main.cjs`.
  pub fn cjs() -> Self {
    let env = Self::empty();
    env.write_bundle_file("lib/main.cjs", "exports.run = async (event) => event;\n");
    env
  }

  pub fn empty() -> Self {
    let support = TempDir::new().unwrap();
    for (dir, file) in [
      ("edge-function", "s3-bucket.js"),
      ("edge-function", "edge-lambda.js"),
      ("edge-function", "edge-lambda-version.js"),
      ("custom-resources", "index.js"),
    ] {
      let path = support.path().join(dir).join(file);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, "exports.handler = async () => ({});\n").unwrap();
    }

    Self {
      bundle: TempDir::new().unwrap(),
      support,
      store: TempDir::new().unwrap(),
    }
  }

  pub fn write_bundle_file(&self, rel: &str, content: &str) {
    let path = self.bundle.path().join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  pub fn read_bundle_file(&self, rel: &str) -> String {
    fs::read_to_string(self.bundle.path().join(rel)).unwrap()
  }

  pub fn bundle_path(&self) -> &Path {
    self.bundle.path()
  }

  pub fn config(&self) -> SynthConfig {
    SynthConfig::default()
      .with_support_dir(self.support.path())
      .with_asset_bucket("integration-assets")
  }

  pub fn stack(&self, name: &str) -> Stack {
    Stack::new(name, self.config()).unwrap()
  }
}
