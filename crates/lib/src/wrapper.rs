//! Runtime shim injecting deploy-time environment values.
//!
//! The edge runtime has no native environment variables, so the deployed
//! handler is a generated wrapper: it imports the user's module, merges a JSON
//! object into `process.env` on every invocation and forwards the event. The
//! object starts out as a quoted placeholder that the deploy-time replacer
//! substitutes with the real key/value pairs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::consts::{ENVIRONMENT_PLACEHOLDER, HANDLER_EXTENSIONS, WRAPPER_BASENAME};

#[derive(Debug, Error)]
pub enum WrapperError {
  #[error("invalid handler '{0}': expected '<module-path>.<method>'")]
  InvalidHandler(String),

  #[error("no handler file for '{module}' under {bundle} (tried {tried})")]
  HandlerNotFound {
    bundle: PathBuf,
    module: String,
    tried: String,
  },

  #[error("handler '{module}' is ambiguous under {bundle}: found {found}")]
  AmbiguousHandler {
    bundle: PathBuf,
    module: String,
    found: String,
  },

  #[error("failed to write wrapper {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Module system the bundle is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
  Cjs,
  Esm,
}

impl ModuleFormat {
  pub fn wrapper_extension(self) -> &'static str {
    match self {
      ModuleFormat::Cjs => "cjs",
      ModuleFormat::Esm => "mjs",
    }
  }

  pub fn wrapper_file_name(self) -> String {
    format!("{WRAPPER_BASENAME}.{}", self.wrapper_extension())
  }
}

/// A parsed `<module-path>.<method>` handler string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSpec {
  pub module_path: String,
  pub method: String,
}

impl HandlerSpec {
  /// Split on the last dot; the module path may itself contain dots.
  pub fn parse(handler: &str) -> Result<Self, WrapperError> {
    let (module_path, method) = handler
      .rsplit_once('.')
      .filter(|(module, method)| !module.is_empty() && !method.is_empty() && !module.ends_with('/'))
      .ok_or_else(|| WrapperError::InvalidHandler(handler.to_string()))?;

    Ok(Self {
      module_path: module_path.to_string(),
      method: method.to_string(),
    })
  }

  /// Find the single handler file extension present in `bundle`.
  pub fn resolve_extension(&self, bundle: &Path) -> Result<&'static str, WrapperError> {
    let found: Vec<&'static str> = HANDLER_EXTENSIONS
      .iter()
      .copied()
      .filter(|ext| bundle.join(format!("{}{}", self.module_path, ext)).is_file())
      .collect();

    match found.as_slice() {
      [ext] => Ok(*ext),
      [] => Err(WrapperError::HandlerNotFound {
        bundle: bundle.to_path_buf(),
        module: self.module_path.clone(),
        tried: HANDLER_EXTENSIONS.join(", "),
      }),
      _ => Err(WrapperError::AmbiguousHandler {
        bundle: bundle.to_path_buf(),
        module: self.module_path.clone(),
        found: found.join(", "),
      }),
    }
  }
}

/// Render the wrapper source. Pure: no filesystem access.
pub fn render_wrapper(module_path: &str, extension: &str, method: &str, format: ModuleFormat) -> String {
  let (imports, exports) = match format {
    ModuleFormat::Esm => (
      format!("import * as index from \"./{module_path}{extension}\";"),
      "export { handler };",
    ),
    ModuleFormat::Cjs => (
      format!("\"use strict\"; const index = require(\"./{module_path}\");"),
      "exports.handler = handler;",
    ),
  };

  format!(
    r#"{imports}
const handler = async (event) => {{
  try {{
    // Replaced at deploy time with an object of environment key-value pairs,
    // e.g. const environment = {{"API_URL": "https://api.example.com"}};
    // Changing a value therefore requires a redeployment.
    const environment = {placeholder};
    process.env = {{ ...process.env, ...environment }};
  }} catch (e) {{
    console.log("Failed to set edge function environment.");
    console.log(e);
  }}

  return await index.{method}(event);
}};

{exports}
"#,
    placeholder = ENVIRONMENT_PLACEHOLDER,
  )
}

/// Generate the wrapper for `handler` and write it at the bundle root.
///
/// Returns the path of the written file.
pub fn wrap_function_code(bundle: &Path, handler: &str, format: ModuleFormat) -> Result<PathBuf, WrapperError> {
  let spec = HandlerSpec::parse(handler)?;
  let extension = spec.resolve_extension(bundle)?;
  let content = render_wrapper(&spec.module_path, extension, &spec.method, format);

  let path = bundle.join(format.wrapper_file_name());
  fs::write(&path, content).map_err(|source| WrapperError::Write {
    path: path.clone(),
    source,
  })?;

  info!(
    bundle = %bundle.display(),
    handler = %handler,
    wrapper = %path.display(),
    "wrote handler wrapper"
  );
  Ok(path)
}
