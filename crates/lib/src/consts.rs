//! Crate-wide constants.

pub const APP_NAME: &str = "edgekit";

/// Platform ceiling on logical identifier length.
pub const MAX_LOGICAL_ID_LEN: usize = 255;

/// Length of a hex-encoded md5 digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// Length of the path hash suffix appended to derived logical ids.
pub const PATH_HASH_LEN: usize = 8;

/// Handler file extensions probed when wrapping a bundle, in probe order.
pub const HANDLER_EXTENSIONS: [&str; 4] = [".js", ".jsx", ".mjs", ".cjs"];

/// Quoted placeholder inside the wrapper that receives the environment object.
pub const ENVIRONMENT_PLACEHOLDER: &str = "\"{{ _EDGE_FUNCTION_ENVIRONMENT_ }}\"";

/// Base name of the generated wrapper file.
pub const WRAPPER_BASENAME: &str = "index-wrapper";

/// Handler the deployed function is configured with.
pub const WRAPPER_HANDLER: &str = "index-wrapper.handler";

/// Bundle files that receive `{{ KEY }}` environment substitution.
pub const ENVIRONMENT_FILE_GLOBS: [&str; 3] = ["**/*.js", "**/*.cjs", "**/*.mjs"];

/// Provider handler subdirectories under the configured support directory.
pub const EDGE_FUNCTION_SUPPORT_DIR: &str = "edge-function";
pub const CUSTOM_RESOURCES_SUPPORT_DIR: &str = "custom-resources";
