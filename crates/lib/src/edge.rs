//! The edge function construct.
//!
//! Edge functions must live in a single home region and cannot read runtime
//! environment variables. [`EdgeFunction`] works around both:
//!
//! - the bundle gets a generated wrapper (see [`crate::wrapper`]) whose
//!   environment placeholder is filled in after upload by an asset replacer
//!   custom resource, which writes a copy keyed by the asset hash and a digest
//!   of its rules so functions sharing a bundle keep their own environment;
//! - the function itself is created by a provider function through a custom
//!   resource, with its code copied into a stack-wide bucket;
//! - a version custom resource publishes an immutable version, and its logical
//!   id carries a digest of the function parameters (see [`crate::identity`])
//!   so a new version is published exactly when the function changes.
//!
//! # Resources
//!
//! ```text
//! <scope>/
//! ├── FunctionAsset              # packaged bundle (asset, not a resource)
//! ├── ServerLambdaRole           # AWS::IAM::Role (+ DefaultPolicy)
//! ├── <id>EdgeLambda             # Custom::EdgeLambda
//! ├── <id>EdgeLambdaVersion      # Custom::EdgeLambdaVersion
//! └── AssetReplacer              # Custom::AssetReplacer
//!
//! stack-wide singletons:
//! EdgeLambdaBucketProvider, EdgeLambdaBucket, EdgeLambdaProvider,
//! EdgeLambdaVersionProvider, CustomResourceHandler
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::asset::{Asset, AssetError};
use crate::consts::{ENVIRONMENT_FILE_GLOBS, ENVIRONMENT_PLACEHOLDER, WRAPPER_HANDLER};
use crate::construct::{Resource, ScopePath, SingletonKey, Stack};
use crate::error::SynthError;
use crate::iam::{Permissions, PolicyStatement, Role, attach_permissions_to_role, grant_pass_role};
use crate::identity::{calculate_hash, versioned_logical_id};
use crate::lambda::{EDGE_LAMBDA_PRINCIPAL, Function, FunctionProps, LAMBDA_PRINCIPAL, basic_execution_policy_arn};
use crate::replace::ReplacementRule;
use crate::units::{DurationInput, SizeInput};
use crate::util::hash::md5_hex;
use crate::wrapper::{HandlerSpec, ModuleFormat, wrap_function_code};

const BUCKET_ID: &str = "EdgeLambdaBucket";
const BUCKET_PROVIDER_ID: &str = "EdgeLambdaBucketProvider";
const FUNCTION_PROVIDER_ID: &str = "EdgeLambdaProvider";
const VERSION_PROVIDER_ID: &str = "EdgeLambdaVersionProvider";
const CUSTOM_RESOURCE_HANDLER_ID: &str = "CustomResourceHandler";

const PROVIDER_TIMEOUT_SECS: u64 = 15 * 60;
const PROVIDER_MEMORY_MB: u64 = 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeFunctionProps {
  /// Directory of compiled handler code. The wrapper is written into it.
  pub bundle_path: PathBuf,
  /// `<module-path>.<method>`, relative to the bundle.
  pub handler: String,
  pub timeout: DurationInput,
  pub memory_size: SizeInput,
  #[serde(default)]
  pub permissions: Option<Permissions>,
  pub format: ModuleFormat,
  #[serde(default)]
  pub environment: BTreeMap<String, String>,
  /// Declare child resources under this path instead of the construct's own,
  /// keeping logical ids stable when the construct tree is reorganized.
  #[serde(skip)]
  pub scope_override: Option<ScopePath>,
}

impl EdgeFunctionProps {
  pub fn new(bundle_path: impl Into<PathBuf>, handler: &str, format: ModuleFormat) -> Self {
    Self {
      bundle_path: bundle_path.into(),
      handler: handler.to_string(),
      timeout: DurationInput::Seconds(10),
      memory_size: SizeInput::Mebibytes(128),
      permissions: None,
      format,
      environment: BTreeMap::new(),
      scope_override: None,
    }
  }

  pub fn with_timeout(mut self, timeout: impl Into<DurationInput>) -> Self {
    self.timeout = timeout.into();
    self
  }

  pub fn with_memory_size(mut self, memory_size: impl Into<SizeInput>) -> Self {
    self.memory_size = memory_size.into();
    self
  }

  pub fn with_permissions(mut self, permissions: Permissions) -> Self {
    self.permissions = Some(permissions);
    self
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.environment.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_scope_override(mut self, scope: ScopePath) -> Self {
    self.scope_override = Some(scope);
    self
  }
}

/// Stack-wide bucket the edge function code is copied into.
struct EdgeLambdaBucket {
  resource: Rc<Resource>,
}

/// An edge function and its version.
pub struct EdgeFunction {
  path: ScopePath,
  role: Rc<Role>,
  asset: Rc<Asset>,
  function: Rc<Resource>,
  version: Rc<Resource>,
  replacer: Rc<Resource>,
}

impl EdgeFunction {
  pub fn new(stack: &Stack, scope: &ScopePath, id: &str, props: EdgeFunctionProps) -> Result<Self, SynthError> {
    let path = scope.child(id)?;
    stack.ensure_open(&path.to_string())?;

    if !props.bundle_path.is_dir() {
      return Err(SynthError::BundleNotFound(props.bundle_path.clone()));
    }
    for support in [
      stack.config().edge_function_support_dir(),
      stack.config().custom_resources_support_dir(),
    ] {
      if !support.is_dir() {
        return Err(AssetError::NotFound(support).into());
      }
    }
    HandlerSpec::parse(&props.handler)?;
    let timeout_secs = props.timeout.to_seconds()?;
    let memory_mb = props.memory_size.to_mebibytes()?;

    wrap_function_code(&props.bundle_path, &props.handler, props.format)?;

    let scope = props.scope_override.clone().unwrap_or_else(|| path.clone());
    let asset = Asset::new(stack, &scope, "FunctionAsset", &props.bundle_path)?;

    let role = Role::new(
      stack,
      scope.child("ServerLambdaRole")?,
      &[LAMBDA_PRINCIPAL, EDGE_LAMBDA_PRINCIPAL],
      vec![basic_execution_policy_arn(&stack.partition())],
    )?;
    if let Some(permissions) = &props.permissions {
      attach_permissions_to_role(stack, &role, permissions)?;
    }

    let bucket = edge_lambda_bucket(stack)?;

    let provider = function_provider(stack)?;
    grant_pass_role(stack, &role, provider.role())?;

    let replacements = environment_replacements(&props.environment, props.format);
    let code_key = replaced_object_key(&asset, &replacements)?;

    let mut function_params = Map::new();
    function_params.insert("Description".to_string(), json!(format!("{id} handler")));
    function_params.insert("Handler".to_string(), json!(WRAPPER_HANDLER));
    function_params.insert(
      "Code".to_string(),
      json!({ "S3Bucket": asset.bucket_name(), "S3Key": code_key }),
    );
    function_params.insert("Runtime".to_string(), json!(stack.config().function_runtime.as_str()));
    function_params.insert("MemorySize".to_string(), json!(memory_mb));
    function_params.insert("Timeout".to_string(), json!(timeout_secs));
    function_params.insert("Role".to_string(), json!(role.arn()));

    let function_id = format!("{id}EdgeLambda");
    let mut function_props = Map::new();
    function_props.insert(
      "FunctionNamePrefix".to_string(),
      json!(format!("{}-{function_id}", stack.name())),
    );
    function_props.insert("FunctionBucket".to_string(), json!(bucket.resource.att("BucketName")));
    function_props.insert("FunctionParams".to_string(), Value::Object(function_params));
    let function = custom_resource(
      stack,
      scope.child(&function_id)?,
      "Custom::EdgeLambda",
      provider.function_arn(),
      function_props,
    )?;

    let version_provider = version_provider(stack)?;
    let mut version_props = Map::new();
    version_props.insert("FunctionArn".to_string(), json!(function.att("FunctionArn")));
    let version = custom_resource(
      stack,
      scope.child(&format!("{id}EdgeLambdaVersion"))?,
      "Custom::EdgeLambdaVersion",
      version_provider.function_arn(),
      version_props,
    )?;
    stabilize_version_id(&version, &function)?;

    let replacer = asset_replacer(stack, &scope, &asset, &code_key, replacements)?;
    function.add_dependency(&replacer)?;

    info!(
      stack = %stack.name(),
      path = %path,
      handler = %props.handler,
      format = ?props.format,
      environment = props.environment.len(),
      "declared edge function"
    );

    Ok(Self {
      path,
      role,
      asset,
      function,
      version,
      replacer,
    })
  }

  pub fn path(&self) -> &ScopePath {
    &self.path
  }

  pub fn role(&self) -> &Rc<Role> {
    &self.role
  }

  pub fn asset(&self) -> &Rc<Asset> {
    &self.asset
  }

  pub fn function_resource(&self) -> &Rc<Resource> {
    &self.function
  }

  pub fn version_resource(&self) -> &Rc<Resource> {
    &self.version
  }

  pub fn replacer_resource(&self) -> &Rc<Resource> {
    &self.replacer
  }

  /// Token for the ARN of the deployed function.
  pub fn function_arn(&self) -> String {
    self.function.att("FunctionArn")
  }

  /// Token for the published version number.
  pub fn version_id(&self) -> String {
    self.version.att("Version")
  }

  /// Qualified ARN of the published version: `<function arn>:<version>`.
  pub fn current_version(&self) -> String {
    format!("{}:{}", self.function_arn(), self.version_id())
  }

  pub fn attach_permissions(&self, stack: &Stack, permissions: &Permissions) -> Result<(), SynthError> {
    attach_permissions_to_role(stack, &self.role, permissions)
  }
}

impl std::fmt::Debug for EdgeFunction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EdgeFunction").field("path", &self.path.to_string()).finish()
  }
}

/// Rules that fill in the environment after the bundle is uploaded: every
/// `{{ KEY }}` in the bundle's scripts, then the wrapper's placeholder with
/// the whole environment object.
pub fn environment_replacements(environment: &BTreeMap<String, String>, format: ModuleFormat) -> Vec<ReplacementRule> {
  let mut rules = Vec::with_capacity(environment.len() * ENVIRONMENT_FILE_GLOBS.len() + 1);
  for (key, value) in environment {
    let token = format!("{{{{ {key} }}}}");
    for files in ENVIRONMENT_FILE_GLOBS {
      rules.push(ReplacementRule::new(files, &token, value));
    }
  }

  rules.push(ReplacementRule::new(
    &format!("/{}", format.wrapper_file_name()),
    ENVIRONMENT_PLACEHOLDER,
    &json!(environment).to_string(),
  ));
  rules
}

fn custom_resource(
  stack: &Stack,
  path: ScopePath,
  resource_type: &str,
  service_token: String,
  properties: Map<String, Value>,
) -> Result<Rc<Resource>, SynthError> {
  let mut props = Map::new();
  props.insert("ServiceToken".to_string(), Value::String(service_token));
  props.extend(properties);
  stack.add_resource(path, resource_type, props)
}

fn provider_function(
  stack: &Stack,
  id: &str,
  handler: &str,
  initial_policy: Vec<PolicyStatement>,
) -> Result<Function, SynthError> {
  let code_dir = stack.config().edge_function_support_dir();
  Function::new(
    stack,
    &ScopePath::root(),
    id,
    FunctionProps {
      code_dir: &code_dir,
      handler,
      runtime: stack.config().provider_runtime,
      timeout_secs: PROVIDER_TIMEOUT_SECS,
      memory_mb: PROVIDER_MEMORY_MB,
      initial_policy,
    },
  )
}

fn edge_lambda_bucket(stack: &Stack) -> Result<Rc<EdgeLambdaBucket>, SynthError> {
  stack.get_or_create(SingletonKey::stack(BUCKET_ID), || {
    let provider = provider_function(
      stack,
      BUCKET_PROVIDER_ID,
      "s3-bucket.handler",
      vec![PolicyStatement::allow(["s3:*"], ["*"])],
    )?;

    let mut props = Map::new();
    props.insert(
      "BucketNamePrefix".to_string(),
      json!(format!("{}-{BUCKET_ID}", stack.name())),
    );
    let resource = custom_resource(
      stack,
      ScopePath::root().child(BUCKET_ID)?,
      "Custom::EdgeLambdaBucket",
      provider.function_arn(),
      props,
    )?;
    Ok(EdgeLambdaBucket { resource })
  })
}

fn function_provider(stack: &Stack) -> Result<Rc<Function>, SynthError> {
  stack.get_or_create(SingletonKey::stack(FUNCTION_PROVIDER_ID), || {
    provider_function(
      stack,
      FUNCTION_PROVIDER_ID,
      "edge-lambda.handler",
      vec![PolicyStatement::allow(["lambda:*", "s3:*"], ["*"])],
    )
  })
}

fn version_provider(stack: &Stack) -> Result<Rc<Function>, SynthError> {
  stack.get_or_create(SingletonKey::stack(VERSION_PROVIDER_ID), || {
    provider_function(
      stack,
      VERSION_PROVIDER_ID,
      "edge-lambda-version.handler",
      vec![PolicyStatement::allow(["lambda:*"], ["*"])],
    )
  })
}

/// Key of the asset copy produced by a replacer with `rules`.
fn replaced_object_key(asset: &Asset, rules: &[ReplacementRule]) -> Result<String, SynthError> {
  let digest = md5_hex(&serde_json::to_vec(rules)?);
  Ok(format!("{}-{digest}.zip", asset.hash()))
}

/// The stack's general-purpose custom resource handler.
fn custom_resource_handler(stack: &Stack) -> Result<Rc<Function>, SynthError> {
  stack.get_or_create(SingletonKey::stack(CUSTOM_RESOURCE_HANDLER_ID), || {
    let code_dir = stack.config().custom_resources_support_dir();
    Function::new(
      stack,
      &ScopePath::root(),
      CUSTOM_RESOURCE_HANDLER_ID,
      FunctionProps {
        code_dir: &code_dir,
        handler: "index.handler",
        runtime: stack.config().provider_runtime,
        timeout_secs: PROVIDER_TIMEOUT_SECS,
        memory_mb: PROVIDER_MEMORY_MB,
        initial_policy: Vec::new(),
      },
    )
  })
}

fn asset_replacer(
  stack: &Stack,
  scope: &ScopePath,
  asset: &Asset,
  output_key: &str,
  replacements: Vec<ReplacementRule>,
) -> Result<Rc<Resource>, SynthError> {
  let handler = custom_resource_handler(stack)?;

  let mut props = Map::new();
  props.insert("bucket".to_string(), json!(asset.bucket_name()));
  props.insert("key".to_string(), json!(asset.object_key()));
  props.insert("outputKey".to_string(), json!(output_key));
  props.insert("replacements".to_string(), serde_json::to_value(replacements)?);
  let resource = custom_resource(
    stack,
    scope.child("AssetReplacer")?,
    "Custom::AssetReplacer",
    handler.function_arn(),
    props,
  )?;

  let access = PolicyStatement::allow(
    ["s3:GetObject", "s3:PutObject"],
    [format!("arn:{}:s3:::{}/*", stack.partition(), asset.bucket_name())],
  );
  if !handler.role().statements().contains(&access) {
    handler.role().add_to_policy(stack, access)?;
  }
  Ok(resource)
}

/// Replace the version's logical id with one carrying a digest of the
/// function's rendered parameters. Evaluated once, when the stack is
/// synthesized.
fn stabilize_version_id(version: &Resource, function: &Rc<Resource>) -> Result<(), SynthError> {
  let original = version.base_logical_id();
  let function = Rc::clone(function);
  version.override_logical_id(move |resolver| {
    let digest = calculate_hash(&function.render(resolver)?)?;
    Ok(versioned_logical_id(&original, &digest))
  })
}
