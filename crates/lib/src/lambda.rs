//! Provider functions backing custom resources.
//!
//! A [`Function`] is a plain regional function declared directly in the
//! template: a service role, an optional initial policy and a function
//! resource whose code comes from a packaged directory.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use tracing::info;

use crate::asset::Asset;
use crate::construct::{Resource, ScopePath, Stack};
use crate::error::SynthError;
use crate::iam::{PolicyStatement, Role};

pub const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";
pub const EDGE_LAMBDA_PRINCIPAL: &str = "edgelambda.amazonaws.com";

/// Managed policy granting a function permission to write its logs.
pub fn basic_execution_policy_arn(partition: &str) -> String {
  format!("arn:{partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
  #[serde(rename = "nodejs16.x")]
  Nodejs16,
  #[serde(rename = "nodejs18.x")]
  Nodejs18,
}

impl Runtime {
  pub fn as_str(self) -> &'static str {
    match self {
      Runtime::Nodejs16 => "nodejs16.x",
      Runtime::Nodejs18 => "nodejs18.x",
    }
  }
}

impl fmt::Display for Runtime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

pub struct FunctionProps<'a> {
  pub code_dir: &'a Path,
  pub handler: &'a str,
  pub runtime: Runtime,
  pub timeout_secs: u64,
  pub memory_mb: u64,
  pub initial_policy: Vec<PolicyStatement>,
}

/// A function resource with its own service role.
pub struct Function {
  resource: Rc<Resource>,
  role: Rc<Role>,
  asset: Rc<Asset>,
}

impl Function {
  pub fn new(stack: &Stack, scope: &ScopePath, id: &str, props: FunctionProps<'_>) -> Result<Self, SynthError> {
    let path = scope.child(id)?;

    let role = Role::new(
      stack,
      path.child("ServiceRole")?,
      &[LAMBDA_PRINCIPAL],
      vec![basic_execution_policy_arn(&stack.partition())],
    )?;
    for statement in props.initial_policy {
      role.add_to_policy(stack, statement)?;
    }

    let asset = Asset::new(stack, &path, "Code", props.code_dir)?;

    let mut properties = Map::new();
    properties.insert(
      "Code".to_string(),
      json!({ "S3Bucket": asset.bucket_name(), "S3Key": asset.object_key() }),
    );
    properties.insert("Handler".to_string(), json!(props.handler));
    properties.insert("Runtime".to_string(), json!(props.runtime.as_str()));
    properties.insert("Timeout".to_string(), json!(props.timeout_secs));
    properties.insert("MemorySize".to_string(), json!(props.memory_mb));
    properties.insert("Role".to_string(), json!(role.arn()));

    let resource = stack.add_resource(path, "AWS::Lambda::Function", properties)?;
    resource.add_dependency(role.resource())?;
    if let Some(policy) = role.default_policy() {
      resource.add_dependency(&policy)?;
    }

    info!(
      stack = %stack.name(),
      function = %resource.path(),
      handler = %props.handler,
      runtime = %props.runtime,
      "declared function"
    );
    Ok(Self { resource, role, asset })
  }

  pub fn resource(&self) -> &Rc<Resource> {
    &self.resource
  }

  pub fn path(&self) -> &ScopePath {
    self.resource.path()
  }

  pub fn role(&self) -> &Rc<Role> {
    &self.role
  }

  pub fn asset(&self) -> &Rc<Asset> {
    &self.asset
  }

  /// Token for the function ARN, usable as a custom resource service token.
  pub fn function_arn(&self) -> String {
    self.resource.att("Arn")
  }
}

impl fmt::Debug for Function {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Function").field("path", &self.path().to_string()).finish()
  }
}
