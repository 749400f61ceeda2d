//! Synthesis of edge functions through the public API.

use edgekit_lib::assembly::CloudAssembly;
use edgekit_lib::construct::ScopePath;
use edgekit_lib::edge::{EdgeFunction, EdgeFunctionProps};
use edgekit_lib::error::SynthError;
use edgekit_lib::token::Resolver;
use edgekit_lib::wrapper::{ModuleFormat, WrapperError};
use serde_json::json;
use tempfile::TempDir;

use super::common::TestEnv;

fn site() -> ScopePath {
  ScopePath::root().child("Site").unwrap()
}

fn esm_props(env: &TestEnv) -> EdgeFunctionProps {
  EdgeFunctionProps::new(env.bundle_path(), "src/index.handler", ModuleFormat::Esm)
    .with_timeout("5 seconds")
    .with_memory_size("128 MB")
    .with_env("API_URL", "https://x")
}

/// Synthesize one edge function and return the version's logical id.
fn synthesize_version_id(env: &TestEnv) -> String {
  let stack = env.stack("app");
  let edge = EdgeFunction::new(&stack, &site(), "Server", esm_props(env)).unwrap();
  stack.synthesize().unwrap();
  edge.version_resource().logical_id(&stack).unwrap()
}

mod wrapping {
  use super::*;

  #[test]
  fn esm_wrapper_imports_handler_module() {
    let env = TestEnv::esm();
    let stack = env.stack("app");
    EdgeFunction::new(&stack, &site(), "Server", esm_props(&env)).unwrap();

    let wrapper = env.read_bundle_file("index-wrapper.mjs");
    assert!(wrapper.contains("import * as index from \"./src/index.js\";"));
    assert!(wrapper.contains("\"{{ _EDGE_FUNCTION_ENVIRONMENT_ }}\""));
  }

  #[test]
  fn cjs_wrapper_requires_handler_module() {
    let env = TestEnv::cjs();
    let stack = env.stack("app");
    let props = EdgeFunctionProps::new(env.bundle_path(), "lib/main.run", ModuleFormat::Cjs);
    EdgeFunction::new(&stack, &site(), "Server", props).unwrap();

    let wrapper = env.read_bundle_file("index-wrapper.cjs");
    assert!(wrapper.contains("const index = require(\"./lib/main\");"));
    assert!(wrapper.contains("return await index.run(event);"));
  }

  #[test]
  fn ambiguous_handler_is_a_user_error() {
    let env = TestEnv::esm();
    env.write_bundle_file("src/index.mjs", "export const handler = async () => ({});");
    let stack = env.stack("app");

    let err = EdgeFunction::new(&stack, &site(), "Server", esm_props(&env)).unwrap_err();
    assert!(matches!(err, SynthError::Wrapper(WrapperError::AmbiguousHandler { .. })));
  }
}

mod template {
  use super::*;

  #[test]
  fn synthesized_template_resolves_references() {
    let env = TestEnv::esm();
    let stack = env.stack("app");
    let edge = EdgeFunction::new(&stack, &site(), "Server", esm_props(&env)).unwrap();
    stack.add_output("CurrentVersion", edge.current_version()).unwrap();
    let assembly = stack.synthesize().unwrap();

    let function_id = stack
      .resolve_logical_id(&edge.function_resource().path().to_string())
      .unwrap();
    let version_id = edge.version_resource().logical_id(&stack).unwrap();
    let role_id = stack.resolve_logical_id(&edge.role().path().to_string()).unwrap();

    let function = assembly.resource(&function_id).unwrap();
    assert_eq!(function["Type"], json!("Custom::EdgeLambda"));
    assert_eq!(function["Properties"]["ServiceToken"], json!({ "Fn::GetAtt": ["EdgeLambdaProvider", "Arn"] }));
    assert_eq!(function["Properties"]["FunctionBucket"], json!({ "Fn::GetAtt": ["EdgeLambdaBucket", "BucketName"] }));
    assert_eq!(function["Properties"]["FunctionParams"]["Role"], json!({ "Fn::GetAtt": [role_id, "Arn"] }));

    let version = assembly.resource(&version_id).unwrap();
    assert_eq!(version["Properties"]["FunctionArn"], json!({ "Fn::GetAtt": [function_id.clone(), "FunctionArn"] }));

    assert_eq!(
      assembly.template["Outputs"]["CurrentVersion"]["Value"],
      json!({ "Fn::Join": ["", [
        { "Fn::GetAtt": [function_id, "FunctionArn"] },
        ":",
        { "Fn::GetAtt": [version_id, "Version"] },
      ]] })
    );
  }

  #[test]
  fn assembly_is_written_to_disk() {
    let env = TestEnv::esm();
    let stack = env.stack("app");
    EdgeFunction::new(&stack, &site(), "Server", esm_props(&env)).unwrap();
    let assembly = stack.synthesize().unwrap();

    let out = TempDir::new().unwrap();
    assembly.write(out.path()).unwrap();
    let read = CloudAssembly::read(out.path(), "app").unwrap();

    assert_eq!(read, assembly);
    // Function bundle plus four provider code directories.
    assert_eq!(read.assets.len(), 5);
  }

  #[test]
  fn sibling_sites_share_one_set_of_helpers() {
    let first = TestEnv::esm();
    let second = TestEnv::esm();
    let stack = first.stack("app");

    let a_scope = ScopePath::root().child("SiteA").unwrap();
    let b_scope = ScopePath::root().child("SiteB").unwrap();
    EdgeFunction::new(&stack, &a_scope, "Server", esm_props(&first)).unwrap();
    EdgeFunction::new(&stack, &b_scope, "Server", esm_props(&second)).unwrap();
    let assembly = stack.synthesize().unwrap();

    assert_eq!(assembly.resources_of_type("Custom::EdgeLambdaBucket").count(), 1);
    assert_eq!(assembly.resources_of_type("AWS::Lambda::Function").count(), 4);
    assert_eq!(assembly.resources_of_type("Custom::EdgeLambda").count(), 2);
    assert_eq!(assembly.resources_of_type("Custom::EdgeLambdaVersion").count(), 2);
  }
}

mod versions {
  use super::*;

  #[test]
  fn premature_resolution_is_rejected() {
    let env = TestEnv::esm();
    let stack = env.stack("app");
    let edge = EdgeFunction::new(&stack, &site(), "Server", esm_props(&env)).unwrap();

    assert!(matches!(
      edge.version_resource().logical_id(&stack),
      Err(SynthError::PrematureResolution(_))
    ));
  }

  #[test]
  fn resynthesis_is_stable() {
    let env = TestEnv::esm();
    let stack = env.stack("app");
    EdgeFunction::new(&stack, &site(), "Server", esm_props(&env)).unwrap();

    let first = stack.synthesize().unwrap();
    let second = stack.synthesize().unwrap();
    assert_eq!(first.template, second.template);
  }

  #[test]
  fn unchanged_bundle_keeps_version() {
    let env = TestEnv::esm();
    assert_eq!(synthesize_version_id(&env), synthesize_version_id(&env));
  }

  #[test]
  fn bundle_change_publishes_new_version() {
    let env = TestEnv::esm();
    let before = synthesize_version_id(&env);

    env.write_bundle_file("src/index.js", "export const handler = async () => ({ status: \"204\" });\n");
    let after = synthesize_version_id(&env);

    assert_ne!(before, after);
    assert!(after.len() <= 255);
  }
}
