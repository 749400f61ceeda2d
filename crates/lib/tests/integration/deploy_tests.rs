//! Publishing and deploy-time replacement of synthesized assets.

use edgekit_lib::asset::extract_archive;
use edgekit_lib::construct::ScopePath;
use edgekit_lib::deploy::{AssetReplacerProps, LocalObjectStore, ObjectStore, publish_assets, run_asset_replacer};
use edgekit_lib::edge::{EdgeFunction, EdgeFunctionProps};
use edgekit_lib::wrapper::ModuleFormat;
use serde_json::Value;
use tempfile::TempDir;

use super::common::TestEnv;

fn props(env: &TestEnv) -> EdgeFunctionProps {
  EdgeFunctionProps::new(env.bundle_path(), "src/index.handler", ModuleFormat::Esm).with_env("API_URL", "https://x")
}

fn replacer_props(template: &Value) -> Vec<AssetReplacerProps> {
  template["Resources"]
    .as_object()
    .unwrap()
    .values()
    .filter(|body| body["Type"] == "Custom::AssetReplacer")
    .map(|body| serde_json::from_value(body["Properties"].clone()).unwrap())
    .collect()
}

#[tokio::test]
async fn environment_is_substituted_into_published_wrapper() {
  let env = TestEnv::esm();
  let stack = env.stack("app");
  EdgeFunction::new(&stack, &ScopePath::root(), "Server", props(&env)).unwrap();
  let assembly = stack.synthesize().unwrap();

  let store = LocalObjectStore::new(env.store.path());
  publish_assets(&assembly, &store).await.unwrap();

  let replacers = replacer_props(&assembly.template);
  assert_eq!(replacers.len(), 1);
  let report = run_asset_replacer(&store, &replacers[0]).await.unwrap();
  assert!(report.files_modified.contains(&"index-wrapper.mjs".to_string()));
  assert!(report.files_modified.contains(&"src/index.js".to_string()));

  let deployed = TempDir::new().unwrap();
  let bytes = store.get(&replacers[0].bucket, &replacers[0].output_key).await.unwrap();
  extract_archive(&bytes, deployed.path()).unwrap();

  let wrapper = std::fs::read_to_string(deployed.path().join("index-wrapper.mjs")).unwrap();
  assert!(wrapper.contains("import * as index from \"./src/index.js\";"));
  assert!(wrapper.contains("const environment = {\"API_URL\":\"https://x\"};"));
  assert!(!wrapper.contains("_EDGE_FUNCTION_ENVIRONMENT_"));

  let handler = std::fs::read_to_string(deployed.path().join("src/index.js")).unwrap();
  assert!(handler.contains("api: \"https://x\""));

  // The source bundle and the published asset keep their placeholders.
  assert!(env.read_bundle_file("index-wrapper.mjs").contains("_EDGE_FUNCTION_ENVIRONMENT_"));
  assert!(env.read_bundle_file("src/index.js").contains("{{ API_URL }}"));
  let published = TempDir::new().unwrap();
  let bytes = store.get(&replacers[0].bucket, &replacers[0].key).await.unwrap();
  extract_archive(&bytes, published.path()).unwrap();
  let wrapper = std::fs::read_to_string(published.path().join("index-wrapper.mjs")).unwrap();
  assert!(wrapper.contains("_EDGE_FUNCTION_ENVIRONMENT_"));
}

/// Deploy every replacer in the template and return the deployed wrapper of
/// each function, keyed by the function's code key.
async fn deployed_wrappers(store: &LocalObjectStore, template: &Value) -> Vec<(String, String)> {
  let mut wrappers = Vec::new();
  for replacer in replacer_props(template) {
    run_asset_replacer(store, &replacer).await.unwrap();
    let deployed = TempDir::new().unwrap();
    let bytes = store.get(&replacer.bucket, &replacer.output_key).await.unwrap();
    extract_archive(&bytes, deployed.path()).unwrap();
    let wrapper = std::fs::read_to_string(deployed.path().join("index-wrapper.mjs")).unwrap();
    wrappers.push((replacer.output_key, wrapper));
  }
  wrappers
}

fn code_keys(template: &Value) -> Vec<String> {
  template["Resources"]
    .as_object()
    .unwrap()
    .values()
    .filter(|body| body["Type"] == "Custom::EdgeLambda")
    .map(|body| body["Properties"]["FunctionParams"]["Code"]["S3Key"].as_str().unwrap().to_string())
    .collect()
}

#[tokio::test]
async fn functions_sharing_a_bundle_keep_their_own_environment() {
  let first = TestEnv::esm();
  let second = TestEnv::esm();
  let stack = first.stack("app");

  let a = EdgeFunctionProps::new(first.bundle_path(), "src/index.handler", ModuleFormat::Esm)
    .with_env("API_URL", "https://a");
  let b = EdgeFunctionProps::new(second.bundle_path(), "src/index.handler", ModuleFormat::Esm)
    .with_env("API_URL", "https://b");
  let a = EdgeFunction::new(&stack, &ScopePath::root(), "A", a).unwrap();
  let b = EdgeFunction::new(&stack, &ScopePath::root(), "B", b).unwrap();
  assert_eq!(a.asset().object_key(), b.asset().object_key());

  let assembly = stack.synthesize().unwrap();
  let store = LocalObjectStore::new(first.store.path());
  publish_assets(&assembly, &store).await.unwrap();

  let wrappers = deployed_wrappers(&store, &assembly.template).await;
  assert_eq!(wrappers.len(), 2);
  let keys = code_keys(&assembly.template);
  for url in ["https://a", "https://b"] {
    let expected = format!("const environment = {{\"API_URL\":\"{url}\"}};");
    let (key, _) = wrappers.iter().find(|(_, wrapper)| wrapper.contains(&expected)).unwrap();
    assert!(keys.contains(key));
  }
}

#[tokio::test]
async fn redeploy_with_new_environment_delivers_new_values() {
  let env = TestEnv::esm();
  let store = LocalObjectStore::new(env.store.path());

  for url in ["https://old", "https://new"] {
    let stack = env.stack("app");
    let props =
      EdgeFunctionProps::new(env.bundle_path(), "src/index.handler", ModuleFormat::Esm).with_env("API_URL", url);
    EdgeFunction::new(&stack, &ScopePath::root(), "Server", props).unwrap();
    let assembly = stack.synthesize().unwrap();
    publish_assets(&assembly, &store).await.unwrap();

    let wrappers = deployed_wrappers(&store, &assembly.template).await;
    assert_eq!(code_keys(&assembly.template), vec![wrappers[0].0.clone()]);
    assert!(wrappers[0].1.contains(url));
  }
}

#[tokio::test]
async fn republishing_uploads_nothing() {
  let env = TestEnv::esm();
  let stack = env.stack("app");
  EdgeFunction::new(&stack, &ScopePath::root(), "Server", props(&env)).unwrap();
  let assembly = stack.synthesize().unwrap();
  let store = LocalObjectStore::new(env.store.path());

  let first = publish_assets(&assembly, &store).await.unwrap();
  let second = publish_assets(&assembly, &store).await.unwrap();

  assert!(!first.uploaded.is_empty());
  assert!(second.uploaded.is_empty());
  assert_eq!(second.skipped.len(), assembly.assets.len());
}

#[tokio::test]
async fn identical_bundles_share_one_object() {
  let first = TestEnv::esm();
  let second = TestEnv::esm();
  let stack = first.stack("app");

  let a = EdgeFunction::new(&stack, &ScopePath::root(), "A", props(&first)).unwrap();
  let b = EdgeFunction::new(&stack, &ScopePath::root(), "B", props(&second)).unwrap();
  assert_eq!(a.asset().object_key(), b.asset().object_key());

  let assembly = stack.synthesize().unwrap();
  let store = LocalObjectStore::new(first.store.path());
  let report = publish_assets(&assembly, &store).await.unwrap();

  let function_key = format!("integration-assets/{}", a.asset().object_key());
  assert_eq!(report.uploaded.iter().filter(|k| **k == function_key).count(), 1);
  assert_eq!(report.skipped.iter().filter(|k| **k == function_key).count(), 1);
}
