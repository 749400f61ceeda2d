//! The deployment scope: owns every resource, asset and singleton.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::assembly::CloudAssembly;
use crate::asset::Asset;
use crate::config::SynthConfig;
use crate::error::SynthError;
use crate::token::{Resolver, pseudo, resolve_str};

use super::deferred::SealGate;
use super::resource::Resource;
use super::scope::{ScopePath, validate_id};

/// Identifies a shared helper: the scope it lives in plus its fixed id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SingletonKey {
  pub scope: ScopePath,
  pub id: String,
}

impl SingletonKey {
  /// A helper shared by the whole stack.
  pub fn stack(id: &str) -> Self {
    Self {
      scope: ScopePath::root(),
      id: id.to_string(),
    }
  }
}

impl fmt::Display for SingletonKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.scope.is_root() {
      write!(f, "{}", self.id)
    } else {
      write!(f, "{}/{}", self.scope, self.id)
    }
  }
}

/// One deployment scope.
///
/// Synthesis is single-threaded: constructs borrow the stack and declare
/// resources into it. [`Stack::synthesize`] seals the stack, after which
/// deferred values may be evaluated and nothing may be added.
pub struct Stack {
  name: String,
  config: SynthConfig,
  gate: SealGate,
  resources: RefCell<Vec<Rc<Resource>>>,
  by_path: RefCell<HashMap<String, Rc<Resource>>>,
  singletons: RefCell<HashMap<SingletonKey, Rc<dyn Any>>>,
  assets: RefCell<Vec<Rc<Asset>>>,
  outputs: RefCell<Vec<(String, String)>>,
}

impl Stack {
  pub fn new(name: &str, config: SynthConfig) -> Result<Self, SynthError> {
    validate_id(name)?;
    Ok(Self {
      name: name.to_string(),
      config,
      gate: SealGate::new(),
      resources: RefCell::new(Vec::new()),
      by_path: RefCell::new(HashMap::new()),
      singletons: RefCell::new(HashMap::new()),
      assets: RefCell::new(Vec::new()),
      outputs: RefCell::new(Vec::new()),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn config(&self) -> &SynthConfig {
    &self.config
  }

  pub fn is_sealed(&self) -> bool {
    self.gate.is_sealed()
  }

  /// Partition for ARNs: the configured literal, or the pseudo parameter.
  pub fn partition(&self) -> String {
    self.config.partition.clone().unwrap_or_else(|| pseudo("Partition"))
  }

  pub(crate) fn ensure_open(&self, what: &str) -> Result<(), SynthError> {
    if self.gate.is_sealed() {
      return Err(SynthError::Sealed(what.to_string()));
    }
    Ok(())
  }

  /// Declare a resource at `path`.
  pub fn add_resource(
    &self,
    path: ScopePath,
    resource_type: &str,
    properties: Map<String, Value>,
  ) -> Result<Rc<Resource>, SynthError> {
    let key = path.to_string();
    self.ensure_open(&key)?;
    if path.is_root() {
      return Err(SynthError::InvalidId {
        id: key,
        reason: "a resource needs a non-root path".to_string(),
      });
    }
    if self.by_path.borrow().contains_key(&key) {
      return Err(SynthError::DuplicateConstruct(key));
    }

    debug!(stack = %self.name, path = %key, resource_type = %resource_type, "declaring resource");
    let resource = Rc::new(Resource::new(path, resource_type, properties, self.gate.clone()));
    self.by_path.borrow_mut().insert(key, Rc::clone(&resource));
    self.resources.borrow_mut().push(Rc::clone(&resource));
    Ok(resource)
  }

  pub fn resources(&self) -> Vec<Rc<Resource>> {
    self.resources.borrow().clone()
  }

  /// Look up a shared helper, creating it with `build` on first use.
  ///
  /// Later callers observe the first caller's instance (`Rc::ptr_eq`). The
  /// registry is not borrowed while `build` runs, so a helper may itself
  /// declare resources or depend on other singletons.
  pub fn get_or_create<T: 'static>(
    &self,
    key: SingletonKey,
    build: impl FnOnce() -> Result<T, SynthError>,
  ) -> Result<Rc<T>, SynthError> {
    let existing = self.singletons.borrow().get(&key).cloned();
    if let Some(existing) = existing {
      debug!(stack = %self.name, singleton = %key, "reusing singleton");
      return existing
        .downcast::<T>()
        .map_err(|_| SynthError::SingletonTypeMismatch(key.to_string()));
    }

    self.ensure_open(&key.to_string())?;
    info!(stack = %self.name, singleton = %key, "creating singleton");
    let created = Rc::new(build()?);

    let mut singletons = self.singletons.borrow_mut();
    if singletons.contains_key(&key) {
      return Err(SynthError::DuplicateConstruct(key.to_string()));
    }
    let erased: Rc<dyn Any> = created.clone();
    singletons.insert(key, erased);
    Ok(created)
  }

  pub(crate) fn register_asset(&self, asset: Rc<Asset>) -> Result<(), SynthError> {
    self.ensure_open(&asset.path().to_string())?;
    self.assets.borrow_mut().push(asset);
    Ok(())
  }

  pub fn assets(&self) -> Vec<Rc<Asset>> {
    self.assets.borrow().clone()
  }

  /// Export a value (which may contain tokens) as a stack output.
  pub fn add_output(&self, id: &str, value: impl Into<String>) -> Result<(), SynthError> {
    validate_id(id)?;
    self.ensure_open(id)?;
    let mut outputs = self.outputs.borrow_mut();
    if outputs.iter().any(|(existing, _)| existing == id) {
      return Err(SynthError::DuplicateConstruct(format!("Outputs/{id}")));
    }
    outputs.push((id.to_string(), value.into()));
    Ok(())
  }

  /// Seal the stack and render the finished plan.
  ///
  /// Deferred logical ids are evaluated here for the first time and cached,
  /// so repeated calls produce identical output.
  pub fn synthesize(&self) -> Result<CloudAssembly, SynthError> {
    self.gate.seal();

    let resources = self.resources.borrow();
    info!(stack = %self.name, resources = resources.len(), "synthesizing stack");

    let mut rendered = Map::new();
    for resource in resources.iter() {
      let logical_id = resource.logical_id(self)?;
      if rendered.contains_key(&logical_id) {
        return Err(SynthError::DuplicateLogicalId(logical_id));
      }
      rendered.insert(logical_id, resource.render_body(self)?);
    }

    let mut template = Map::new();
    template.insert("Resources".to_string(), Value::Object(rendered));

    let outputs = self.outputs.borrow();
    if !outputs.is_empty() {
      let mut rendered_outputs = Map::new();
      for (id, value) in outputs.iter() {
        rendered_outputs.insert(id.clone(), json!({ "Value": resolve_str(value, self)? }));
      }
      template.insert("Outputs".to_string(), Value::Object(rendered_outputs));
    }

    let assets = self.assets.borrow().iter().map(|a| a.source()).collect();

    Ok(CloudAssembly {
      stack_name: self.name.clone(),
      template: Value::Object(template),
      assets,
    })
  }
}

impl Resolver for Stack {
  fn resolve_logical_id(&self, path: &str) -> Result<String, SynthError> {
    let resource = self
      .by_path
      .borrow()
      .get(path)
      .cloned()
      .ok_or_else(|| SynthError::UnknownConstruct(path.to_string()))?;
    resource.logical_id(self)
  }
}

impl fmt::Debug for Stack {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stack")
      .field("name", &self.name)
      .field("sealed", &self.is_sealed())
      .field("resources", &self.resources.borrow().len())
      .finish()
  }
}
