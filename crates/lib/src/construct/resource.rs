//! A single resource declaration in the deployment plan.

use std::cell::RefCell;

use serde_json::{Map, Value, json};

use crate::error::SynthError;
use crate::token::{Resolver, att_token, ref_token, resolve_value};

use super::deferred::{Deferred, SealGate};
use super::scope::ScopePath;

enum LogicalIdSource {
  Derived(String),
  Deferred(Deferred<String>),
}

/// The rendered configuration of one to-be-deployed resource.
///
/// Properties may carry tokens referring to other resources; they are only
/// resolved when the resource is rendered during synthesis. Every mutator
/// fails once the owning stack is sealed.
pub struct Resource {
  path: ScopePath,
  resource_type: String,
  properties: RefCell<Map<String, Value>>,
  depends_on: RefCell<Vec<ScopePath>>,
  logical_id: RefCell<LogicalIdSource>,
  gate: SealGate,
}

impl Resource {
  pub(crate) fn new(path: ScopePath, resource_type: &str, properties: Map<String, Value>, gate: SealGate) -> Self {
    Self {
      logical_id: RefCell::new(LogicalIdSource::Derived(path.logical_id())),
      path,
      resource_type: resource_type.to_string(),
      properties: RefCell::new(properties),
      depends_on: RefCell::new(Vec::new()),
      gate,
    }
  }

  pub fn path(&self) -> &ScopePath {
    &self.path
  }

  pub fn resource_type(&self) -> &str {
    &self.resource_type
  }

  /// Token referring to this resource (renders as `Ref`).
  pub fn ref_token(&self) -> String {
    ref_token(&self.path.to_string())
  }

  /// Token for a runtime attribute (renders as `Fn::GetAtt`).
  pub fn att(&self, attribute: &str) -> String {
    att_token(&self.path.to_string(), attribute)
  }

  /// The logical id derived from the construct path, ignoring any override.
  pub fn base_logical_id(&self) -> String {
    self.path.logical_id()
  }

  pub fn property(&self, key: &str) -> Option<Value> {
    self.properties.borrow().get(key).cloned()
  }

  pub fn properties(&self) -> Map<String, Value> {
    self.properties.borrow().clone()
  }

  pub fn dependencies(&self) -> Vec<ScopePath> {
    self.depends_on.borrow().clone()
  }

  fn ensure_open(&self) -> Result<(), SynthError> {
    if self.gate.is_sealed() {
      return Err(SynthError::Sealed(self.path.to_string()));
    }
    Ok(())
  }

  pub fn set_property(&self, key: &str, value: Value) -> Result<(), SynthError> {
    self.ensure_open()?;
    self.properties.borrow_mut().insert(key.to_string(), value);
    Ok(())
  }

  /// Declare that this resource must be created after `other`.
  pub fn add_dependency(&self, other: &Resource) -> Result<(), SynthError> {
    self.ensure_open()?;
    let mut deps = self.depends_on.borrow_mut();
    if !deps.contains(&other.path) {
      deps.push(other.path.clone());
    }
    Ok(())
  }

  /// Replace the path-derived logical id with one produced at synthesis.
  pub fn override_logical_id(
    &self,
    produce: impl Fn(&dyn Resolver) -> Result<String, SynthError> + 'static,
  ) -> Result<(), SynthError> {
    self.ensure_open()?;
    let deferred = Deferred::new(self.path.to_string(), self.gate.clone(), produce);
    *self.logical_id.borrow_mut() = LogicalIdSource::Deferred(deferred);
    Ok(())
  }

  pub fn logical_id(&self, resolver: &dyn Resolver) -> Result<String, SynthError> {
    match &*self.logical_id.borrow() {
      LogicalIdSource::Derived(id) => Ok(id.clone()),
      LogicalIdSource::Deferred(deferred) => deferred.get(resolver).cloned(),
    }
  }

  /// Render the body of this resource: type, resolved properties and
  /// dependencies.
  pub fn render_body(&self, resolver: &dyn Resolver) -> Result<Value, SynthError> {
    let mut body = Map::new();
    body.insert("Type".to_string(), json!(self.resource_type));

    let properties = resolve_value(&Value::Object(self.properties()), resolver)?;
    body.insert("Properties".to_string(), properties);

    let deps = self.dependencies();
    if !deps.is_empty() {
      let mut ids = deps
        .iter()
        .map(|p| resolver.resolve_logical_id(&p.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
      ids.sort();
      body.insert("DependsOn".to_string(), json!(ids));
    }

    Ok(Value::Object(body))
  }

  /// Render this resource on its own, in template shape:
  /// `{"Resources": {<logical id>: <body>}}`.
  pub fn render(&self, resolver: &dyn Resolver) -> Result<Value, SynthError> {
    let mut resources = Map::new();
    resources.insert(self.logical_id(resolver)?, self.render_body(resolver)?);
    Ok(json!({ "Resources": resources }))
  }
}

impl std::fmt::Debug for Resource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Resource")
      .field("path", &self.path.to_string())
      .field("type", &self.resource_type)
      .finish()
  }
}
