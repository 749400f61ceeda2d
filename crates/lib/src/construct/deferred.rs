//! Values computed once, on first demand, after the stack is sealed.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use tracing::debug;

use crate::error::SynthError;
use crate::token::Resolver;

/// Shared flag flipped when a stack starts synthesizing.
#[derive(Debug, Clone, Default)]
pub struct SealGate(Rc<Cell<bool>>);

impl SealGate {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn seal(&self) {
    self.0.set(true);
  }

  pub fn is_sealed(&self) -> bool {
    self.0.get()
  }
}

type Producer<T> = Box<dyn Fn(&dyn Resolver) -> Result<T, SynthError>>;

/// A memoized value with a single producer.
///
/// The producer runs at most once, and only after the owning stack is sealed;
/// asking earlier fails with [`SynthError::PrematureResolution`] instead of
/// caching a value computed from an incomplete plan.
pub struct Deferred<T> {
  label: String,
  gate: SealGate,
  cell: OnceCell<T>,
  evaluating: Cell<bool>,
  produce: Producer<T>,
}

impl<T> Deferred<T> {
  pub fn new(
    label: impl Into<String>,
    gate: SealGate,
    produce: impl Fn(&dyn Resolver) -> Result<T, SynthError> + 'static,
  ) -> Self {
    Self {
      label: label.into(),
      gate,
      cell: OnceCell::new(),
      evaluating: Cell::new(false),
      produce: Box::new(produce),
    }
  }

  pub fn is_resolved(&self) -> bool {
    self.cell.get().is_some()
  }

  pub fn get(&self, resolver: &dyn Resolver) -> Result<&T, SynthError> {
    if let Some(value) = self.cell.get() {
      return Ok(value);
    }
    if !self.gate.is_sealed() {
      return Err(SynthError::PrematureResolution(self.label.clone()));
    }
    if self.evaluating.replace(true) {
      return Err(SynthError::DeferredCycle(self.label.clone()));
    }

    debug!(label = %self.label, "evaluating deferred value");
    let produced = (self.produce)(resolver);
    self.evaluating.set(false);
    let value = produced?;

    Ok(self.cell.get_or_init(|| value))
  }
}

impl<T> std::fmt::Debug for Deferred<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Deferred")
      .field("label", &self.label)
      .field("resolved", &self.is_resolved())
      .finish()
  }
}
