//! The construct tree: a stack of resources addressed by construct path.
//!
//! - [`Stack`]: the deployment scope, its resource registry and singleton registry
//! - [`Resource`]: one declared resource with token-bearing properties
//! - [`ScopePath`]: construct paths and the logical ids derived from them
//! - [`Deferred`]: evaluate-once values gated on the stack being sealed

mod deferred;
mod resource;
mod scope;
mod stack;

pub use deferred::{Deferred, SealGate};
pub use resource::Resource;
pub use scope::{ScopePath, validate_id};
pub use stack::{SingletonKey, Stack};
