//! edgekit-lib: edge function constructs for declarative cloud templates
//!
//! This crate synthesizes the resources behind an edge function:
//! - `EdgeFunction`: wraps a bundle, addresses it as an asset and declares the
//!   function, its version and the shared helper resources
//! - `Stack`: the deployment scope with its resource and singleton registries
//! - `CloudAssembly`: the synthesized template plus the assets to upload
//! - `deploy`: asset publishing and deploy-time placeholder replacement

pub mod assembly;
pub mod asset;
pub mod config;
pub mod consts;
pub mod construct;
pub mod deploy;
pub mod edge;
pub mod error;
pub mod iam;
pub mod identity;
pub mod lambda;
pub mod replace;
pub mod token;
pub mod units;
pub mod util;
pub mod wrapper;
