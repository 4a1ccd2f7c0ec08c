//! Core library for the relay bridge client — shared identifiers, per-project
//! configuration, and the operator-facing [`config::Config`].
//!
//! This crate sits at the bottom of the dependency graph: `relay-protocol`,
//! `relay-bridge`, and `relay-spawner` all depend on it, but it depends on
//! nothing in this workspace.

pub mod config;
pub mod types;

pub use config::Config;
pub use types::{CliKind, ProjectConfig};
