//! Configuration loading and layering.
//!
//! Handles `.kubereport.toml` loading, environment variable resolution,
//! and CLI flag merging with proper priority ordering.

pub mod loader;

pub use loader::{CommentsConfig, Config, ConfigError, DiffConfig, RunConfig, VcsConfig};
