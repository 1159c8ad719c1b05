//! kubereport — Kubernetes manifest diff reports for pull/merge requests
//! (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod comments;
pub mod config;
pub mod constants;
pub mod diff;
pub mod env;
pub mod manifests;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod vcs;
