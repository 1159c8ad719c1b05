//! Shared types used across all modules.
//!
//! This module defines the core data structures for resources, diff
//! results, and remote comments. Other modules import from here rather
//! than reaching into each other's internals.

pub mod comment;
pub mod report;
pub mod resource;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use comment::{ChangeRequestId, CommentId, CommentPage, RemoteComment};
pub use report::{DiffPolicy, DiffVerdict, ReportCounts, TrackingMethod};
pub use resource::{Document, ManagedResourceTriple, ResourceKey};

/// Supported VCS backends for publishing the report.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum VcsKind {
    #[default]
    Github,
    Gitlab,
}

impl VcsKind {
    /// Provider-specific environment variable holding an API token.
    pub fn token_env_var(self) -> &'static str {
        match self {
            VcsKind::Github => "GITHUB_TOKEN",
            VcsKind::Gitlab => "GITLAB_TOKEN",
        }
    }

    /// Public API root used when no base URL is configured.
    pub fn default_base_url(self) -> &'static str {
        match self {
            VcsKind::Github => "https://api.github.com",
            VcsKind::Gitlab => "https://gitlab.com/api/v4",
        }
    }
}

/// What to do with report comments left behind by earlier runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TidyMode {
    /// Remove the comment entirely.
    Delete,
    /// Collapse the comment into an "OUTDATED" block.
    #[default]
    Hide,
}
