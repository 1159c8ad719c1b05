//! Remote comment identity and pagination types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies the change request a report is attached to.
///
/// `repo` is `owner/name` on GitHub and the project path (or numeric id)
/// on GitLab; `number` is the pull request number or merge request iid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRequestId {
    pub repo: String,
    pub number: u64,
}

impl ChangeRequestId {
    pub fn new(repo: impl Into<String>, number: u64) -> Self {
        Self {
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for ChangeRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// Provider-assigned id of a comment (GitHub issue comment) or note
/// (GitLab merge request note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub u64);

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A comment as read back from the VCS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteComment {
    pub id: CommentId,
    pub author: String,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of a comment listing.
#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    pub comments: Vec<RemoteComment>,
    pub has_next_page: bool,
}
