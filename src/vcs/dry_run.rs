//! In-memory client used by `--dry-run`.
//!
//! Behaves like a provider with an empty conversation: comments are
//! stored, edited, paged and deleted locally and every call is logged.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{VcsClient, VcsError};
use crate::models::comment::{ChangeRequestId, CommentId, CommentPage, RemoteComment};
use crate::models::VcsKind;

const DEFAULT_PAGE_SIZE: usize = 100;
const DRY_RUN_USER: &str = "kubereport-dry-run";

#[derive(Default)]
struct State {
    next_id: u64,
    comments: Vec<RemoteComment>,
}

/// Comment store that never leaves the process.
pub struct DryRunClient {
    kind: VcsKind,
    username: String,
    page_size: usize,
    state: Mutex<State>,
}

impl DryRunClient {
    pub fn new(kind: VcsKind) -> Self {
        Self {
            kind,
            username: DRY_RUN_USER.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(State {
                next_id: 1,
                comments: Vec::new(),
            }),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pre-populate the conversation with existing comments.
    pub fn with_comments(self, comments: Vec<RemoteComment>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.next_id = comments.iter().map(|c| c.id.0 + 1).max().unwrap_or(1);
            state.comments = comments;
        }
        self
    }

    /// Current comments, oldest first.
    pub fn comments(&self) -> Vec<RemoteComment> {
        self.state
            .lock()
            .map(|s| s.comments.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, VcsError> {
        self.state
            .lock()
            .map_err(|_| VcsError::Network("dry-run comment store poisoned".into()))
    }
}

#[async_trait]
impl VcsClient for DryRunClient {
    fn kind(&self) -> VcsKind {
        self.kind
    }

    async fn username(&self) -> Result<String, VcsError> {
        Ok(self.username.clone())
    }

    async fn create_comment(
        &self,
        id: &ChangeRequestId,
        body: &str,
    ) -> Result<CommentId, VcsError> {
        let mut state = self.lock()?;
        let comment_id = CommentId(state.next_id);
        state.next_id += 1;
        state.comments.push(RemoteComment {
            id: comment_id,
            author: self.username.clone(),
            body: body.to_string(),
            created_at: Some(Utc::now()),
        });
        tracing::info!(change_request = %id, comment = %comment_id, bytes = body.len(), "dry-run: create comment");
        Ok(comment_id)
    }

    async fn edit_comment(
        &self,
        id: &ChangeRequestId,
        comment: CommentId,
        body: &str,
    ) -> Result<CommentId, VcsError> {
        let mut state = self.lock()?;
        let existing = state
            .comments
            .iter_mut()
            .find(|c| c.id == comment)
            .ok_or_else(|| VcsError::NotFound(format!("comment {comment}")))?;
        existing.body = body.to_string();
        tracing::info!(change_request = %id, %comment, bytes = body.len(), "dry-run: edit comment");
        Ok(comment)
    }

    async fn list_comments(
        &self,
        _id: &ChangeRequestId,
        page: u32,
    ) -> Result<CommentPage, VcsError> {
        let state = self.lock()?;
        let start = (page.max(1) as usize - 1) * self.page_size;
        let comments: Vec<RemoteComment> = state
            .comments
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        Ok(CommentPage {
            comments,
            has_next_page: start + self.page_size < state.comments.len(),
        })
    }

    async fn delete_comment(
        &self,
        id: &ChangeRequestId,
        comment: CommentId,
    ) -> Result<(), VcsError> {
        let mut state = self.lock()?;
        let before = state.comments.len();
        state.comments.retain(|c| c.id != comment);
        if state.comments.len() == before {
            return Err(VcsError::NotFound(format!("comment {comment}")));
        }
        tracing::info!(change_request = %id, %comment, "dry-run: delete comment");
        Ok(())
    }
}
