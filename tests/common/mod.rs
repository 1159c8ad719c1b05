//! Shared test doubles.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;

use kubereport::models::{ChangeRequestId, CommentId, CommentPage, RemoteComment, VcsKind};
use kubereport::vcs::{VcsClient, VcsError};

/// A VCS call as seen by [`RecordingVcs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create,
    Edit(CommentId),
    List(u32),
    Delete(CommentId),
}

#[derive(Default)]
struct State {
    next_id: u64,
    comments: Vec<RemoteComment>,
    calls: Vec<Call>,
}

/// In-memory VCS that records every call and pages its listing.
pub struct RecordingVcs {
    username: String,
    page_size: usize,
    state: Mutex<State>,
}

impl RecordingVcs {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.into(),
            page_size: 2,
            state: Mutex::new(State {
                next_id: 100,
                ..State::default()
            }),
        }
    }

    /// Add a comment as if someone else (or an earlier run) wrote it.
    pub fn seed(&self, author: &str, body: &str) -> CommentId {
        let mut state = self.state.lock().unwrap();
        let id = CommentId(state.next_id);
        state.next_id += 1;
        state.comments.push(RemoteComment {
            id,
            author: author.into(),
            body: body.into(),
            created_at: None,
        });
        id
    }

    pub fn comments(&self) -> Vec<RemoteComment> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn comments_by(&self, author: &str) -> Vec<RemoteComment> {
        self.comments()
            .into_iter()
            .filter(|c| c.author == author)
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl VcsClient for RecordingVcs {
    fn kind(&self) -> VcsKind {
        VcsKind::Github
    }

    async fn username(&self) -> Result<String, VcsError> {
        Ok(self.username.clone())
    }

    async fn create_comment(
        &self,
        _id: &ChangeRequestId,
        body: &str,
    ) -> Result<CommentId, VcsError> {
        self.state.lock().unwrap().calls.push(Call::Create);
        Ok(self.seed(&self.username, body))
    }

    async fn edit_comment(
        &self,
        _id: &ChangeRequestId,
        comment: CommentId,
        body: &str,
    ) -> Result<CommentId, VcsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Edit(comment));
        let existing = state
            .comments
            .iter_mut()
            .find(|c| c.id == comment)
            .ok_or_else(|| VcsError::NotFound(comment.to_string()))?;
        existing.body = body.into();
        Ok(comment)
    }

    async fn list_comments(
        &self,
        _id: &ChangeRequestId,
        page: u32,
    ) -> Result<CommentPage, VcsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List(page));
        let start = (page as usize - 1) * self.page_size;
        Ok(CommentPage {
            comments: state
                .comments
                .iter()
                .skip(start)
                .take(self.page_size)
                .cloned()
                .collect(),
            has_next_page: start + self.page_size < state.comments.len(),
        })
    }

    async fn delete_comment(
        &self,
        _id: &ChangeRequestId,
        comment: CommentId,
    ) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(comment));
        state.comments.retain(|c| c.id != comment);
        Ok(())
    }
}
