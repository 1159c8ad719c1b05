//! Remote comment transport for GitHub and GitLab.
//!
//! [`VcsClient`] is the capability every other component talks to; one
//! instance is built at startup by [`build_client`] and shared behind an
//! `Arc`. Each provider maps its own comment/note API onto the same four
//! operations (create, edit, list a page, delete) plus identity and
//! pipeline lookups.

pub mod dry_run;
pub mod github;
pub mod gitlab;
mod http;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::VcsConfig;
use crate::models::comment::{ChangeRequestId, CommentId, CommentPage};
use crate::models::VcsKind;

pub use dry_run::DryRunClient;
pub use github::GithubClient;
pub use gitlab::GitlabClient;

/// Errors from VCS API calls.
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("no API token configured (set {0})")]
    MissingToken(&'static str),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited,

    #[error("server error: HTTP {0}")]
    Server(u16),

    #[error("request failed with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl VcsError {
    /// Map an unsuccessful HTTP status to an error.
    pub fn from_status(status: u16, url: &str, body: String) -> Self {
        match status {
            401 => VcsError::Unauthorized,
            403 => VcsError::Forbidden,
            404 => VcsError::NotFound(url.to_string()),
            429 => VcsError::RateLimited,
            500..=599 => VcsError::Server(status),
            _ => VcsError::HttpStatus { status, body },
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VcsError::RateLimited | VcsError::Server(_) | VcsError::Network(_)
        )
    }
}

impl From<reqwest::Error> for VcsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            VcsError::Decode(err.to_string())
        } else {
            VcsError::Network(err.to_string())
        }
    }
}

/// Comment operations on a pull/merge request.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Which provider this client talks to.
    fn kind(&self) -> VcsKind;

    /// Login of the account the token belongs to; comments by this user
    /// are the ones the tool owns.
    async fn username(&self) -> Result<String, VcsError>;

    async fn create_comment(
        &self,
        id: &ChangeRequestId,
        body: &str,
    ) -> Result<CommentId, VcsError>;

    /// Replace a comment's body. Returns the id the provider reports for
    /// the edited comment.
    async fn edit_comment(
        &self,
        id: &ChangeRequestId,
        comment: CommentId,
        body: &str,
    ) -> Result<CommentId, VcsError>;

    /// One page (1-based) of comments, oldest first.
    async fn list_comments(
        &self,
        id: &ChangeRequestId,
        page: u32,
    ) -> Result<CommentPage, VcsError>;

    async fn delete_comment(&self, id: &ChangeRequestId, comment: CommentId)
        -> Result<(), VcsError>;

    /// Web URL of the latest pipeline for the change request, if the
    /// provider has one yet.
    async fn pipeline_url(&self, _id: &ChangeRequestId) -> Result<Option<String>, VcsError> {
        Ok(None)
    }
}

/// Build the client selected by configuration.
///
/// With `dry_run` no network calls are made; comments are kept in memory.
pub fn build_client(config: &VcsConfig, dry_run: bool) -> Result<Arc<dyn VcsClient>, VcsError> {
    if dry_run {
        return Ok(Arc::new(DryRunClient::new(config.provider)));
    }

    let token = config
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or(VcsError::MissingToken(config.provider.token_env_var()))?;
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.provider.default_base_url().to_string());

    let client: Arc<dyn VcsClient> = match config.provider {
        VcsKind::Github => Arc::new(GithubClient::new(base_url, token, config.username.clone())?),
        VcsKind::Gitlab => Arc::new(GitlabClient::new(base_url, token, config.username.clone())?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(VcsError::from_status(401, "u", String::new()), VcsError::Unauthorized));
        assert!(matches!(VcsError::from_status(404, "u", String::new()), VcsError::NotFound(_)));
        assert!(matches!(VcsError::from_status(503, "u", String::new()), VcsError::Server(503)));
        assert!(matches!(
            VcsError::from_status(422, "u", "bad".into()),
            VcsError::HttpStatus { status: 422, .. }
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(VcsError::RateLimited.is_transient());
        assert!(VcsError::Server(502).is_transient());
        assert!(VcsError::Network("reset".into()).is_transient());
        assert!(!VcsError::Unauthorized.is_transient());
        assert!(!VcsError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn build_client_requires_token() {
        let config = VcsConfig::default();
        let err = build_client(&config, false).err().unwrap();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn build_client_dry_run_needs_no_token() {
        let config = VcsConfig {
            provider: VcsKind::Gitlab,
            ..VcsConfig::default()
        };
        let client = build_client(&config, true).unwrap();
        assert_eq!(client.kind(), VcsKind::Gitlab);
    }
}
