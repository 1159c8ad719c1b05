//! Lifecycle of the report comment on a change request.
//!
//! Each run tidies the comments earlier runs left behind, creates one
//! fresh comment and hands back the [`Message`] that keeps it updated.
//! Tidying either deletes old comments or collapses them into an
//! `OUTDATED` block; collapsing is idempotent.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::OnceCell;

use crate::constants::OUTDATED_MARKER;
use crate::models::comment::{ChangeRequestId, RemoteComment};
use crate::models::TidyMode;
use crate::report::{build_comment, Message, ReportError, ReportLayout, REPORT_TITLE};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::vcs::{VcsClient, VcsError};

/// Stop paging after this many pages even if the provider keeps
/// advertising more.
const MAX_PAGES: u32 = 1000;

/// Errors from comment lifecycle operations.
#[derive(Error, Debug)]
pub enum CommentError {
    #[error("failed to resolve the VCS identity: {0}")]
    Identity(#[source] VcsError),

    #[error("failed to list comments (page {page}): {source}")]
    List { page: u32, source: VcsError },

    #[error("failed to create the report comment: {0}")]
    Create(#[source] VcsError),

    #[error(transparent)]
    Update(#[from] ReportError),
}

/// Counts from one tidy pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TidyOutcome {
    /// Reports this reporter posted earlier.
    pub owned: usize,
    /// Comments deleted or hidden in this pass.
    pub tidied: usize,
    /// Comments already hidden by an earlier pass.
    pub skipped: usize,
    /// Comments whose delete or hide call failed.
    pub failed: usize,
}

/// Manages the report comment for one change request.
pub struct CommentLifecycle {
    client: Arc<dyn VcsClient>,
    change_request: ChangeRequestId,
    layout: ReportLayout,
    retry: RetryPolicy,
    identity: OnceCell<String>,
}

impl CommentLifecycle {
    pub fn new(
        client: Arc<dyn VcsClient>,
        change_request: ChangeRequestId,
        layout: ReportLayout,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            change_request,
            layout,
            retry,
            identity: OnceCell::new(),
        }
    }

    pub fn change_request(&self) -> &ChangeRequestId {
        &self.change_request
    }

    /// Login the VCS reports for our token; looked up once.
    pub async fn identity(&self) -> Result<&str, CommentError> {
        self.identity
            .get_or_try_init(|| async { self.client.username().await.map_err(CommentError::Identity) })
            .await
            .map(String::as_str)
    }

    /// Tidy earlier reports, then create this run's comment.
    ///
    /// Tidy failures are logged and never prevent posting.
    pub async fn post_message(&self, mode: TidyMode) -> Result<Message, CommentError> {
        match self.tidy_outdated_comments(mode).await {
            Ok(outcome) => tracing::info!(
                change_request = %self.change_request,
                %mode,
                tidied = outcome.tidied,
                failed = outcome.failed,
                "tidied earlier reports"
            ),
            Err(err) => tracing::warn!(
                change_request = %self.change_request,
                error = %err,
                "could not tidy earlier reports"
            ),
        }

        let layout = ReportLayout {
            pipeline_url: self.pipeline_url().await,
            ..self.layout.clone()
        };
        let body = build_comment(&layout, &Default::default(), "");
        let id = self
            .client
            .create_comment(&self.change_request, &body)
            .await
            .map_err(CommentError::Create)?;
        tracing::info!(change_request = %self.change_request, comment_id = %id, "posted report comment");

        Ok(Message::new(
            self.client.clone(),
            self.change_request.clone(),
            id,
            layout,
            body,
        ))
    }

    /// Push the message's latest body to its comment.
    pub async fn update_message(&self, message: &Message) -> Result<(), CommentError> {
        message.push().await?;
        Ok(())
    }

    /// Delete or hide every report this reporter left on the change
    /// request. A comment qualifies only when our login wrote it and its
    /// body is a report carrying our `comments.identity`. Listing failures
    /// abort the pass; per-comment failures are counted and logged.
    pub async fn tidy_outdated_comments(&self, mode: TidyMode) -> Result<TidyOutcome, CommentError> {
        let login = self.identity().await?.to_string();
        let comments = self.all_comments().await?;
        let reporter = self.layout.identity.as_deref();
        let mut outcome = TidyOutcome::default();

        let owned = comments
            .iter()
            .filter(|c| c.author == login && is_own_report(&c.body, reporter));
        for comment in owned {
            outcome.owned += 1;
            let result = match mode {
                TidyMode::Delete => self
                    .client
                    .delete_comment(&self.change_request, comment.id)
                    .await
                    .map(|_| true),
                TidyMode::Hide => {
                    if is_hidden(&comment.body) {
                        Ok(false)
                    } else {
                        self.client
                            .edit_comment(&self.change_request, comment.id, &hide_body(comment))
                            .await
                            .map(|_| true)
                    }
                }
            };
            match result {
                Ok(true) => outcome.tidied += 1,
                Ok(false) => outcome.skipped += 1,
                Err(err) => {
                    outcome.failed += 1;
                    tracing::warn!(comment_id = %comment.id, %mode, error = %err, "failed to tidy comment");
                }
            }
        }
        Ok(outcome)
    }

    /// Every comment on the change request, oldest first.
    async fn all_comments(&self) -> Result<Vec<RemoteComment>, CommentError> {
        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let listing = self
                .client
                .list_comments(&self.change_request, page)
                .await
                .map_err(|source| CommentError::List { page, source })?;
            all.extend(listing.comments);
            if !listing.has_next_page {
                break;
            }
        }
        Ok(all)
    }

    async fn pipeline_url(&self) -> Option<String> {
        let lookup = retry_with_backoff(&self.retry, "pipeline lookup", || {
            self.client.pipeline_url(&self.change_request)
        })
        .await;
        match lookup {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(error = %err, "no pipeline link in report");
                None
            }
        }
    }
}

/// Whether a body is already wrapped in an `OUTDATED` block.
pub fn is_hidden(body: &str) -> bool {
    body.trim_start()
        .starts_with(&format!("<details><summary><i>{OUTDATED_MARKER}"))
}

/// Whether `body` is a report (hidden or not) posted under `identity`.
///
/// A report without an identity line belongs only to a reporter that has
/// no identity configured.
pub fn is_own_report(body: &str, identity: Option<&str>) -> bool {
    let Some(rest) = unwrap_hidden(body).strip_prefix(REPORT_TITLE) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('\n').or(rest.is_empty().then_some(rest)) else {
        return false;
    };
    let second = rest.lines().next().unwrap_or("").trim();
    match identity {
        Some(identity) => second == format!("_{identity}_"),
        None => !is_identity_line(second),
    }
}

fn is_identity_line(line: &str) -> bool {
    line.len() > 2 && line.starts_with('_') && line.ends_with('_')
}

/// The original body of a collapsed comment.
fn unwrap_hidden(body: &str) -> &str {
    let body = body.trim_start();
    if !is_hidden(body) {
        return body;
    }
    match body.find("</summary>") {
        Some(end) => body[end + "</summary>".len()..].trim_start(),
        None => body,
    }
}

/// Collapse a comment body under an `OUTDATED` summary.
pub fn hide_body(comment: &RemoteComment) -> String {
    let when = comment
        .created_at
        .map(|t| format!("report from {}", t.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_else(|| "report from an earlier run".to_string());
    format!(
        "<details><summary><i>{OUTDATED_MARKER}: {when}</i></summary>\n\n{}\n</details>",
        comment.body
    )
}
