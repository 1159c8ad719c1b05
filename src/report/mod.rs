//! Report aggregation: one evolving comment shared by every application.
//!
//! A [`Message`] owns the per-application sections of the report and the
//! id of the remote comment that displays them. Workers diffing different
//! applications concurrently call [`Message::add_to_app_message`]; each
//! call takes the lock, mutates its section, rebuilds the composite body
//! with [`build_comment`] and pushes it, so the remote comment never sees
//! a partially applied update and at most one push is in flight.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::constants::{ERROR_MARKER, FAIL_INDICATOR, PASS_INDICATOR, WARNING_MARKER};
use crate::models::comment::{ChangeRequestId, CommentId};
use crate::vcs::{VcsClient, VcsError};

/// First line of every report comment.
pub const REPORT_TITLE: &str = "## Kubernetes Changes Report";

/// Separator between fragments appended to the same section.
pub const FRAGMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Default upper bound on the composite body (GitHub rejects bodies over
/// 65 536 characters).
pub const DEFAULT_MAX_COMMENT_LENGTH: usize = 65_000;

const PENDING: &str = "_Diff in progress..._";

/// A marker opening a line; markers inside rendered manifests don't count.
static FAILURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?m)^[ \t]*(?:{}|{})",
        regex::escape(ERROR_MARKER),
        regex::escape(WARNING_MARKER)
    ))
    .unwrap()
});

/// Errors while publishing the report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to update report comment {comment}: {source}")]
    Push {
        comment: CommentId,
        source: VcsError,
    },
}

/// Fixed parts of the composite body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLayout {
    /// Shown under the title so several reporters can share a change
    /// request without confusing their comments.
    pub identity: Option<String>,
    /// Link to the CI pipeline that produced the report.
    pub pipeline_url: Option<String>,
    pub max_length: usize,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            identity: None,
            pipeline_url: None,
            max_length: DEFAULT_MAX_COMMENT_LENGTH,
        }
    }
}

/// Whether a section body reports a failure or warning.
pub fn is_failure(body: &str) -> bool {
    FAILURE_PATTERN.is_match(body)
}

/// Render the composite comment. Pure: the same sections, trailer and
/// layout always produce the same body.
pub fn build_comment(
    layout: &ReportLayout,
    sections: &BTreeMap<String, String>,
    trailer: &str,
) -> String {
    let mut out = String::from(REPORT_TITLE);
    out.push('\n');
    if let Some(ref identity) = layout.identity {
        out.push_str(&format!("_{identity}_\n"));
    }
    if let Some(ref url) = layout.pipeline_url {
        out.push_str(&format!("\n[View pipeline]({url})\n"));
    }

    for (app, body) in sections {
        let indicator = if is_failure(body) {
            FAIL_INDICATOR
        } else {
            PASS_INDICATOR
        };
        let body = if body.is_empty() { PENDING } else { body.as_str() };
        out.push_str(&format!(
            "\n<details><summary>{indicator} <b>{app}</b></summary>\n\n{body}\n\n</details>\n"
        ));
    }

    if !trailer.is_empty() {
        out.push('\n');
        out.push_str(trailer);
        out.push('\n');
    }

    truncate_body(out, layout.max_length)
}

/// Cut `body` to at most `max` bytes on a char boundary, ending with a
/// visible note. A code fence or `<details>` block left open by the cut is
/// closed first.
fn truncate_body(body: String, max: usize) -> String {
    if body.len() <= max {
        return body;
    }
    let note = format!(
        "\n\n{WARNING_MARKER} Report truncated: the full report exceeds {max} characters."
    );
    let mut cut = max.saturating_sub(note.len());
    loop {
        while cut > 0 && !body.is_char_boundary(cut) {
            cut -= 1;
        }
        let closing = closing_tags(&body[..cut]);
        let total = cut + closing.len() + note.len();
        if total <= max || cut == 0 {
            let mut truncated = body[..cut].to_string();
            truncated.push_str(&closing);
            truncated.push_str(&note);
            return truncated;
        }
        cut = cut.saturating_sub(total - max);
    }
}

/// Markup that closes whatever `prefix` leaves open.
fn closing_tags(prefix: &str) -> String {
    let mut closing = String::new();
    if prefix.matches("```").count() % 2 == 1 {
        closing.push_str("\n```");
    }
    let open = prefix
        .matches("<details>")
        .count()
        .saturating_sub(prefix.matches("</details>").count());
    for _ in 0..open {
        closing.push_str("\n\n</details>");
    }
    closing
}

struct MessageState {
    comment_id: CommentId,
    sections: BTreeMap<String, String>,
    trailer: String,
    /// Last body successfully pushed.
    pushed: String,
}

/// The report comment for one change request.
pub struct Message {
    change_request: ChangeRequestId,
    client: Arc<dyn VcsClient>,
    layout: ReportLayout,
    state: Mutex<MessageState>,
}

impl Message {
    /// Wrap an already created comment whose current body is `body`.
    pub fn new(
        client: Arc<dyn VcsClient>,
        change_request: ChangeRequestId,
        comment_id: CommentId,
        layout: ReportLayout,
        body: String,
    ) -> Self {
        Self {
            change_request,
            client,
            layout,
            state: Mutex::new(MessageState {
                comment_id,
                sections: BTreeMap::new(),
                trailer: String::new(),
                pushed: body,
            }),
        }
    }

    pub fn change_request(&self) -> &ChangeRequestId {
        &self.change_request
    }

    pub async fn comment_id(&self) -> CommentId {
        self.state.lock().await.comment_id
    }

    /// The body as currently rendered from the sections.
    pub async fn body(&self) -> String {
        let state = self.state.lock().await;
        build_comment(&self.layout, &state.sections, &state.trailer)
    }

    /// Snapshot of every application's section.
    pub async fn sections(&self) -> BTreeMap<String, String> {
        self.state.lock().await.sections.clone()
    }

    /// Register an application with an empty section.
    pub async fn add_app(&self, name: &str) -> Result<(), ReportError> {
        let mut state = self.state.lock().await;
        state.sections.entry(name.to_string()).or_default();
        self.push_locked(&mut state).await
    }

    /// Append a fragment to an application's section.
    pub async fn add_to_app_message(&self, name: &str, fragment: &str) -> Result<(), ReportError> {
        let mut state = self.state.lock().await;
        let section = state.sections.entry(name.to_string()).or_default();
        append_fragment(section, fragment);
        self.push_locked(&mut state).await
    }

    /// Append a fragment to the run-level trailer below all sections.
    pub async fn add_to_message(&self, fragment: &str) -> Result<(), ReportError> {
        let mut state = self.state.lock().await;
        append_fragment(&mut state.trailer, fragment);
        self.push_locked(&mut state).await
    }

    /// Push the current body even if it has not changed.
    pub async fn push(&self) -> Result<(), ReportError> {
        let mut state = self.state.lock().await;
        state.pushed.clear();
        self.push_locked(&mut state).await
    }

    async fn push_locked(&self, state: &mut MessageState) -> Result<(), ReportError> {
        let body = build_comment(&self.layout, &state.sections, &state.trailer);
        if body == state.pushed {
            return Ok(());
        }
        let id = self
            .client
            .edit_comment(&self.change_request, state.comment_id, &body)
            .await
            .map_err(|source| ReportError::Push {
                comment: state.comment_id,
                source,
            })?;
        if id != state.comment_id {
            tracing::debug!(old = %state.comment_id, new = %id, "comment id changed on edit");
            state.comment_id = id;
        }
        state.pushed = body;
        Ok(())
    }
}

fn append_fragment(target: &mut String, fragment: &str) {
    if !target.is_empty() {
        target.push_str(FRAGMENT_SEPARATOR);
    }
    target.push_str(fragment);
}
