//! GitLab merge request notes client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName};
use serde::Deserialize;

use super::http;
use super::{VcsClient, VcsError};
use crate::models::comment::{ChangeRequestId, CommentId, CommentPage, RemoteComment};
use crate::models::VcsKind;

const PER_PAGE: u32 = 100;

/// Client for the GitLab v4 REST API.
pub struct GitlabClient {
    base_url: String,
    username: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct GitlabUser {
    username: String,
}

#[derive(Deserialize)]
struct GitlabNote {
    id: u64,
    #[serde(default)]
    author: Option<GitlabUser>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    /// System notes ("added 1 commit", label changes) are not comments.
    #[serde(default)]
    system: bool,
}

#[derive(Deserialize)]
struct GitlabPipeline {
    web_url: String,
}

impl GitlabClient {
    pub fn new(base_url: String, token: String, username: Option<String>) -> Result<Self, VcsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("private-token"),
            http::secret_header(&token)?,
        );
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            http: http::build_client(headers)?,
        })
    }

    fn merge_request_url(&self, id: &ChangeRequestId) -> String {
        format!(
            "{}/projects/{}/merge_requests/{}",
            self.base_url,
            encode_project(&id.repo),
            id.number
        )
    }

    fn note_url(&self, id: &ChangeRequestId, note: CommentId) -> String {
        format!("{}/notes/{note}", self.merge_request_url(id))
    }
}

#[async_trait]
impl VcsClient for GitlabClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Gitlab
    }

    async fn username(&self) -> Result<String, VcsError> {
        if let Some(ref name) = self.username {
            return Ok(name.clone());
        }
        let url = format!("{}/user", self.base_url);
        let (user, _) = http::send_json::<GitlabUser>(self.http.get(&url), &url).await?;
        Ok(user.username)
    }

    async fn create_comment(
        &self,
        id: &ChangeRequestId,
        body: &str,
    ) -> Result<CommentId, VcsError> {
        let url = format!("{}/notes", self.merge_request_url(id));
        let request = self.http.post(&url).json(&serde_json::json!({ "body": body }));
        let (note, _) = http::send_json::<GitlabNote>(request, &url).await?;
        Ok(CommentId(note.id))
    }

    async fn edit_comment(
        &self,
        id: &ChangeRequestId,
        comment: CommentId,
        body: &str,
    ) -> Result<CommentId, VcsError> {
        let url = self.note_url(id, comment);
        let request = self.http.put(&url).json(&serde_json::json!({ "body": body }));
        let (note, _) = http::send_json::<GitlabNote>(request, &url).await?;
        Ok(CommentId(note.id))
    }

    async fn list_comments(
        &self,
        id: &ChangeRequestId,
        page: u32,
    ) -> Result<CommentPage, VcsError> {
        let url = format!(
            "{}/notes?sort=asc&order_by=created_at&per_page={PER_PAGE}&page={page}",
            self.merge_request_url(id)
        );
        let (notes, headers) = http::send_json::<Vec<GitlabNote>>(self.http.get(&url), &url).await?;
        Ok(CommentPage {
            comments: notes
                .into_iter()
                .filter(|n| !n.system)
                .map(|n| RemoteComment {
                    id: CommentId(n.id),
                    author: n.author.map(|a| a.username).unwrap_or_default(),
                    body: n.body,
                    created_at: n.created_at,
                })
                .collect(),
            has_next_page: has_next_page(&headers),
        })
    }

    async fn delete_comment(
        &self,
        id: &ChangeRequestId,
        comment: CommentId,
    ) -> Result<(), VcsError> {
        let url = self.note_url(id, comment);
        http::send(self.http.delete(&url), &url).await?;
        Ok(())
    }

    async fn pipeline_url(&self, id: &ChangeRequestId) -> Result<Option<String>, VcsError> {
        // Pipelines are returned newest first.
        let url = format!("{}/pipelines?per_page=1", self.merge_request_url(id));
        let (pipelines, _) =
            http::send_json::<Vec<GitlabPipeline>>(self.http.get(&url), &url).await?;
        Ok(pipelines.into_iter().next().map(|p| p.web_url))
    }
}

/// GitLab signals further pages with a non-empty `X-Next-Page` header.
fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get("x-next-page")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty())
}

/// Percent-encode a project path (`group/sub/project`) for use as a
/// single URL path segment.
fn encode_project(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
