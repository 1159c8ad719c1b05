//! GitHub issue-comment client.
//!
//! Pull request conversation comments are issue comments on GitHub, so
//! every call goes through `/repos/{owner}/{repo}/issues/...`.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, LINK};
use serde::Deserialize;

use super::http;
use super::{VcsClient, VcsError};
use crate::models::comment::{ChangeRequestId, CommentId, CommentPage, RemoteComment};
use crate::models::VcsKind;

/// Comments requested per listing page (GitHub's maximum).
const PER_PAGE: u32 = 100;

const API_VERSION: &str = "2022-11-28";

/// Client for the GitHub REST API.
pub struct GithubClient {
    base_url: String,
    username: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Deserialize)]
struct GithubComment {
    id: u64,
    #[serde(default)]
    user: Option<GithubUser>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<GithubComment> for RemoteComment {
    fn from(c: GithubComment) -> Self {
        RemoteComment {
            id: CommentId(c.id),
            author: c.user.map(|u| u.login).unwrap_or_default(),
            body: c.body.unwrap_or_default(),
            created_at: c.created_at,
        }
    }
}

impl GithubClient {
    /// Create a client. `username` overrides the `/user` lookup, which
    /// GitHub App installation tokens cannot perform.
    pub fn new(base_url: String, token: String, username: Option<String>) -> Result<Self, VcsError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, http::secret_header(&format!("Bearer {token}"))?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            http: http::build_client(headers)?,
        })
    }

    fn issue_comments_url(&self, id: &ChangeRequestId) -> String {
        format!("{}/repos/{}/issues/{}/comments", self.base_url, id.repo, id.number)
    }

    fn comment_url(&self, id: &ChangeRequestId, comment: CommentId) -> String {
        format!("{}/repos/{}/issues/comments/{}", self.base_url, id.repo, comment)
    }
}

#[async_trait]
impl VcsClient for GithubClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Github
    }

    async fn username(&self) -> Result<String, VcsError> {
        if let Some(ref name) = self.username {
            return Ok(name.clone());
        }
        let url = format!("{}/user", self.base_url);
        let (user, _) = http::send_json::<GithubUser>(self.http.get(&url), &url).await?;
        Ok(user.login)
    }

    async fn create_comment(
        &self,
        id: &ChangeRequestId,
        body: &str,
    ) -> Result<CommentId, VcsError> {
        let url = self.issue_comments_url(id);
        let request = self.http.post(&url).json(&serde_json::json!({ "body": body }));
        let (comment, _) = http::send_json::<GithubComment>(request, &url).await?;
        Ok(CommentId(comment.id))
    }

    async fn edit_comment(
        &self,
        id: &ChangeRequestId,
        comment: CommentId,
        body: &str,
    ) -> Result<CommentId, VcsError> {
        let url = self.comment_url(id, comment);
        let request = self.http.patch(&url).json(&serde_json::json!({ "body": body }));
        let (edited, _) = http::send_json::<GithubComment>(request, &url).await?;
        Ok(CommentId(edited.id))
    }

    async fn list_comments(
        &self,
        id: &ChangeRequestId,
        page: u32,
    ) -> Result<CommentPage, VcsError> {
        let url = format!(
            "{}?per_page={PER_PAGE}&page={page}",
            self.issue_comments_url(id)
        );
        let (comments, headers) =
            http::send_json::<Vec<GithubComment>>(self.http.get(&url), &url).await?;
        Ok(CommentPage {
            comments: comments.into_iter().map(RemoteComment::from).collect(),
            has_next_page: headers
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .is_some_and(has_next_link),
        })
    }

    async fn delete_comment(
        &self,
        id: &ChangeRequestId,
        comment: CommentId,
    ) -> Result<(), VcsError> {
        let url = self.comment_url(id, comment);
        http::send(self.http.delete(&url), &url).await?;
        Ok(())
    }
}

/// Whether an RFC 8288 `Link` header advertises a next page.
fn has_next_link(link: &str) -> bool {
    link.split(',')
        .any(|part| part.split(';').skip(1).any(|p| p.trim() == r#"rel="next""#))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_link_detection() {
        let link = r#"<https://api.github.com/repositories/1/issues/2/comments?page=2>; rel="next", <https://api.github.com/repositories/1/issues/2/comments?page=5>; rel="last""#;
        assert!(has_next_link(link));

        let last_page = r#"<https://api.github.com/repositories/1/issues/2/comments?page=1>; rel="prev", <https://api.github.com/repositories/1/issues/2/comments?page=1>; rel="first""#;
        assert!(!has_next_link(last_page));
        assert!(!has_next_link(""));
    }

    #[test]
    fn urls_follow_issue_comment_layout() {
        let client =
            GithubClient::new("https://ghe.example.com/api/v3/".into(), "t".into(), None).unwrap();
        let id = ChangeRequestId::new("acme/deploy", 42);
        assert_eq!(
            client.issue_comments_url(&id),
            "https://ghe.example.com/api/v3/repos/acme/deploy/issues/42/comments"
        );
        assert_eq!(
            client.comment_url(&id, CommentId(7)),
            "https://ghe.example.com/api/v3/repos/acme/deploy/issues/comments/7"
        );
    }

    #[test]
    fn comment_payload_decodes() {
        let raw = r#"{"id": 11, "user": {"login": "bot"}, "body": "hi", "created_at": "2024-05-01T10:00:00Z"}"#;
        let comment: RemoteComment = serde_json::from_str::<GithubComment>(raw).unwrap().into();
        assert_eq!(comment.id, CommentId(11));
        assert_eq!(comment.author, "bot");
        assert_eq!(comment.body, "hi");
        assert!(comment.created_at.is_some());
    }

    #[tokio::test]
    async fn username_override_skips_lookup() {
        let client =
            GithubClient::new("http://127.0.0.1:1".into(), "t".into(), Some("ci-bot".into()))
                .unwrap();
        assert_eq!(client.username().await.unwrap(), "ci-bot");
    }
}
