//! Shared reqwest plumbing for the provider clients.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::VcsError;

/// Per-request timeout enforced by the transport.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an HTTP client carrying `headers` on every request.
pub(crate) fn build_client(mut headers: HeaderMap) -> Result<reqwest::Client, VcsError> {
    let agent = format!("{}/{}", crate::constants::APP_NAME, crate::constants::VERSION);
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&agent).map_err(|e| VcsError::Decode(e.to_string()))?,
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| VcsError::Network(e.to_string()))
}

/// Header value from a secret, marked sensitive so it never shows in logs.
pub(crate) fn secret_header(value: &str) -> Result<HeaderValue, VcsError> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| VcsError::Decode("token contains invalid header characters".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Send a request and fail on any non-success status.
pub(crate) async fn send(request: RequestBuilder, url: &str) -> Result<Response, VcsError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    Err(VcsError::from_status(status.as_u16(), url, body))
}

/// Send a request and decode the JSON response.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> Result<(T, HeaderMap), VcsError> {
    let response = send(request, url).await?;
    let headers = response.headers().clone();
    let value = response
        .json::<T>()
        .await
        .map_err(|e| VcsError::Decode(format!("{url}: {e}")))?;
    Ok((value, headers))
}
