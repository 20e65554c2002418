use reqwest::blocking::{Client, RequestBuilder};
use std::time::Duration;

use crate::configs::Credential;
use crate::errors::{ChatError, ChatResult};

/// Status and body of a completed HTTP exchange, captured before any parsing.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body on 2xx, otherwise the error built by `failed`.
    pub fn success_or(self, failed: impl FnOnce(u16, String) -> ChatError) -> ChatResult<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(failed(self.status, self.body))
        }
    }
}

/// Blocking HTTP client bound to one workspace host and bearer credential.
#[derive(Debug, Clone)]
pub struct WorkspaceClient {
    client: Client,
    host: String,
    credential: Credential,
}

impl WorkspaceClient {
    pub fn new(host: impl Into<String>, credential: Credential, timeout: Duration) -> ChatResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            host: host.into(),
            credential,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.host.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .bearer_auth(self.credential.bearer())
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(self.credential.bearer())
    }

    /// Sends once. Transport failures are errors, any HTTP status is returned.
    pub(crate) fn send(&self, request: RequestBuilder) -> ChatResult<RawResponse> {
        let response = request.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        tracing::debug!(status, bytes = body.len(), "workspace response");
        Ok(RawResponse { status, body })
    }
}
