//! Shared HTTP plumbing for every adapter.
//!
//! Wraps a [`reqwest::Client`] with the base URL and optional bearer
//! token, and provides the status-checking helpers that turn non-2xx
//! responses into [`BackendError::Api`].

use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, Url};

use crate::config::BackendConfig;
use crate::error::BackendError;

/// HTTP client bound to one backend base URL.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpTransport {
    /// Build a transport from configuration, applying the request
    /// timeout when one is configured.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Create a transport reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling).
    pub fn with_client(client: reqwest::Client, base_url: Url, auth_token: Option<String>) -> Self {
        Self {
            client,
            base_url,
            auth_token,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL. Segments are percent-encoded,
    /// so job ids containing `/` or spaces stay a single segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.authorize(self.client.get(url).header(ACCEPT, "application/json"))
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.authorize(self.client.post(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // ---- response helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`BackendError::Api`]
    /// containing the status and body text on failure.
    pub async fn ensure_success(
        operation: &'static str,
        response: Response,
    ) -> Result<Response, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("<empty body>").to_string()
            } else {
                body
            };
            tracing::warn!(operation, status = status.as_u16(), "Backend returned an error status");
            return Err(BackendError::Api {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    pub async fn parse_response<T: serde::de::DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, BackendError> {
        let response = Self::ensure_success(operation, response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    pub async fn check_status(operation: &'static str, response: Response) -> Result<(), BackendError> {
        Self::ensure_success(operation, response).await?;
        Ok(())
    }
}
