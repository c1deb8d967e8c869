//! Secondary submission path.
//!
//! Used only after the [`Gateway`](crate::http::Gateway) and its fallback
//! loop are exhausted with a connection-level failure. It shares nothing
//! with the gateway except the address list and the session: a separate
//! HTTP client, hand-built requests, the credential attached by hand and
//! the response body parsed manually.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Body, Client, Method, Request};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::http::fallback::{self, FallbackPolicy};
use crate::http::ApiError;
use crate::infra::session::Session;

#[derive(Clone)]
pub struct RawSubmitter {
    client: Client,
    policy: FallbackPolicy,
    session: Arc<Session>,
    timeout: Duration,
}

impl RawSubmitter {
    pub fn new(policy: FallbackPolicy, timeout: Duration, session: Arc<Session>) -> Self {
        Self {
            client: Client::new(),
            policy,
            session,
            timeout,
        }
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = Bytes::from(serde_json::to_vec(body)?);
        info!(path = path, "submitting through secondary path");
        self.policy
            .run(|base| self.submit(fallback::join(&base, path), payload.clone()))
            .await
    }

    async fn submit<T: DeserializeOwned>(&self, url: String, payload: Bytes) -> Result<T, ApiError> {
        let target = Url::parse(&url)
            .map_err(|err| ApiError::network(format!("invalid address {}: {}", url, err)))?;

        let mut request = Request::new(Method::POST, target);
        *request.timeout_mut() = Some(self.timeout);
        let headers = request.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = self.session.token() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(err) => warn!(error = %err, "stored token is not a valid header value"),
            }
        }
        *request.body_mut() = Some(Body::from(payload));

        let response = self.client.execute(request).await?;
        let status = response.status();
        let raw = response
            .bytes()
            .await
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::from_response(status, &raw));
        }

        let text = std::str::from_utf8(&raw)
            .map_err(|err| ApiError::InvalidResponse(format!("response is not UTF-8: {}", err)))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::InvalidResponse("empty response body".to_string()));
        }
        serde_json::from_str(text).map_err(ApiError::from)
    }
}
