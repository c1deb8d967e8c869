use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::http::fallback::{self, FallbackPolicy};
use crate::http::ApiError;
use crate::infra::session::Session;

/// Every backend call goes through here: bearer credential attached from the
/// session, fixed timeout, and connection-level failures retried against
/// the fallback policy.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    policy: FallbackPolicy,
    session: Arc<Session>,
    timeout: Duration,
}

impl Gateway {
    pub fn new(config: &ClientConfig, session: Arc<Session>) -> Result<Self, ApiError> {
        Self::with_policy(
            FallbackPolicy::from_config(config),
            config.request_timeout(),
            session,
        )
    }

    pub fn with_policy(
        policy: FallbackPolicy,
        timeout: Duration,
        session: Arc<Session>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::network(format!("failed to create HTTP client: {}", err)))?;

        Ok(Self {
            client,
            policy,
            session,
            timeout,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<(), T>(Method::DELETE, path, None).await
    }

    #[instrument(skip(self, body))]
    pub async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = match body {
            Some(body) => Some(Bytes::from(serde_json::to_vec(body)?)),
            None => None,
        };

        let raw = self
            .policy
            .run(|base| self.attempt(method.clone(), fallback::join(&base, path), payload.clone()))
            .await?;

        decode(&raw)
    }

    async fn attempt(
        &self,
        method: Method,
        url: String,
        payload: Option<Bytes>,
    ) -> Result<Bytes, ApiError> {
        let mut request = self
            .authorize(self.client.request(method, &url))
            .header(ACCEPT, "application/json");
        if let Some(payload) = payload {
            request = request.header(CONTENT_TYPE, "application/json").body(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        // a status line arrived, so body trouble is not a connection failure
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;
        debug!(url = %url, status = status.as_u16(), "response received");

        if !status.is_success() {
            return Err(ApiError::from_response(status, &body));
        }
        Ok(body)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Empty bodies decode as JSON `null`, so `()` and `Option<_>` targets work
/// for 204 responses.
pub(crate) fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, ApiError> {
    let raw = if raw.iter().all(u8::is_ascii_whitespace) {
        &b"null"[..]
    } else {
        raw
    };
    serde_json::from_slice(raw).map_err(ApiError::from)
}
