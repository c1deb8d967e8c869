//! Ordered alternate base addresses for requests that never reach a server.
//!
//! A request is tried against each base in order and the loop stops at the
//! first attempt that produces anything other than a connection-level
//! failure. Received error statuses are final.

use std::future::Future;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::http::ApiError;

/// Addresses a backend commonly listens on during local development.
pub const LOCAL_DEV_BASES: &[&str] = &[
    "http://localhost:4000/api",
    "http://127.0.0.1:4000/api",
    "http://localhost:8080/api",
];

/// Resolved against the canonical site address.
pub const RELATIVE_DEFAULT: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    bases: Vec<String>,
}

impl FallbackPolicy {
    /// Builds a policy from `bases`, dropping blanks and later duplicates
    /// while keeping the original order.
    pub fn new<I, S>(bases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut deduped: Vec<String> = Vec::new();
        for base in bases {
            let base = normalize(&base.into());
            if base.is_empty() || deduped.contains(&base) {
                continue;
            }
            deduped.push(base);
        }
        Self { bases: deduped }
    }

    /// Primary address first, then the current host, local development
    /// addresses and finally the relative default.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut candidates = vec![config.api_base_url.clone()];

        if let Some(host) = config.current_host.as_deref().map(str::trim) {
            match Url::parse(host) {
                // already a full origin such as `https://app.example.com`
                Ok(origin) if origin.has_host() => match origin.join(RELATIVE_DEFAULT) {
                    Ok(url) => candidates.push(url.to_string()),
                    Err(err) => warn!(error = %err, current_host = %host, "cannot resolve current host"),
                },
                _ => {
                    let scheme = if host.starts_with("localhost") || host.starts_with("127.") {
                        "http"
                    } else {
                        "https"
                    };
                    candidates.push(format!("{}://{}{}", scheme, host, RELATIVE_DEFAULT));
                }
            }
        }

        candidates.extend(LOCAL_DEV_BASES.iter().map(|base| base.to_string()));

        match Url::parse(&config.site_url).and_then(|site| site.join(RELATIVE_DEFAULT)) {
            Ok(url) => candidates.push(url.to_string()),
            Err(err) => warn!(error = %err, site_url = %config.site_url, "cannot resolve relative api default"),
        }

        Self::new(candidates)
    }

    pub fn bases(&self) -> &[String] {
        &self.bases
    }

    pub fn primary(&self) -> Option<&str> {
        self.bases.first().map(String::as_str)
    }

    /// Runs `attempt` against each base until one does not fail at the
    /// connection level.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, ApiError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut last_failure = None;

        for (index, base) in self.bases.iter().enumerate() {
            match attempt(base.clone()).await {
                Err(err) if err.is_connection_failure() => {
                    warn!(base = %base, error = %err, "base address unreachable");
                    last_failure = Some(err);
                }
                outcome => {
                    if index > 0 {
                        info!(base = %base, attempts = index + 1, "request served by fallback address");
                    } else {
                        debug!(base = %base, "request served by primary address");
                    }
                    return outcome;
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| ApiError::network("no base address configured")))
    }
}

/// Joins a base address and a path that starts with `/`.
pub fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn normalize(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}
