pub mod limits;

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub site_url: String,
    pub support_portal_url: Option<String>,
    pub current_host: Option<String>,
    pub request_timeout_seconds: u64,
    pub enable_urgent: bool,
    pub enable_smart_matching: bool,
    pub boost_price_cents: i64,
    pub boost_duration_hours: i64,
    pub token_store_dir: Option<PathBuf>,
    pub app_mode: String,
    pub queue_status: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let api_base_url = env_or("API_BASE_URL", "http://localhost:4000/api");
        Url::parse(&api_base_url).map_err(|err| anyhow!("invalid API_BASE_URL: {}", err))?;
        let site_url = env_or("SITE_URL", "http://localhost:3000");
        Url::parse(&site_url).map_err(|err| anyhow!("invalid SITE_URL: {}", err))?;

        let boost_duration_hours: i64 = env_or_parse("BOOST_DURATION_HOURS", "24")?;
        if boost_duration_hours <= 0 {
            return Err(anyhow!("invalid BOOST_DURATION_HOURS: must be positive"));
        }

        Ok(Self {
            api_base_url,
            site_url,
            support_portal_url: std::env::var("SUPPORT_PORTAL_URL").ok(),
            current_host: std::env::var("CURRENT_HOST").ok().filter(|host| !host.is_empty()),
            request_timeout_seconds: env_or_parse("REQUEST_TIMEOUT_SECONDS", "15")?,
            enable_urgent: env_flag("ENABLE_URGENT")?,
            enable_smart_matching: env_flag("ENABLE_SMART_MATCHING")?,
            boost_price_cents: env_or_parse("BOOST_PRICE_CENTS", "499")?,
            boost_duration_hours,
            token_store_dir: std::env::var("TOKEN_STORE_DIR").ok().map(PathBuf::from),
            app_mode: env_or("APP_MODE", "feed"),
            queue_status: env_or("QUEUE_STATUS", "PENDING"),
        })
    }

    /// Defaults suitable for a client talking to `api_base_url` with every
    /// optional surface switched off.
    pub fn for_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            site_url: "http://localhost:3000".to_string(),
            support_portal_url: None,
            current_host: None,
            request_timeout_seconds: 15,
            enable_urgent: false,
            enable_smart_matching: false,
            boost_price_cents: 499,
            boost_duration_hours: 24,
            token_store_dir: None,
            app_mode: "feed".to_string(),
            queue_status: "PENDING".to_string(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_flag(key: &str) -> Result<bool> {
    match std::env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(anyhow!("invalid {}: {}", key, other)),
        },
        Err(_) => Ok(false),
    }
}
