use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";
pub const CONNECTIVITY_FAILURE: &str =
    "We couldn't reach the server. Check your connection and try again.";

#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received from any server.
    #[error("network error: {0}")]
    Network(String),

    /// A server answered with a non-success status.
    #[error("request failed with status {status}")]
    Http {
        status: StatusCode,
        message: Option<String>,
    },

    /// Business-rule rejection, shown to the user as-is and never retried.
    #[error("{0}")]
    Domain(String),

    /// Input refused before any request was issued.
    #[error("{0}")]
    Validation(String),

    #[error("an update for this item is already in progress")]
    InFlight,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// The only failures that are worth repeating against another address.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classifies a received error response. Conflict, unprocessable and
    /// locked answers are business-rule rejections.
    pub(crate) fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.error.or(body.message))
            .filter(|message| !message.trim().is_empty());

        match status {
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::LOCKED => {
                Self::Domain(message.unwrap_or_else(|| GENERIC_FAILURE.to_string()))
            }
            _ => Self::Http { status, message },
        }
    }

    /// Copy suitable for the notification sink.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => CONNECTIVITY_FAILURE.to_string(),
            Self::Http { status, message } => match *status {
                StatusCode::UNAUTHORIZED => {
                    "Your session has expired. Please sign in again.".to_string()
                }
                StatusCode::FORBIDDEN => {
                    "Your account is suspended or does not have permission for this action."
                        .to_string()
                }
                StatusCode::BAD_REQUEST => message.clone().unwrap_or_else(|| {
                    "Some of the submitted details are invalid. Please review them and try again."
                        .to_string()
                }),
                StatusCode::TOO_MANY_REQUESTS => {
                    "Too many requests. Please wait a moment and try again.".to_string()
                }
                _ => message.clone().unwrap_or_else(|| GENERIC_FAILURE.to_string()),
            },
            Self::Domain(message) | Self::Validation(message) => message.clone(),
            Self::InFlight => self.to_string(),
            Self::InvalidResponse(_) => GENERIC_FAILURE.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::InvalidResponse(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::Http {
                status,
                message: None,
            };
        }
        // connect, timeout, request and builder failures all mean no server
        // ever produced a response
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
