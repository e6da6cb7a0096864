use std::{fmt, io};

use http::status::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError as UrlParseError;

use serde_json::Error as JsonError;

pub type Result<T> = std::result::Result<T, SubTreeError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum SubTreeError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Discarded stale response: {0}")]
    Stale(String),
}

impl SubTreeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubTreeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SubTreeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SubTreeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SubTreeError::Network(_) => StatusCode::BAD_GATEWAY,
            SubTreeError::NotFound(_) => StatusCode::NOT_FOUND,
            SubTreeError::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            SubTreeError::Serialization(_) => StatusCode::BAD_REQUEST,
            SubTreeError::Stale(_) => StatusCode::CONFLICT,
        }
    }

    /// True for the two kinds that are surfaced to the user from network calls.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SubTreeError::Network(_) | SubTreeError::Rejected { .. }
        )
    }
}

impl From<toml::de::Error> for SubTreeError {
    fn from(src: toml::de::Error) -> SubTreeError {
        SubTreeError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for SubTreeError {
    fn from(src: toml::ser::Error) -> SubTreeError {
        SubTreeError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for SubTreeError {
    fn from(src: JsonError) -> SubTreeError {
        SubTreeError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for SubTreeError {
    fn from(src: UrlParseError) -> SubTreeError {
        SubTreeError::Config(format!("Invalid URL: {src}"))
    }
}

impl From<io::Error> for SubTreeError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => SubTreeError::NotFound(format!("{x}")),
            _ => SubTreeError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<fmt::Error> for SubTreeError {
    fn from(x: fmt::Error) -> Self {
        SubTreeError::Serialization(format!("{x}"))
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for SubTreeError {
    fn from(x: reqwest::Error) -> Self {
        if let Some(status) = x.status() {
            SubTreeError::Rejected {
                status: status.as_u16(),
                message: format!("{x}"),
            }
        } else if x.is_decode() {
            SubTreeError::Serialization(format!("Response body decode failed: {x}"))
        } else {
            SubTreeError::Network(format!("{x}"))
        }
    }
}

#[cfg(feature = "service")]
impl axum::response::IntoResponse for SubTreeError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        tracing::debug!("Request failed with {}: {}", status, self);
        let body = serde_json::json!({ "detail": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
