use super::selector::SelectorParseError;
use thiserror::Error;

/// Errors surfaced to callers of the resource layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{kind} \"{}\" not found", qualified(.namespace, .name))]
    NotFound {
        kind: &'static str,
        namespace: Option<String>,
        name: String,
    },

    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] SelectorParseError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        ApiError::NotFound {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    /// Not-found for an object identified within a namespace
    pub fn namespaced_not_found(
        kind: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        ApiError::NotFound {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Machine-readable reason, as carried in a `Status` body
    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "NotFound",
            ApiError::InvalidSelector(_) | ApiError::BadRequest(_) => "BadRequest",
            ApiError::Cancelled => "ServiceUnavailable",
        }
    }

    /// HTTP status code the error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound { .. } => 404,
            ApiError::InvalidSelector(_) | ApiError::BadRequest(_) => 400,
            ApiError::Cancelled => 503,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn qualified(namespace: &Option<String>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{}/{}", namespace, name),
        None => name.to_string(),
    }
}
