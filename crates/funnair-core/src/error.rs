use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Failure of a call against the booking backend
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success HTTP status. `detail` is the text to show the user.
    #[error("{detail}")]
    Request { status: StatusCode, detail: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body failed while it was being streamed
    #[error("stream interrupted: {0}")]
    Stream(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("stream cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// Text suitable for a notification line
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Request { detail, .. } => detail.clone(),
            ApiError::Transport(_) => "Could not reach the booking service".to_string(),
            ApiError::Stream(_) => "The response was interrupted".to_string(),
            ApiError::Cancelled => "Cancelled".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Pull the `detail` string out of an error body, falling back to `fallback`.
///
/// Validation errors carry a structured `detail` (an array); those use the
/// fallback too.
pub(crate) fn detail_or(body: &str, fallback: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| match b.detail {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_from_body() {
        let body = r#"{"detail": "Booking 101 not found"}"#;
        assert_eq!(detail_or(body, "Failed"), "Booking 101 not found");
    }

    #[test]
    fn test_detail_fallback_on_missing_field() {
        assert_eq!(detail_or(r#"{"error": "x"}"#, "Failed to change seat"), "Failed to change seat");
    }

    #[test]
    fn test_detail_fallback_on_non_json() {
        assert_eq!(detail_or("Internal Server Error", "Failed"), "Failed");
        assert_eq!(detail_or("", "Failed"), "Failed");
    }

    #[test]
    fn test_detail_fallback_on_structured_detail() {
        let body = r#"{"detail": [{"loc": ["query", "first_name"], "msg": "field required"}]}"#;
        assert_eq!(detail_or(body, "Failed to change seat"), "Failed to change seat");
    }

    #[test]
    fn test_request_error_displays_detail() {
        let err = ApiError::Request {
            status: StatusCode::BAD_REQUEST,
            detail: "Booking cannot be cancelled within 48 hours".to_string(),
        };
        assert_eq!(err.to_string(), "Booking cannot be cancelled within 48 hours");
        assert_eq!(err.user_message(), err.to_string());
    }
}
