use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {}", .message.as_deref().unwrap_or("credentials rejected"))]
    Unauthorized { message: Option<String> },

    #[error("Request rejected (status {status}): {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { status: u16, message: Option<String> },

    #[error("Server error (status {status}): {}", .message.as_deref().unwrap_or("no message"))]
    ServerError { status: u16, message: Option<String> },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Pull the human-readable `message` out of a JSON error body
    fn extract_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized { message },
            code @ 500..=599 => ApiError::ServerError {
                status: code,
                message,
            },
            code => ApiError::Rejected {
                status: code,
                message,
            },
        }
    }

    /// Server-provided message suitable for showing to the user, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { message }
            | ApiError::Rejected { message, .. }
            | ApiError::ServerError { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_unauthorized_keeps_message() {
        let err = ApiError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"message":"Invalid credentials","success":false}"#,
        );
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(err.message(), Some("Invalid credentials"));
    }

    #[test]
    fn test_from_status_maps_server_errors() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(matches!(err, ApiError::ServerError { status: 502, .. }));
        assert_eq!(err.message(), None);
    }

    #[test]
    fn test_from_status_other_codes_are_rejected() {
        let err = ApiError::from_status(StatusCode::CONFLICT, r#"{"message":"Email taken"}"#);
        assert!(matches!(err, ApiError::Rejected { status: 409, .. }));
        assert_eq!(err.message(), Some("Email taken"));
    }

    #[test]
    fn test_blank_message_is_ignored() {
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"message":"  "}"#);
        assert_eq!(err.message(), None);
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(ApiError::truncate_body("short"), "short");
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("510 total bytes"));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_BODY_LENGTH);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.contains("truncated"));
    }
}
