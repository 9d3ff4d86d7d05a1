use thiserror::Error;

use crate::api::ApiError;
use crate::storage::StorageError;

/// Failure of an authentication operation.
///
/// `Display` is the user-facing text: for `Network` and `Validation` it is
/// exactly the carried message.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The remote call failed or the server rejected it
    #[error("{0}")]
    Network(String),

    /// The server answered but the payload was unusable
    #[error("{0}")]
    Validation(String),

    #[error("Could not save your session: {0}")]
    Storage(#[from] StorageError),

    #[error("Another authentication request is already in progress")]
    Busy,
}

/// User-facing messages for one operation when the server gives none.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fallback {
    /// Request failed without a server message
    pub failed: &'static str,
    /// Server answered 2xx but the payload was unusable
    pub invalid: &'static str,
}

pub(crate) const LOGIN: Fallback = Fallback {
    failed: "Login failed",
    invalid: "Invalid login response",
};

pub(crate) const REGISTER: Fallback = Fallback {
    failed: "Registration failed",
    invalid: "Invalid register response",
};

pub(crate) const RESET_LINK: Fallback = Fallback {
    failed: "Failed to send reset link",
    invalid: "Invalid reset link response",
};

pub(crate) const RESET_PASSWORD: Fallback = Fallback {
    failed: "Password reset failed",
    invalid: "Invalid password reset response",
};

pub(crate) const REFRESH: Fallback = Fallback {
    failed: "Failed to refresh token. Please log in again.",
    invalid: "Invalid refresh response",
};

impl AuthError {
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub(crate) fn from_api(err: &ApiError, fallback: Fallback) -> Self {
        Self::from_api_with(err, fallback.failed, fallback.invalid)
    }

    pub(crate) fn from_api_with(err: &ApiError, failed: &str, invalid: &str) -> Self {
        match err {
            ApiError::InvalidResponse(_) => AuthError::Validation(invalid.to_string()),
            other => AuthError::Network(other.message().unwrap_or(failed).to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_server_message_is_used_verbatim() {
        let api = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"message":"Invalid credentials"}"#);
        let err = AuthError::from_api(&api, LOGIN);
        assert!(matches!(err, AuthError::Network(_)));
        assert_eq!(err.message(), "Invalid credentials");
    }

    #[test]
    fn test_fallback_when_message_absent() {
        let api = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(AuthError::from_api(&api, LOGIN).message(), "Login failed");
        assert_eq!(AuthError::from_api(&api, REGISTER).message(), "Registration failed");
    }

    #[test]
    fn test_invalid_response_maps_to_validation() {
        let api = ApiError::InvalidResponse("expected value".to_string());
        let err = AuthError::from_api(&api, REGISTER);
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(err.message(), "Invalid register response");
    }
}
