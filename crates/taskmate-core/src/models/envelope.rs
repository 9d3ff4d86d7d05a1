use serde::{Deserialize, Serialize};

use super::User;

/// Standard response wrapper used by every Taskmate endpoint.
/// All fields are optional: error bodies often carry only `message`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: Option<T>,
    pub message: Option<String>,
    pub status: Option<u16>,
    pub success: Option<bool>,
}

impl<T> ApiEnvelope<T> {
    /// Envelope for an empty response body
    pub fn empty() -> Self {
        Self {
            data: None,
            message: None,
            status: None,
            success: None,
        }
    }

    /// The server explicitly flagged the request as failed despite a 2xx status
    pub fn is_rejected(&self) -> bool {
        self.success == Some(false)
    }
}

/// `data` of the login, register, refresh-token and federated callback endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

/// Body of `GET /user/reset-password-web/{resetId}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetTokenResponse {
    #[serde(rename = "resetToken")]
    pub reset_token: String,
}

/// Acknowledgement of a request that changes nothing locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Ack {
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_user_only() {
        let envelope: ApiEnvelope<AuthPayload> = serde_json::from_str(
            r#"{"data":{"user":{"id":"1","email":"a@b.com","name":"A"}},"success":true}"#,
        )
        .unwrap();
        let payload = envelope.data.unwrap();
        assert!(payload.access_token.is_none());
        assert_eq!(payload.user.unwrap().email, "a@b.com");
        assert_eq!(envelope.success, Some(true));
    }

    #[test]
    fn test_envelope_with_tokens() {
        let envelope: ApiEnvelope<AuthPayload> = serde_json::from_str(
            r#"{"data":{"accessToken":"at","refreshToken":"rt","user":{"id":"1","email":"a@b.com","name":"A"}},"message":"ok","status":200,"success":true}"#,
        )
        .unwrap();
        let payload = envelope.data.unwrap();
        assert_eq!(payload.access_token.as_deref(), Some("at"));
        assert_eq!(payload.refresh_token.as_deref(), Some("rt"));
        assert_eq!(envelope.status, Some(200));
    }

    #[test]
    fn test_error_body_parses_without_data() {
        let envelope: ApiEnvelope<AuthPayload> =
            serde_json::from_str(r#"{"message":"Invalid credentials"}"#).unwrap();
        assert!(envelope.data.is_none());
        assert_eq!(envelope.message.as_deref(), Some("Invalid credentials"));
        assert!(!envelope.is_rejected());
    }

    #[test]
    fn test_null_data_is_none() {
        let envelope: ApiEnvelope<AuthPayload> =
            serde_json::from_str(r#"{"data":null,"success":false}"#).unwrap();
        assert!(envelope.data.is_none());
        assert!(envelope.is_rejected());
    }
}
