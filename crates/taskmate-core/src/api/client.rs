//! API client for communicating with the Taskmate REST API.
//!
//! This module provides the `ApiClient` struct for the authentication
//! endpoints: login, registration, password reset, token refresh, logout
//! and the federated (OAuth) callback.

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::models::{ApiEnvelope, AuthPayload, ResetTokenResponse};

use super::ApiError;

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ResetPasswordRequest<'a> {
    token: &'a str,
    #[serde(rename = "newPassword")]
    new_password: &'a str,
    #[serde(rename = "confirmPassword")]
    confirm_password: &'a str,
}

#[derive(Serialize)]
struct RefreshTokenRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct FederatedCallbackRequest<'a> {
    token: &'a str,
}

/// API client for the Taskmate backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (e.g. `https://host/api/v1`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("access token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, body = %ApiError::truncate_body(&body), "Request failed");
            Err(ApiError::from_status(status, &body))
        }
    }

    fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
        serde_json::from_str(text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", e, ApiError::truncate_body(text))))
    }

    fn parse_envelope<T: DeserializeOwned>(text: &str) -> Result<ApiEnvelope<T>, ApiError> {
        if text.trim().is_empty() {
            return Ok(ApiEnvelope::empty());
        }
        Self::parse_body(text)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.headers(self.auth_headers()?).send().await?;
        let response = Self::check_response(response).await?;
        Ok(response.text().await?)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let text = self.send(self.client.post(url).json(body)).await?;
        Self::parse_envelope(&text)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let text = self.send(self.client.get(url)).await?;
        Self::parse_body(&text)
    }

    // ===== Authentication =====

    /// Exchange email and password for a user profile and tokens
    pub async fn login(&self, email: &str, password: &str) -> Result<ApiEnvelope<AuthPayload>, ApiError> {
        self.post(&["user", "login"], &LoginRequest { email, password })
            .await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<ApiEnvelope<AuthPayload>, ApiError> {
        self.post(
            &["user", "register"],
            &RegisterRequest {
                name,
                email,
                password,
            },
        )
        .await
    }

    /// Ask the server to email a password reset link
    pub async fn forgot_password(&self, email: &str) -> Result<ApiEnvelope<serde_json::Value>, ApiError> {
        self.post(&["user", "forgot-password"], &ForgotPasswordRequest { email })
            .await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<ApiEnvelope<serde_json::Value>, ApiError> {
        self.post(
            &["user", "reset-password"],
            &ResetPasswordRequest {
                token,
                new_password,
                confirm_password,
            },
        )
        .await
    }

    /// Turn the id from an emailed web link into the token the app needs
    pub async fn resolve_web_reset(&self, reset_id: &str) -> Result<String, ApiError> {
        let response: ResetTokenResponse = self
            .get(&["user", "reset-password-web", reset_id])
            .await?;
        Ok(response.reset_token)
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<ApiEnvelope<AuthPayload>, ApiError> {
        self.post(&["user", "refresh-token"], &RefreshTokenRequest { refresh_token })
            .await
    }

    /// Invalidate the current bearer token server-side
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.post::<serde_json::Value, _>(&["user", "logout"], &serde_json::json!({}))
            .await?;
        Ok(())
    }

    /// Hand an identity provider's access token to the backend
    pub async fn federated_callback(
        &self,
        provider: &str,
        token: &str,
    ) -> Result<ApiEnvelope<AuthPayload>, ApiError> {
        self.post(
            &["auth", provider, "callback"],
            &FederatedCallbackRequest { token },
        )
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&format!("{}/api/v1", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", Duration::from_secs(1)),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            ApiClient::new("mailto:someone@example.com", Duration::from_secs(1)),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let client = ApiClient::new("https://api.example.com/api/v1/", Duration::from_secs(1)).unwrap();
        let url = client.endpoint(&["user", "login"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/v1/user/login");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = ApiClient::new("https://api.example.com/api/v1", Duration::from_secs(1)).unwrap();
        let url = client
            .endpoint(&["user", "reset-password-web", "a/b c"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/v1/user/reset-password-web/a%2Fb%20c"
        );
    }

    #[test]
    fn test_with_token_shares_base_url() {
        let client = ApiClient::new("https://api.example.com/api/v1", Duration::from_secs(1)).unwrap();
        assert!(!client.has_token());
        let authed = client.with_token("abc".to_string());
        assert!(authed.has_token());
        assert_eq!(authed.base_url(), client.base_url());
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/user/login"))
            .and(body_json(serde_json::json!({"email": "a@b.com", "password": "secret1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"user": {"id": "1", "email": "a@b.com", "name": "A"}},
                "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = client_for(&server).await.login("a@b.com", "secret1").await.unwrap();
        assert_eq!(envelope.data.unwrap().user.unwrap().id, "1");
    }

    #[tokio::test]
    async fn test_error_status_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/user/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"message": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).await.login("a@b.com", "nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(err.message(), Some("Invalid credentials"));
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/user/register"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .register("A", "a@b.com", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_reset_password_uses_camel_case_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/user/reset-password"))
            .and(body_json(serde_json::json!({
                "token": "tok123",
                "newPassword": "newpw123",
                "confirmPassword": "newpw123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = client_for(&server)
            .await
            .reset_password("tok123", "newpw123", "newpw123")
            .await
            .unwrap();
        assert_eq!(envelope.success, Some(true));
    }

    #[tokio::test]
    async fn test_logout_sends_bearer_token_and_accepts_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/user/logout"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await.with_token("at-1".to_string());
        client.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_web_reset_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/user/reset-password-web/abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"resetToken": "tok123"})),
            )
            .mount(&server)
            .await;

        let token = client_for(&server).await.resolve_web_reset("abc123").await.unwrap();
        assert_eq!(token, "tok123");
    }

    #[tokio::test]
    async fn test_federated_callback_posts_provider_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/google/callback"))
            .and(body_json(serde_json::json!({"token": "google-at"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"accessToken": "at", "user": {"id": "9", "email": "g@x.com", "name": "G"}},
                "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = client_for(&server)
            .await
            .federated_callback("google", "google-at")
            .await
            .unwrap();
        assert_eq!(envelope.data.unwrap().access_token.as_deref(), Some("at"));
    }
}
