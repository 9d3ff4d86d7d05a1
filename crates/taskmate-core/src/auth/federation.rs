//! Federated (OAuth) sign-in.
//!
//! The provider SDK runs in the UI layer and hands back an access token.
//! Turning that token into a Taskmate identity is a pluggable capability,
//! so the session manager never depends on a particular provider.

use std::fmt;
use std::str::FromStr;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::api::ApiClient;
use crate::models::User;

use super::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum IdentityProvider {
    Google,
    Facebook,
}

impl IdentityProvider {
    /// Path segment and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProvider::Google => "google",
            IdentityProvider::Facebook => "facebook",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            IdentityProvider::Google => "Google",
            IdentityProvider::Facebook => "Facebook",
        }
    }
}

impl fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "oauth_google" => Ok(IdentityProvider::Google),
            "facebook" | "oauth_facebook" => Ok(IdentityProvider::Facebook),
            other => Err(AuthError::Validation(format!(
                "Unsupported identity provider: {other}"
            ))),
        }
    }
}

/// What the provider SDK produced after the user consented.
#[derive(Clone)]
pub struct ProviderResponse {
    pub provider: IdentityProvider,
    pub access_token: String,
}

impl fmt::Debug for ProviderResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderResponse")
            .field("provider", &self.provider)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Identity established by a federated exchange.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub user: User,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Exchange a provider response for a Taskmate identity.
pub trait FederatedExchange: Send + Sync {
    fn exchange_federated_token<'a>(
        &'a self,
        response: &'a ProviderResponse,
    ) -> BoxFuture<'a, Result<FederatedIdentity, AuthError>>;
}

/// Exchange through the backend's `/auth/{provider}/callback` endpoint.
pub struct BackendExchange {
    api: ApiClient,
}

impl BackendExchange {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn exchange(&self, response: &ProviderResponse) -> Result<FederatedIdentity, AuthError> {
        let provider = response.provider;
        let failed = format!(
            "Failed to sign in with {}. Please try again.",
            provider.display_name()
        );
        let invalid = format!("Invalid {} sign-in response", provider.display_name());

        debug!(%provider, "Exchanging provider token with backend");
        let envelope = self
            .api
            .federated_callback(provider.as_str(), &response.access_token)
            .await
            .map_err(|e| {
                error!(%provider, error = %e, "Federated callback failed");
                AuthError::from_api_with(&e, &failed, &invalid)
            })?;

        if envelope.is_rejected() {
            return Err(AuthError::Network(envelope.message.unwrap_or(failed)));
        }

        let payload = envelope
            .data
            .ok_or_else(|| AuthError::Validation(invalid.clone()))?;
        let user = payload.user.ok_or(AuthError::Validation(invalid))?;

        Ok(FederatedIdentity {
            user,
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
        })
    }
}

impl FederatedExchange for BackendExchange {
    fn exchange_federated_token<'a>(
        &'a self,
        response: &'a ProviderResponse,
    ) -> BoxFuture<'a, Result<FederatedIdentity, AuthError>> {
        Box::pin(self.exchange(response))
    }
}
