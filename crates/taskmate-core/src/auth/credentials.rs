use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::IdentityProvider;

/// Credential material for the signed-in user, kept in the secret tier.
///
/// Tokens are optional because the local login endpoint may rely on a
/// server-side cookie instead of returning bearer tokens. The record is
/// written even then, so the two storage tiers always move together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Set when the identity came from a federated provider
    #[serde(default)]
    pub provider: Option<IdentityProvider>,
    pub issued_at: DateTime<Utc>,
}

impl Credentials {
    /// Credentials obtained from the local email/password endpoints
    pub fn local(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            provider: None,
            issued_at: Utc::now(),
        }
    }

    pub fn federated(
        provider: IdentityProvider,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            provider: Some(provider),
            issued_at: Utc::now(),
        }
    }

    pub fn is_federated(&self) -> bool {
        self.provider.is_some()
    }

    /// New record after a token refresh. Keeps the old refresh token unless
    /// the server rotated it.
    pub fn rotated(&self, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            provider: self.provider,
            issued_at: Utc::now(),
        }
    }
}

// Tokens never show up in logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("provider", &self.provider)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
