//! `taskmate://` links that resume a flow started outside the app.
//!
//! Recognised forms:
//! - `taskmate://reset-password?token=T` and `taskmate://reset-password/T`
//! - `taskmate://oauth-callback?provider=P&token=T`

use reqwest::Url;
use thiserror::Error;

use crate::auth::IdentityProvider;

pub const SCHEME: &str = "taskmate";

const RESET_PASSWORD_ROUTE: &str = "reset-password";
const OAUTH_CALLBACK_ROUTE: &str = "oauth-callback";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeepLinkError {
    #[error("Invalid link: {0}")]
    InvalidUrl(String),

    #[error("Unsupported link scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Unknown link route: {0}")]
    UnknownRoute(String),

    #[error("Link is missing the {0} parameter")]
    MissingParameter(&'static str),

    #[error("Unsupported identity provider: {0}")]
    UnknownProvider(String),
}

/// What the app should do after being opened through a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeAction {
    /// Continue with `SessionManager::confirm_password_reset`
    ResetPassword { token: String },
    /// Continue with `SessionManager::complete_federated_login`
    FederatedCallback {
        provider: IdentityProvider,
        token: String,
    },
}

pub struct DeepLink;

impl DeepLink {
    pub fn parse(link: &str) -> Result<ResumeAction, DeepLinkError> {
        let url = Url::parse(link.trim()).map_err(|e| DeepLinkError::InvalidUrl(e.to_string()))?;
        if url.scheme() != SCHEME {
            return Err(DeepLinkError::UnsupportedScheme(url.scheme().to_string()));
        }

        let route = url.host_str().unwrap_or_default();
        let path_param = url
            .path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))
            .map(str::to_string);

        match route {
            RESET_PASSWORD_ROUTE => {
                let token = Self::query(&url, "token")
                    .or(path_param)
                    .ok_or(DeepLinkError::MissingParameter("token"))?;
                Ok(ResumeAction::ResetPassword { token })
            }
            OAUTH_CALLBACK_ROUTE => {
                let provider = Self::query(&url, "provider")
                    .ok_or(DeepLinkError::MissingParameter("provider"))?;
                let provider = provider
                    .parse::<IdentityProvider>()
                    .map_err(|_| DeepLinkError::UnknownProvider(provider))?;
                let token =
                    Self::query(&url, "token").ok_or(DeepLinkError::MissingParameter("token"))?;
                Ok(ResumeAction::FederatedCallback { provider, token })
            }
            other => Err(DeepLinkError::UnknownRoute(other.to_string())),
        }
    }

    /// Link the web reset page opens to hand the token to the app
    pub fn reset_password_url(token: &str) -> Result<String, DeepLinkError> {
        let base = format!("{SCHEME}://{RESET_PASSWORD_ROUTE}");
        let url = Url::parse_with_params(&base, &[("token", token)])
            .map_err(|e| DeepLinkError::InvalidUrl(e.to_string()))?;
        Ok(url.to_string())
    }

    fn query(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    }
}
