//! Authentication module for managing the user session and credentials.
//!
//! This module provides:
//! - `SessionManager`: login, registration, password reset, federated
//!   sign-in, token refresh, restore and logout
//! - `Session`: the signed-in identity as seen by the UI
//! - `Credentials`: access/refresh tokens kept in the secret tier
//! - `FederatedExchange`: pluggable OAuth token exchange
//!
//! Session and credentials are always written and cleared together.

pub mod credentials;
pub mod error;
pub mod federation;
pub mod manager;
pub mod session;

pub use credentials::Credentials;
pub use error::AuthError;
pub use federation::{
    BackendExchange, FederatedExchange, FederatedIdentity, IdentityProvider, ProviderResponse,
};
pub use manager::{SessionManager, CREDENTIALS_KEY, SESSION_KEY};
pub use session::Session;
