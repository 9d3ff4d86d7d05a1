//! Core library for the Taskmate authentication flow.
//!
//! This crate owns everything below the screens of the mobile app:
//!
//! - `api`: `ApiClient` for the Taskmate REST API (login, register,
//!   password reset, token refresh, federated callbacks)
//! - `auth`: `SessionManager`, the single owner of the signed-in identity
//!   and its credential material
//! - `storage`: the profile tier (JSON files) and the secret tier (OS keychain)
//! - `deeplink`: parsing of `taskmate://` links that resume a flow
//! - `config`: on-disk configuration and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod deeplink;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError};
pub use auth::{
    AuthError, BackendExchange, Credentials, FederatedExchange, FederatedIdentity,
    IdentityProvider, ProviderResponse, Session, SessionManager,
};
pub use config::Config;
pub use deeplink::{DeepLink, DeepLinkError, ResumeAction};
pub use models::{Ack, ApiEnvelope, AuthPayload, User};
pub use storage::{KeyValueStore, MemoryStore, ProfileStore, SecretStore, StorageError};
