//! REST API client module for the Taskmate backend.
//!
//! This module provides the `ApiClient` used by the session manager for
//! every authentication-affecting request. All endpoints answer with the
//! `{ data, message, status, success }` envelope.
//!
//! Authenticated calls carry the access token as a bearer header.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
