//! Wire models for the Taskmate API.
//!
//! - `ApiEnvelope`: the `{ data, message, status, success }` wrapper every
//!   endpoint responds with
//! - `AuthPayload`: tokens plus user profile returned by auth endpoints
//! - `User`: the profile the server knows about

pub mod envelope;
pub mod user;

pub use envelope::{Ack, ApiEnvelope, AuthPayload, ResetTokenResponse};
pub use user::User;
