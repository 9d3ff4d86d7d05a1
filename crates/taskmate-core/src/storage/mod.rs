//! Durable key-value storage used by the session manager.
//!
//! Two tiers with different sensitivity:
//! - `ProfileStore`: display data (the signed-in user's profile) as JSON
//!   files in the cache directory
//! - `SecretStore`: credential material in the OS keychain via `keyring`
//!
//! `MemoryStore` backs ephemeral sessions and tests.

pub mod error;
pub mod memory;
pub mod profile;
pub mod secret;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use profile::ProfileStore;
pub use secret::SecretStore;

/// Minimal get/set/remove contract shared by both storage tiers.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, not an error.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
