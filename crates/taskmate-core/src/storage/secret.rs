use keyring::Entry;
use tracing::debug;

use super::{KeyValueStore, StorageError};

/// Keychain service name used for every secret entry
pub const DEFAULT_SERVICE_NAME: &str = "taskmate";

/// OS keychain store for credential material.
/// Each key is a separate keychain entry under one service name.
pub struct SecretStore {
    service: String,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for SecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        debug!(service = %self.service, key, "Secret entry written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        assert_eq!(SecretStore::default().service(), "taskmate");
        assert_eq!(SecretStore::with_service("taskmate-dev").service(), "taskmate-dev");
    }
}
