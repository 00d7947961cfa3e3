//! Named secret storage.
//!
//! Secrets are addressed by `(service, key)`. [`KeyringStore`] keeps them in
//! the operating system's secret store and is the default. [`FileStore`]
//! keeps them in a single JSON document with restrictive permissions, for
//! hosts without a usable keyring. [`MemoryStore`] keeps them in memory for
//! tests.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

/// Errors from a [`CredentialStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No secret is stored under the requested name.
    #[error("no secret stored for {service}/{key}")]
    NotFound { service: String, key: String },

    /// Reading or writing the backing file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing file exists but could not be parsed.
    #[error("secret store {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// A value could not be serialized for storage.
    #[error("failed to encode secret: {0}")]
    Encode(String),

    /// The OS keyring refused or failed the operation.
    #[error("keyring access failed for {service}/{key}: {source}")]
    Keyring {
        service: String,
        key: String,
        #[source]
        source: keyring::Error,
    },
}

impl StoreError {
    fn not_found(service: &str, key: &str) -> Self {
        Self::NotFound {
            service: service.to_string(),
            key: key.to_string(),
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Returns true if the secret simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// The names under which this tool keeps its secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeys {
    /// Service namespace shared by all keys.
    pub service: String,
    /// Key for the OAuth client registration (`client_secret.json`).
    pub registration: String,
    /// Key for the cached access credential.
    pub credential: String,
}

impl Default for SecretKeys {
    fn default() -> Self {
        Self {
            service: "oooweek".to_string(),
            registration: "client-secret".to_string(),
            credential: "oauth-token".to_string(),
        }
    }
}

/// Get/set/delete of named secrets.
pub trait CredentialStore: Send + Sync {
    /// Returns the secret, or [`StoreError::NotFound`].
    fn get(&self, service: &str, key: &str) -> Result<String, StoreError>;

    /// Stores `secret`, replacing any previous value.
    fn set(&self, service: &str, key: &str, secret: &str) -> Result<(), StoreError>;

    /// Deletes the secret, or returns [`StoreError::NotFound`].
    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError>;
}

type Secrets = BTreeMap<String, BTreeMap<String, String>>;

/// File-backed secret store.
///
/// The file holds `{service: {key: secret}}` as JSON. Writes go to a temp
/// file that is renamed over the original, and the file is chmod 0600 on
/// unix.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Secrets, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Secrets::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Secrets::new());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn write(&self, secrets: &Secrets) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let content =
            serde_json::to_string_pretty(secrets).map_err(|e| StoreError::Encode(e.to_string()))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| StoreError::io(&temp_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&temp_path, perms).map_err(|e| StoreError::io(&temp_path, e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        debug!("saved secrets to {:?}", self.path);
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, service: &str, key: &str) -> Result<String, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read()?
            .get(service)
            .and_then(|keys| keys.get(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(service, key))
    }

    fn set(&self, service: &str, key: &str, secret: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut secrets = self.read()?;
        secrets
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), secret.to_string());
        self.write(&secrets)
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut secrets = self.read()?;

        let keys = secrets
            .get_mut(service)
            .ok_or_else(|| StoreError::not_found(service, key))?;
        if keys.remove(key).is_none() {
            return Err(StoreError::not_found(service, key));
        }
        if keys.is_empty() {
            secrets.remove(service);
        }

        self.write(&secrets)
    }
}

/// Secret store backed by the OS keyring.
///
/// Each `(service, key)` pair is one keyring entry with `key` as the user
/// name.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, key: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(service, key).map_err(|e| keyring_error(service, key, e))
    }
}

fn keyring_error(service: &str, key: &str, error: keyring::Error) -> StoreError {
    match error {
        keyring::Error::NoEntry => StoreError::not_found(service, key),
        source => StoreError::Keyring {
            service: service.to_string(),
            key: key.to_string(),
            source,
        },
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, service: &str, key: &str) -> Result<String, StoreError> {
        Self::entry(service, key)?
            .get_password()
            .map_err(|e| keyring_error(service, key, e))
    }

    fn set(&self, service: &str, key: &str, secret: &str) -> Result<(), StoreError> {
        Self::entry(service, key)?
            .set_password(secret)
            .map_err(|e| keyring_error(service, key, e))?;
        debug!("saved {}/{} to the keyring", service, key);
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        Self::entry(service, key)?
            .delete_credential()
            .map_err(|e| keyring_error(service, key, e))
    }
}

/// In-memory secret store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    secrets: Mutex<Secrets>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, service: &str, key: &str) -> Result<String, StoreError> {
        let secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets
            .get(service)
            .and_then(|keys| keys.get(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(service, key))
    }

    fn set(&self, service: &str, key: &str, secret: &str) -> Result<(), StoreError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), secret.to_string());
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets
            .get_mut(service)
            .and_then(|keys| keys.remove(key))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(service, key))
    }
}

/// Deletes a secret, treating an absent secret as success.
///
/// Returns whether something was deleted.
pub fn delete_if_present(
    store: &dyn CredentialStore,
    service: &str,
    key: &str,
) -> Result<bool, StoreError> {
    match store.delete(service, key) {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("secrets.json"));
        (dir, store)
    }

    #[test]
    fn default_keys() {
        let keys = SecretKeys::default();
        assert_eq!(keys.service, "oooweek");
        assert_eq!(keys.registration, "client-secret");
        assert_eq!(keys.credential, "oauth-token");
    }

    #[test]
    fn file_store_roundtrip() {
        let (_dir, store) = file_store();

        assert!(store.get("svc", "key").unwrap_err().is_not_found());

        store.set("svc", "key", "secret-1").unwrap();
        store.set("svc", "other", "secret-2").unwrap();
        assert_eq!(store.get("svc", "key").unwrap(), "secret-1");

        let reopened = FileStore::new(store.path());
        assert_eq!(reopened.get("svc", "other").unwrap(), "secret-2");
    }

    #[test]
    fn file_store_delete() {
        let (_dir, store) = file_store();
        store.set("svc", "key", "secret").unwrap();

        store.delete("svc", "key").unwrap();
        assert!(store.get("svc", "key").unwrap_err().is_not_found());
        assert!(store.delete("svc", "key").unwrap_err().is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = file_store();
        store.set("svc", "key", "secret").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_store_reports_corruption() {
        let (_dir, store) = file_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "not json").unwrap();

        let err = store.get("svc", "key").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn keyring_missing_entry_is_not_found() {
        let err = keyring_error("svc", "key", keyring::Error::NoEntry);
        assert!(err.is_not_found());

        let err = keyring_error(
            "svc",
            "key",
            keyring::Error::Invalid("user".to_string(), "empty".to_string()),
        );
        assert!(matches!(err, StoreError::Keyring { .. }));
        assert!(err.to_string().starts_with("keyring access failed for svc/key"));
    }

    #[test]
    fn keyring_store_reports_absent_secrets() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let store = KeyringStore::new();

        assert!(store.get("oooweek-test", "absent").unwrap_err().is_not_found());
        assert!(store.delete("oooweek-test", "absent").unwrap_err().is_not_found());
        assert!(!delete_if_present(&store, "oooweek-test", "absent").unwrap());
        store.set("oooweek-test", "written", "secret").unwrap();
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("svc", "key", "secret").unwrap();
        assert_eq!(store.get("svc", "key").unwrap(), "secret");
        store.delete("svc", "key").unwrap();
        assert!(store.get("svc", "key").unwrap_err().is_not_found());
    }

    #[test]
    fn delete_if_present_is_idempotent() {
        let store = MemoryStore::new();
        store.set("svc", "key", "secret").unwrap();

        assert!(delete_if_present(&store, "svc", "key").unwrap());
        assert!(!delete_if_present(&store, "svc", "key").unwrap());
    }
}
