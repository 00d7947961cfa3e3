//! OAuth credential type and its cached copy in the secret store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{CredentialStore, SecretKeys, StoreError};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Margin subtracted from the lifetime so a token is never used right at
/// its expiry. Never more than half the lifetime.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Upper bound on the lifetime taken from the token endpoint.
const MAX_EXPIRES_IN_SECS: i64 = 366 * 24 * 3600;

/// An access credential issued by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token, when the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// When the access token stops being usable.
    pub expiry: DateTime<Utc>,

    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Credential {
    /// Creates a credential issued at `now` that lives for `expires_in_secs`.
    ///
    /// A lifetime of zero or less yields a credential that is already
    /// expired at `now`.
    pub fn issued_at(
        now: DateTime<Utc>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        token_type: Option<String>,
    ) -> Self {
        let lifetime = expires_in_secs
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .clamp(0, MAX_EXPIRES_IN_SECS);
        let usable = lifetime - EXPIRY_MARGIN_SECS.min(lifetime / 2);
        let expiry = Duration::try_seconds(usable)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(now);

        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry,
            token_type,
        }
    }

    /// Returns true if the credential is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Returns true if the credential is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Serializes the credential for storage.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a stored credential.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Reads a usable cached credential.
///
/// Missing, corrupt and expired entries all yield `None`; corruption is
/// logged at debug level.
pub fn load_cached(store: &dyn CredentialStore, keys: &SecretKeys) -> Option<Credential> {
    let raw = match store.get(&keys.service, &keys.credential) {
        Ok(raw) => raw,
        Err(StoreError::NotFound { .. }) => {
            debug!("no cached credential");
            return None;
        }
        Err(e) => {
            debug!("failed to read cached credential: {}", e);
            return None;
        }
    };

    match Credential::from_json(&raw) {
        Ok(credential) if credential.is_expired() => {
            debug!("cached credential expired at {}", credential.expiry);
            None
        }
        Ok(credential) => Some(credential),
        Err(e) => {
            debug!("ignoring corrupt cached credential: {}", e);
            None
        }
    }
}

/// Stores `credential` under the credential key.
pub fn save(
    store: &dyn CredentialStore,
    keys: &SecretKeys,
    credential: &Credential,
) -> Result<(), StoreError> {
    let json = credential
        .to_json()
        .map_err(|e| StoreError::Encode(e.to_string()))?;
    store.set(&keys.service, &keys.credential, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::store::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn expiry_includes_margin() {
        let cred = Credential::issued_at(now(), "access", None, Some(3600), None);
        assert_eq!(cred.expiry, now() + Duration::seconds(3540));
        assert!(!cred.is_expired_at(now()));
        assert!(cred.is_expired_at(now() + Duration::seconds(3540)));
    }

    #[test]
    fn missing_lifetime_defaults_to_one_hour() {
        let cred = Credential::issued_at(now(), "access", None, None, Some("Bearer".to_string()));
        assert_eq!(cred.expiry, now() + Duration::seconds(3540));
    }

    #[test]
    fn short_lifetimes_are_still_usable() {
        let cred = Credential::issued_at(now(), "access", None, Some(30), None);
        assert_eq!(cred.expiry, now() + Duration::seconds(15));
        assert!(!cred.is_expired_at(now()));

        let cred = Credential::issued_at(now(), "access", None, Some(1), None);
        assert!(!cred.is_expired_at(now()));
    }

    #[test]
    fn non_positive_lifetime_is_expired() {
        for lifetime in [0, -10, i64::MIN] {
            let cred = Credential::issued_at(now(), "access", None, Some(lifetime), None);
            assert!(cred.is_expired_at(now()));
        }
    }

    #[test]
    fn huge_lifetime_is_capped() {
        let cred = Credential::issued_at(now(), "access", None, Some(i64::MAX), None);
        assert_eq!(
            cred.expiry,
            now() + Duration::seconds(MAX_EXPIRES_IN_SECS - EXPIRY_MARGIN_SECS)
        );
        let parsed = Credential::from_json(&cred.to_json().unwrap()).unwrap();
        assert_eq!(parsed, cred);
    }

    #[test]
    fn json_roundtrip() {
        let cred = Credential::issued_at(
            now(),
            "access",
            Some("refresh".to_string()),
            Some(3600),
            Some("Bearer".to_string()),
        );
        let parsed = Credential::from_json(&cred.to_json().unwrap()).unwrap();
        assert_eq!(parsed, cred);
    }

    #[test]
    fn load_cached_returns_fresh_credential() {
        let store = MemoryStore::new();
        let keys = SecretKeys::default();
        let cred = Credential::issued_at(Utc::now(), "fresh", None, Some(3600), None);
        save(&store, &keys, &cred).unwrap();

        assert_eq!(load_cached(&store, &keys), Some(cred));
    }

    #[test]
    fn load_cached_skips_expired_and_corrupt() {
        let store = MemoryStore::new();
        let keys = SecretKeys::default();
        assert!(load_cached(&store, &keys).is_none());

        let expired = Credential::issued_at(
            Utc::now() - Duration::hours(2),
            "stale",
            None,
            Some(3600),
            None,
        );
        store
            .set(&keys.service, &keys.credential, &expired.to_json().unwrap())
            .unwrap();
        assert!(load_cached(&store, &keys).is_none());

        store.set(&keys.service, &keys.credential, "{broken").unwrap();
        assert!(load_cached(&store, &keys).is_none());
    }
}
