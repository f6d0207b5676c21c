use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, sync::Arc};

/// Persisted backend session, as stored by the extension popup after login.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub auth_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user_id: String,
    pub user_login: String,
    /// Expiry as milliseconds since the Unix epoch.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub token_expiry: Option<DateTime<Utc>>,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &"***")
            .field("token_type", &self.token_type)
            .field("user_id", &self.user_id)
            .field("user_login", &self.user_login)
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expiry.is_some_and(|expiry| now > expiry)
    }

    /// Usable credentials carry a token & identify a user.
    pub fn is_complete(&self) -> bool {
        !self.auth_token.is_empty() && !self.user_id.is_empty() && !self.user_login.is_empty()
    }

    /// `Authorization` header value.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.auth_token)
    }
}

/// Persisted credential storage owned by the host environment.
#[async_trait]
pub trait CredentialStore: Debug + Send + Sync + 'static {
    /// Read the stored [`Credentials`], if any. Implementations return `None` when the
    /// underlying storage is unavailable.
    async fn load(&self) -> Option<Credentials>;

    async fn clear(&self);
}

/// Load usable [`Credentials`] from the store, clearing them if they have expired.
pub async fn load_valid<Store>(store: &Store, now: DateTime<Utc>) -> Option<Credentials>
where
    Store: CredentialStore + ?Sized,
{
    let credentials = store.load().await?;

    if credentials.is_expired(now) {
        store.clear().await;
        return None;
    }

    credentials.is_complete().then_some(credentials)
}

/// In-memory [`CredentialStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    credentials: Arc<RwLock<Option<Credentials>>>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials: Arc::new(RwLock::new(credentials)),
        }
    }

    pub fn set(&self, credentials: Credentials) {
        *self.credentials.write() = Some(credentials);
    }

    pub fn get(&self) -> Option<Credentials> {
        self.credentials.read().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Option<Credentials> {
        self.get()
    }

    async fn clear(&self) {
        self.credentials.write().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn credentials(expiry: Option<DateTime<Utc>>) -> Credentials {
        Credentials {
            auth_token: "token".to_string(),
            token_type: default_token_type(),
            user_id: "7".to_string(),
            user_login: "trader".to_string(),
            token_expiry: expiry,
        }
    }

    #[test]
    fn test_credentials_de_storage_keys() {
        let input = r#"{
            "authToken": "abc",
            "userId": "42",
            "userLogin": "trader",
            "tokenExpiry": 1700000000000
        }"#;

        let actual = serde_json::from_str::<Credentials>(input).unwrap();
        assert_eq!(actual.token_type, "Bearer");
        assert_eq!(actual.authorization(), "Bearer abc");
        assert_eq!(
            actual.token_expiry,
            DateTime::from_timestamp_millis(1_700_000_000_000)
        );
        assert!(!format!("{actual:?}").contains("abc"));
    }

    #[tokio::test]
    async fn test_load_valid_clears_expired() {
        let now = Utc::now();
        let store = MemoryCredentialStore::new(Some(credentials(Some(now - TimeDelta::seconds(1)))));

        assert_eq!(load_valid(&store, now).await, None);
        assert_eq!(store.get(), None);

        let valid = credentials(Some(now + TimeDelta::hours(1)));
        store.set(valid.clone());
        assert_eq!(load_valid(&store, now).await, Some(valid));

        let mut incomplete = credentials(None);
        incomplete.user_login.clear();
        store.set(incomplete);
        assert_eq!(load_valid(&store, now).await, None);
        assert!(store.get().is_some());
    }
}
