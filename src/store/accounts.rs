//! Account store implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::LOGIN_VALIDITY_DAYS;

/// Errors that can occur while reading or writing the account store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access the account data file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse the account data file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single user's persisted account state.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserAccount {
    /// When the user last completed authentication. Absent until the
    /// first successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_time: Option<DateTime<Utc>>,

    /// Lowercase trigger keyword to reply text.
    #[serde(default)]
    pub keywords: HashMap<String, String>,
}

impl UserAccount {
    /// Whether the login is still within its validity window at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.login_time
            .is_some_and(|t| now < t + Duration::days(LOGIN_VALIDITY_DAYS))
    }

    /// Whole days left until the login expires, if it is still active.
    #[must_use]
    pub fn days_remaining_at(&self, now: DateTime<Utc>) -> Option<i64> {
        let login_time = self.login_time?;
        let expires = login_time + Duration::days(LOGIN_VALIDITY_DAYS);
        if now < expires {
            Some((expires - now).num_days())
        } else {
            None
        }
    }
}

/// Durable mapping from user id to account state.
///
/// Every mutation rewrites the backing JSON file before returning, so a
/// confirmed change survives a process restart.
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    accounts: RwLock<HashMap<String, UserAccount>>,
}

impl AccountStore {
    /// Opens the store, loading existing data if the file is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let accounts = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            accounts: RwLock::new(accounts),
        })
    }

    /// Returns a snapshot of the user's account, if any.
    pub async fn get(&self, user_id: &str) -> Option<UserAccount> {
        self.accounts.read().await.get(user_id).cloned()
    }

    /// Records a successful login, creating the account if needed.
    ///
    /// An existing keyword table is preserved.
    pub async fn record_login(
        &self,
        user_id: &str,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let previous = accounts.get(user_id).cloned();

        accounts.entry(user_id.to_owned()).or_default().login_time = Some(time);

        if let Err(e) = self.persist(&accounts) {
            restore(&mut accounts, user_id, previous);
            return Err(e);
        }

        debug!("Recorded login for user {}", user_id);
        Ok(())
    }

    /// Stores a keyword reply, creating the account if needed.
    ///
    /// The key is trimmed and lower-cased; an identical key is overwritten.
    /// Returns the key as stored.
    pub async fn add_keyword(
        &self,
        user_id: &str,
        key: &str,
        reply: &str,
    ) -> Result<String, StoreError> {
        let key = key.trim().to_lowercase();

        let mut accounts = self.accounts.write().await;
        let previous = accounts.get(user_id).cloned();

        accounts
            .entry(user_id.to_owned())
            .or_default()
            .keywords
            .insert(key.clone(), reply.trim().to_owned());

        if let Err(e) = self.persist(&accounts) {
            restore(&mut accounts, user_id, previous);
            return Err(e);
        }

        debug!("Stored keyword '{}' for user {}", key, user_id);
        Ok(key)
    }

    /// Removes a keyword. Returns false if the account or key is absent.
    pub async fn remove_keyword(&self, user_id: &str, key: &str) -> Result<bool, StoreError> {
        let key = key.trim().to_lowercase();

        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(user_id) else {
            return Ok(false);
        };

        let Some(removed) = account.keywords.remove(&key) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&accounts) {
            if let Some(account) = accounts.get_mut(user_id) {
                account.keywords.insert(key, removed);
            }
            return Err(e);
        }

        Ok(true)
    }

    /// Whether the user's last login is still within its validity window.
    pub async fn is_active(&self, user_id: &str) -> bool {
        self.accounts
            .read()
            .await
            .get(user_id)
            .is_some_and(|a| a.is_active_at(Utc::now()))
    }

    /// Whole days left on the user's login, if still active.
    pub async fn days_remaining(&self, user_id: &str) -> Option<i64> {
        self.accounts
            .read()
            .await
            .get(user_id)?
            .days_remaining_at(Utc::now())
    }

    /// The user's stored keywords, sorted for stable display.
    pub async fn keyword_list(&self, user_id: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .accounts
            .read()
            .await
            .get(user_id)
            .map(|a| a.keywords.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Writes the full map to disk via a temp file and rename, so a
    /// crash mid-write cannot truncate the store.
    fn persist(&self, accounts: &HashMap<String, UserAccount>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(accounts)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Puts a user's entry back to its pre-mutation state after a failed persist.
fn restore(
    accounts: &mut HashMap<String, UserAccount>,
    user_id: &str,
    previous: Option<UserAccount>,
) {
    match previous {
        Some(account) => {
            accounts.insert(user_id.to_owned(), account);
        }
        None => {
            accounts.remove(user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, AccountStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::open(dir.path().join("userdata.json")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_record_login_creates_account() {
        let (_dir, store) = temp_store();
        let now = Utc::now();

        store.record_login("1", now).await.unwrap();

        let account = store.get("1").await.unwrap();
        assert_eq!(account.login_time, Some(now));
        assert!(store.is_active("1").await);
    }

    #[tokio::test]
    async fn test_record_login_preserves_keywords() {
        let (_dir, store) = temp_store();

        store.add_keyword("1", "halo", "Hai").await.unwrap();
        store.record_login("1", Utc::now()).await.unwrap();

        let account = store.get("1").await.unwrap();
        assert_eq!(account.keywords.get("halo").map(String::as_str), Some("Hai"));
    }

    #[tokio::test]
    async fn test_add_keyword_normalizes_key() {
        let (_dir, store) = temp_store();

        let stored = store.add_keyword("1", "  HaLo ", "Hai").await.unwrap();
        assert_eq!(stored, "halo");

        let account = store.get("1").await.unwrap();
        assert!(account.keywords.contains_key("halo"));
    }

    #[tokio::test]
    async fn test_remove_missing_keyword_returns_false() {
        let (_dir, store) = temp_store();

        store.add_keyword("1", "halo", "Hai").await.unwrap();
        assert!(!store.remove_keyword("1", "missing").await.unwrap());
        assert!(!store.remove_keyword("2", "halo").await.unwrap());

        // Table unchanged.
        let account = store.get("1").await.unwrap();
        assert_eq!(account.keywords.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_keyword() {
        let (_dir, store) = temp_store();

        store.add_keyword("1", "halo", "Hai").await.unwrap();
        assert!(store.remove_keyword("1", "HALO").await.unwrap());
        assert!(store.get("1").await.unwrap().keywords.is_empty());
    }

    #[tokio::test]
    async fn test_activity_window_boundary() {
        let now = Utc::now();
        let account = UserAccount {
            login_time: Some(now - Duration::days(LOGIN_VALIDITY_DAYS) + Duration::seconds(1)),
            keywords: HashMap::new(),
        };
        assert!(account.is_active_at(now));

        let expired = UserAccount {
            login_time: Some(now - Duration::days(LOGIN_VALIDITY_DAYS) - Duration::seconds(1)),
            keywords: HashMap::new(),
        };
        assert!(!expired.is_active_at(now));
        assert_eq!(expired.days_remaining_at(now), None);
    }

    #[tokio::test]
    async fn test_not_active_without_login() {
        let (_dir, store) = temp_store();

        store.add_keyword("1", "halo", "Hai").await.unwrap();
        assert!(!store.is_active("1").await);
        assert_eq!(store.days_remaining("1").await, None);
    }

    #[tokio::test]
    async fn test_persisted_state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userdata.json");
        let now = Utc::now();

        {
            let store = AccountStore::open(&path).unwrap();
            store.record_login("1", now).await.unwrap();
            store.add_keyword("1", "halo", "Hai juga!").await.unwrap();
            store.add_keyword("2", "promo", "Cek katalog").await.unwrap();
        }

        let reloaded = AccountStore::open(&path).unwrap();
        let account = reloaded.get("1").await.unwrap();
        assert_eq!(account.login_time, Some(now));
        assert_eq!(
            account.keywords.get("halo").map(String::as_str),
            Some("Hai juga!")
        );
        assert_eq!(reloaded.get("2").await.unwrap().keywords.len(), 1);
        assert!(reloaded.get("3").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_persist_reports_error_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userdata.json");
        let store = AccountStore::open(&path).unwrap();
        store.add_keyword("1", "halo", "Hai").await.unwrap();

        // Block the rename target so every following persist fails.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.add_keyword("1", "promo", "Cek katalog").await.is_err());
        assert!(store.record_login("2", Utc::now()).await.is_err());
        assert!(store.remove_keyword("1", "halo").await.is_err());

        // Each failed mutation rolled back in memory.
        let account = store.get("1").await.unwrap();
        assert_eq!(account.keywords.len(), 1);
        assert!(account.keywords.contains_key("halo"));
        assert!(account.login_time.is_none());
        assert!(store.get("2").await.is_none());
    }

    #[tokio::test]
    async fn test_keyword_list_sorted() {
        let (_dir, store) = temp_store();

        store.add_keyword("1", "promo", "a").await.unwrap();
        store.add_keyword("1", "halo", "b").await.unwrap();

        assert_eq!(store.keyword_list("1").await, vec!["halo", "promo"]);
        assert!(store.keyword_list("2").await.is_empty());
    }
}
