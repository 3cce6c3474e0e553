//! In-memory registry of in-flight login attempts.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::telegram::AuthClient;

/// A login attempt waiting for its next step.
///
/// Owns the live client connection; the registry guarantees the handle
/// is disconnected exactly once, on whichever path discards the entry.
pub struct PendingAuth {
    /// Live, exclusively owned client connection.
    pub client: Box<dyn AuthClient>,

    /// The phone number the verification code was sent to.
    pub phone: String,
}

impl std::fmt::Debug for PendingAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuth")
            .field("phone", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Transient map from user id to pending login attempt.
///
/// Lost on restart; interrupted logins must be started over.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<String, PendingAuth>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh login attempt, replacing any prior one.
    ///
    /// The replaced attempt's client handle is disconnected before this
    /// returns.
    pub async fn start(&self, user_id: &str, client: Box<dyn AuthClient>, phone: String) {
        let previous = {
            let mut entries = self.entries.lock().await;
            entries.insert(user_id.to_owned(), PendingAuth { client, phone })
        };

        if let Some(old) = previous {
            debug!("Replacing pending login for user {}", user_id);
            old.client.disconnect().await;
        }
    }

    /// Takes the user's pending attempt out of the registry.
    ///
    /// The caller now owns the client handle and must either finish with
    /// it (and disconnect it) or hand it back via [`Self::restore`].
    pub async fn take(&self, user_id: &str) -> Option<PendingAuth> {
        self.entries.lock().await.remove(user_id)
    }

    /// Puts a taken attempt back, e.g. while waiting for a 2FA password.
    pub async fn restore(&self, user_id: &str, pending: PendingAuth) {
        self.entries.lock().await.insert(user_id.to_owned(), pending);
    }

    /// Discards the user's pending attempt and releases its handle.
    /// Safe to call when no attempt exists.
    pub async fn end(&self, user_id: &str) {
        let removed = self.entries.lock().await.remove(user_id);
        if let Some(pending) = removed {
            pending.client.disconnect().await;
        }
    }

    /// Whether the user has a login attempt in flight.
    pub async fn contains(&self, user_id: &str) -> bool {
        self.entries.lock().await.contains_key(user_id)
    }

    /// Releases every pending attempt. Called on shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, PendingAuth)> =
            self.entries.lock().await.drain().collect();

        if !drained.is_empty() {
            info!("Releasing {} pending login attempt(s)", drained.len());
        }
        for (_, pending) in drained {
            pending.client.disconnect().await;
        }
    }
}
