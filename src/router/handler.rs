//! Message dispatch.
//!
//! Precedence is fixed: pending interaction mode, then keyword match,
//! then static command label, then nothing. Modes are one-shot; they are
//! consumed before the underlying operation runs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::modes::{Command, InteractionMode};
use crate::auth::{Authenticator, NextStep, SessionRegistry, StepResult};
use crate::config::LOGIN_VALIDITY_DAYS;
use crate::reply::AutoReply;
use crate::store::AccountStore;

/// Owns all transient per-user state: pending interaction modes, the
/// login registry and the per-user dispatch guards.
#[derive(Debug, Default)]
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    modes: Mutex<HashMap<String, InteractionMode>>,
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Sets the user's pending mode, replacing any other.
    pub async fn set_mode(&self, user_id: &str, mode: InteractionMode) {
        debug!("User {} now awaiting {}", user_id, mode);
        self.modes.lock().await.insert(user_id.to_owned(), mode);
    }

    /// Consumes the user's pending mode, if any.
    pub async fn take_mode(&self, user_id: &str) -> Option<InteractionMode> {
        self.modes.lock().await.remove(user_id)
    }

    /// The lock serializing all handling for one user. Distinct users
    /// get distinct locks and never wait on each other.
    pub async fn guard(&self, user_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.guards
                .lock()
                .await
                .entry(user_id.to_owned())
                .or_default(),
        )
    }

    /// Drops the user's guard entry when no handler holds it, so the
    /// map does not grow with every user id ever seen.
    pub async fn prune_guard(&self, user_id: &str) {
        let mut guards = self.guards.lock().await;
        if let Some(entry) = guards.get(user_id) {
            // The map holds the only reference: nobody is waiting on it.
            if Arc::strong_count(entry) == 1 {
                guards.remove(user_id);
            }
        }
    }

    /// Releases every pending login attempt.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

/// Routes each inbound text to the right subsystem and collects the
/// replies to send back.
pub struct MessageRouter {
    sessions: Arc<SessionManager>,
    store: Arc<AccountStore>,
    auto_reply: AutoReply,
    auth: Authenticator,
}

impl MessageRouter {
    #[must_use]
    pub fn new(
        sessions: Arc<SessionManager>,
        store: Arc<AccountStore>,
        auth: Authenticator,
    ) -> Self {
        let auto_reply = AutoReply::new(Arc::clone(&store));
        Self {
            sessions,
            store,
            auto_reply,
            auth,
        }
    }

    /// Handles one inbound message and returns the replies to deliver.
    ///
    /// Holds the user's guard for the whole call, so a user never has two
    /// operations in flight; other users are unaffected.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> Vec<String> {
        let guard = self.sessions.guard(user_id).await;
        let replies = {
            let _serialized = guard.lock().await;
            self.route(user_id, text.trim()).await
        };

        drop(guard);
        self.sessions.prune_guard(user_id).await;
        replies
    }

    async fn route(&self, user_id: &str, text: &str) -> Vec<String> {
        if let Some(mode) = self.sessions.take_mode(user_id).await {
            return self.handle_mode(user_id, mode, text).await;
        }

        if let Some(reply) = self.auto_reply.lookup(user_id, text).await {
            return vec![reply];
        }

        if let Some(command) = Command::parse(text) {
            return self.handle_command(user_id, command).await;
        }

        Vec::new()
    }

    async fn handle_mode(
        &self,
        user_id: &str,
        mode: InteractionMode,
        text: &str,
    ) -> Vec<String> {
        match mode {
            InteractionMode::SessionImport => self.auth.login_with_session(user_id, text).await,
            InteractionMode::Phone => {
                let step = self.auth.begin_phone_login(user_id, text).await;
                self.apply_step(user_id, step).await
            }
            InteractionMode::Code => {
                let step = self.auth.submit_code(user_id, text).await;
                self.apply_step(user_id, step).await
            }
            InteractionMode::Password => {
                let step = self.auth.submit_password(user_id, text).await;
                self.apply_step(user_id, step).await
            }
            InteractionMode::KeywordAdd => self.add_keyword(user_id, text).await,
            InteractionMode::KeywordDelete => self.delete_keyword(user_id, text).await,
        }
    }

    /// Applies the continuation the auth flow asked for.
    async fn apply_step(&self, user_id: &str, step: StepResult) -> Vec<String> {
        match step.next {
            NextStep::Done => {}
            NextStep::AwaitCode => self.sessions.set_mode(user_id, InteractionMode::Code).await,
            NextStep::AwaitPassword => {
                self.sessions
                    .set_mode(user_id, InteractionMode::Password)
                    .await;
            }
        }
        step.replies
    }

    async fn add_keyword(&self, user_id: &str, text: &str) -> Vec<String> {
        let parts: Vec<&str> = text.split('|').collect();
        let [key, reply] = parts.as_slice() else {
            return vec!["Wrong format! Send: keyword|reply".to_owned()];
        };

        let (key, reply) = (key.trim(), reply.trim());
        if key.is_empty() || reply.is_empty() {
            return vec!["Wrong format! Send: keyword|reply".to_owned()];
        }

        match self.store.add_keyword(user_id, key, reply).await {
            Ok(stored) => vec![format!(
                "Keyword '{stored}' and its reply have been saved."
            )],
            Err(e) => {
                tracing::warn!("Failed to save keyword for user {}: {}", user_id, e);
                vec!["Could not save the keyword, please try again.".to_owned()]
            }
        }
    }

    async fn delete_keyword(&self, user_id: &str, text: &str) -> Vec<String> {
        match self.store.remove_keyword(user_id, text).await {
            Ok(true) => vec![format!("Keyword '{}' has been deleted.", text.trim().to_lowercase())],
            Ok(false) => vec!["Keyword not found.".to_owned()],
            Err(e) => {
                tracing::warn!("Failed to delete keyword for user {}: {}", user_id, e);
                vec!["Could not delete the keyword, please try again.".to_owned()]
            }
        }
    }

    async fn handle_command(&self, user_id: &str, command: Command) -> Vec<String> {
        match command {
            Command::Start => vec![
                "Hi! I help you promote your business with keyword auto-replies."
                    .to_owned(),
                "Use the menu: Login String Session, Login OTP, Add Keyword, \
                 Delete Keyword, Info."
                    .to_owned(),
            ],
            Command::LoginSession => {
                self.sessions
                    .set_mode(user_id, InteractionMode::SessionImport)
                    .await;
                vec!["Send your session string now:".to_owned()]
            }
            Command::LoginOtp => {
                self.sessions.set_mode(user_id, InteractionMode::Phone).await;
                vec!["Please send your phone number (example: +6281234567890)".to_owned()]
            }
            Command::AddKeyword => {
                self.sessions
                    .set_mode(user_id, InteractionMode::KeywordAdd)
                    .await;
                vec!["Send the format: keyword|reply\nExample: halo|Hai juga!".to_owned()]
            }
            Command::DeleteKeyword => {
                let keys = self.store.keyword_list(user_id).await;
                if keys.is_empty() {
                    return vec!["You don't have any keywords yet.".to_owned()];
                }
                self.sessions
                    .set_mode(user_id, InteractionMode::KeywordDelete)
                    .await;
                vec![format!(
                    "Your keywords:\n{}\nSend the keyword you want to delete.",
                    keys.join("\n")
                )]
            }
            Command::Info => self.account_info(user_id).await,
        }
    }

    async fn account_info(&self, user_id: &str) -> Vec<String> {
        let Some(_account) = self.store.get(user_id).await else {
            return vec!["You are not logged in yet, please log in first.".to_owned()];
        };

        match self.store.days_remaining(user_id).await {
            Some(days) => vec![format!(
                "Status: Active\nExpires in {days} of {LOGIN_VALIDITY_DAYS} days."
            )],
            None => vec!["Status: Inactive\nPlease log in again.".to_owned()],
        }
    }
}
