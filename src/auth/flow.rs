//! Authentication state machine.
//!
//! Two entry paths end in the same success action: importing an existing
//! session string, or the phone → code → optional 2FA password flow. The
//! flow's one hard job is keeping exactly one live client handle per user
//! alive across the round trips without leaking it on any exit.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::registry::SessionRegistry;
use crate::config::LOGIN_VALIDITY_DAYS;
use crate::store::AccountStore;
use crate::telegram::{AuthClient, Connector, JoinOutcome, TelegramError};

/// What the router should expect from the user next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// The flow ended, successfully or not.
    Done,
    /// A verification code was sent; the next message is the code.
    AwaitCode,
    /// 2FA is enabled; the next message is the password.
    AwaitPassword,
}

/// Replies to deliver plus the continuation of the flow.
#[derive(Debug)]
pub struct StepResult {
    pub replies: Vec<String>,
    pub next: NextStep,
}

impl StepResult {
    fn done(replies: Vec<String>) -> Self {
        Self {
            replies,
            next: NextStep::Done,
        }
    }
}

/// Drives users through authentication against the protocol client.
pub struct Authenticator {
    connector: Arc<dyn Connector>,
    store: Arc<AccountStore>,
    registry: Arc<SessionRegistry>,
    /// Channel every freshly authenticated account joins, best-effort.
    owner_channel: String,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<AccountStore>,
        registry: Arc<SessionRegistry>,
        owner_channel: String,
    ) -> Self {
        Self {
            connector,
            store,
            registry,
            owner_channel,
        }
    }

    /// Path A: logs in from a previously exported session string.
    pub async fn login_with_session(&self, user_id: &str, blob: &str) -> Vec<String> {
        let mut client = match self.connector.connect_with_session(user_id, blob.trim()).await {
            Ok(client) => client,
            Err(e) => {
                warn!("Session import failed for user {}: {}", user_id, e);
                return vec![
                    "Login failed. Make sure your session string is correct and valid."
                        .to_owned(),
                ];
            }
        };

        self.join_owner_channel(client.as_mut()).await;

        if let Err(e) = self.store.record_login(user_id, Utc::now()).await {
            warn!("Failed to persist login for user {}: {}", user_id, e);
            client.disconnect().await;
            return vec!["Could not save your login, please try again.".to_owned()];
        }

        client.disconnect().await;
        info!("User {} logged in via session import", user_id);

        vec![
            format!("Login successful! Your account is active for {LOGIN_VALIDITY_DAYS} days."),
            "You can now add keywords and replies via the menu.".to_owned(),
        ]
    }

    /// Path B start: connects a fresh handle and requests a verification code.
    pub async fn begin_phone_login(&self, user_id: &str, phone: &str) -> StepResult {
        let phone = phone.trim();

        let mut client = match self.connector.connect(user_id).await {
            Ok(client) => client,
            Err(e) => {
                warn!("Could not open a connection for user {}: {}", user_id, e);
                return StepResult::done(vec![
                    "Could not reach Telegram, please try again later.".to_owned(),
                ]);
            }
        };

        match client.request_code(phone).await {
            Ok(()) => {
                self.registry.start(user_id, client, phone.to_owned()).await;
                StepResult {
                    replies: vec![
                        "The verification code has been sent, please send it here.".to_owned(),
                    ],
                    next: NextStep::AwaitCode,
                }
            }
            Err(TelegramError::InvalidPhone) => {
                client.disconnect().await;
                StepResult::done(vec![
                    "That phone number is not valid, please try again.".to_owned(),
                ])
            }
            Err(e) => {
                client.disconnect().await;
                StepResult::done(vec![format!("Failed to send the code: {e}")])
            }
        }
    }

    /// Path B: signs in with the verification code.
    pub async fn submit_code(&self, user_id: &str, code: &str) -> StepResult {
        let Some(mut pending) = self.registry.take(user_id).await else {
            return StepResult::done(vec![no_session_reply()]);
        };

        match pending.client.submit_code(code.trim()).await {
            Ok(blob) => self.complete_login(user_id, pending.client, &blob).await,
            Err(TelegramError::SecondFactorRequired) => {
                debug!("User {} needs a 2FA password", user_id);
                self.registry.restore(user_id, pending).await;
                StepResult {
                    replies: vec![
                        "Your account has a 2FA password, please send it now.".to_owned(),
                    ],
                    next: NextStep::AwaitPassword,
                }
            }
            Err(e) => {
                warn!("Code sign-in failed for user {}: {}", user_id, e);
                pending.client.disconnect().await;
                StepResult::done(vec!["Login failed, please start over.".to_owned()])
            }
        }
    }

    /// Path B: retries sign-in with the 2FA password.
    pub async fn submit_password(&self, user_id: &str, password: &str) -> StepResult {
        let Some(mut pending) = self.registry.take(user_id).await else {
            return StepResult::done(vec![no_session_reply()]);
        };

        match pending.client.submit_password(password.trim()).await {
            Ok(blob) => self.complete_login(user_id, pending.client, &blob).await,
            Err(e) => {
                warn!("Password sign-in failed for user {}: {}", user_id, e);
                pending.client.disconnect().await;
                StepResult::done(vec![
                    "Login with that password failed, please start over.".to_owned(),
                ])
            }
        }
    }

    /// Shared success tail of the phone flow: persist the login, join the
    /// owner channel, release the handle and hand the credential back to
    /// the user for their own backup.
    async fn complete_login(
        &self,
        user_id: &str,
        mut client: Box<dyn AuthClient>,
        blob: &str,
    ) -> StepResult {
        if let Err(e) = self.store.record_login(user_id, Utc::now()).await {
            warn!("Failed to persist login for user {}: {}", user_id, e);
            client.disconnect().await;
            return StepResult::done(vec![
                "Could not save your login, please try again.".to_owned(),
            ]);
        }

        self.join_owner_channel(client.as_mut()).await;
        client.disconnect().await;
        info!("User {} logged in via phone", user_id);

        StepResult::done(vec![
            format!("Login successful! Your session string:\n{blob}"),
            format!("Your account is active for {LOGIN_VALIDITY_DAYS} days."),
        ])
    }

    async fn join_owner_channel(&self, client: &mut dyn AuthClient) {
        match client.join_channel(&self.owner_channel).await {
            JoinOutcome::Joined => debug!("Joined channel {}", self.owner_channel),
            JoinOutcome::AlreadyMember => {}
            JoinOutcome::Failed(detail) => {
                warn!("Failed to join channel {}: {}", self.owner_channel, detail);
            }
        }
    }
}

fn no_session_reply() -> String {
    "No active login session found, please start over.".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::mock::{MockConnector, MockFailure, MockScript};

    fn fixture(script: MockScript) -> (tempfile::TempDir, Arc<MockConnector>, Authenticator) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AccountStore::open(dir.path().join("data.json")).unwrap());
        let connector = Arc::new(MockConnector::new(script));
        let auth = Authenticator::new(
            Arc::clone(&connector) as Arc<dyn Connector>,
            store,
            Arc::new(SessionRegistry::new()),
            "@owner".to_owned(),
        );
        (dir, connector, auth)
    }

    #[tokio::test]
    async fn test_session_import_success_records_login() {
        let (_dir, connector, auth) = fixture(MockScript::default());

        let replies = auth.login_with_session("1", "valid-blob").await;

        assert!(replies[0].contains("Login successful"));
        assert!(auth.store.is_active("1").await);
        assert_eq!(connector.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_session_import_failure_leaves_store_untouched() {
        let (_dir, connector, auth) = fixture(MockScript::default());

        let replies = auth.login_with_session("1", "bad").await;

        assert!(replies[0].contains("Login failed"));
        assert!(auth.store.get("1").await.is_none());
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_already_member_join_still_logs_in() {
        let (_dir, connector, auth) = fixture(MockScript {
            already_member: true,
            ..MockScript::default()
        });

        let replies = auth.login_with_session("1", "valid-blob").await;

        assert!(replies[0].contains("Login successful"));
        assert!(auth.store.is_active("1").await);
        assert_eq!(connector.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_no_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AccountStore::open(dir.path().join("data.json")).unwrap());
        let mut connector = MockConnector::new(MockScript::default());
        connector.refuse_connect = true;
        let connector = Arc::new(connector);
        let auth = Authenticator::new(
            Arc::clone(&connector) as Arc<dyn Connector>,
            store,
            Arc::new(SessionRegistry::new()),
            "@owner".to_owned(),
        );

        let result = auth.begin_phone_login("1", "+620001").await;

        assert_eq!(result.next, NextStep::Done);
        assert!(result.replies[0].contains("Could not reach Telegram"));
        assert_eq!(connector.connect_count(), 0);
        assert!(!auth.registry.contains("1").await);
    }

    #[tokio::test]
    async fn test_invalid_phone_releases_handle_without_pending() {
        let (_dir, connector, auth) = fixture(MockScript {
            code_request_fails: Some(MockFailure::InvalidPhone),
            ..MockScript::default()
        });

        let result = auth.begin_phone_login("1", "+abc").await;

        assert_eq!(result.next, NextStep::Done);
        assert!(result.replies[0].contains("not valid"));
        assert_eq!(connector.disconnect_count(), 1);
        assert!(!auth.registry.contains("1").await);
    }

    #[tokio::test]
    async fn test_transport_error_reports_detail() {
        let (_dir, connector, auth) = fixture(MockScript {
            code_request_fails: Some(MockFailure::Transport),
            ..MockScript::default()
        });

        let result = auth.begin_phone_login("1", "+620001").await;

        assert_eq!(result.next, NextStep::Done);
        assert!(result.replies[0].contains("Failed to send the code"));
        assert_eq!(connector.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_code_without_start_is_not_found() {
        let (_dir, _connector, auth) = fixture(MockScript::default());

        let result = auth.submit_code("1", "12345").await;

        assert_eq!(result.next, NextStep::Done);
        assert!(result.replies[0].contains("No active login session"));
        assert!(auth.store.get("1").await.is_none());
    }

    #[tokio::test]
    async fn test_full_phone_login_without_second_factor() {
        let (_dir, connector, auth) = fixture(MockScript::default());

        let start = auth.begin_phone_login("1", "+620001").await;
        assert_eq!(start.next, NextStep::AwaitCode);
        assert!(auth.registry.contains("1").await);

        let before = Utc::now();
        let result = auth.submit_code("1", "12345").await;

        assert_eq!(result.next, NextStep::Done);
        assert!(result.replies[0].contains("blob-from-code"));
        assert!(!auth.registry.contains("1").await);
        assert_eq!(connector.disconnect_count(), 1);

        let login_time = auth.store.get("1").await.unwrap().login_time.unwrap();
        assert!(login_time >= before && login_time <= Utc::now());
    }

    #[tokio::test]
    async fn test_second_factor_keeps_pending_alive() {
        let (_dir, connector, auth) = fixture(MockScript {
            needs_password: true,
            ..MockScript::default()
        });

        auth.begin_phone_login("1", "+620001").await;
        let result = auth.submit_code("1", "12345").await;

        assert_eq!(result.next, NextStep::AwaitPassword);
        assert!(auth.registry.contains("1").await);
        assert_eq!(connector.disconnect_count(), 0);

        let result = auth.submit_password("1", "hunter2").await;

        assert_eq!(result.next, NextStep::Done);
        assert!(result.replies[0].contains("blob-from-password"));
        assert!(!auth.registry.contains("1").await);
        assert_eq!(connector.disconnect_count(), 1);
        assert!(auth.store.is_active("1").await);
    }

    #[tokio::test]
    async fn test_rejected_code_releases_handle() {
        let (_dir, connector, auth) = fixture(MockScript {
            code_rejected: true,
            ..MockScript::default()
        });

        auth.begin_phone_login("1", "+620001").await;
        let result = auth.submit_code("1", "00000").await;

        assert_eq!(result.next, NextStep::Done);
        assert!(result.replies[0].contains("Login failed"));
        assert_eq!(connector.disconnect_count(), 1);
        assert!(!auth.registry.contains("1").await);
        assert!(auth.store.get("1").await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_password_releases_handle() {
        let (_dir, connector, auth) = fixture(MockScript {
            needs_password: true,
            password_rejected: true,
            ..MockScript::default()
        });

        auth.begin_phone_login("1", "+620001").await;
        auth.submit_code("1", "12345").await;
        let result = auth.submit_password("1", "wrong").await;

        assert_eq!(result.next, NextStep::Done);
        assert_eq!(connector.disconnect_count(), 1);
        assert!(!auth.registry.contains("1").await);
    }

    #[tokio::test]
    async fn test_restart_replaces_pending_attempt() {
        let (_dir, connector, auth) = fixture(MockScript::default());

        auth.begin_phone_login("1", "+620001").await;
        auth.begin_phone_login("1", "+620002").await;

        // First handle released exactly once, one attempt left.
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.disconnect_count(), 1);
        assert_eq!(auth.registry.take("1").await.unwrap().phone, "+620002");
    }
}
