//! Grammers-backed connector.
//!
//! Each login attempt gets its own sqlite session database under the
//! configured sessions directory and its own sender pool task. The
//! exported credential is the base64-encoded session database, which
//! `connect_with_session` accepts back verbatim.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use grammers_client::client::{LoginToken, PasswordToken};
use grammers_client::{Client, SenderPool, SignInError, sender};
use grammers_session::storages::SqliteSession;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AuthClient, Connector, JoinOutcome, TelegramError};
use crate::config::BotConfig;

/// Opens live grammers connections for login attempts.
#[derive(Debug, Clone)]
pub struct GrammersConnector {
    api_id: i32,
    api_hash: String,
    sessions_dir: PathBuf,
}

impl GrammersConnector {
    /// Creates the connector, ensuring the sessions directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be created.
    pub fn new(config: &BotConfig) -> Result<Self, TelegramError> {
        std::fs::create_dir_all(&config.sessions_dir)
            .map_err(|e| TelegramError::Session(e.to_string()))?;

        Ok(Self {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            sessions_dir: config.sessions_dir.clone(),
        })
    }

    async fn open(&self, session_path: PathBuf) -> Result<GrammersHandle, TelegramError> {
        let session = Arc::new(
            SqliteSession::open(&session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates: _updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), self.api_id);

        let client = Client::new(handle.clone());

        // The runner owns the network side; it stops once the handle quits.
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        Ok(GrammersHandle {
            client,
            handle: handle.thin,
            pool_task,
            session_path,
            api_hash: self.api_hash.clone(),
            login_token: None,
            password_token: None,
        })
    }
}

#[async_trait]
impl Connector for GrammersConnector {
    async fn connect(&self, user_id: &str) -> Result<Box<dyn AuthClient>, TelegramError> {
        let path = self.sessions_dir.join(format!("{user_id}.login.session"));
        // A leftover database from an abandoned attempt must not leak
        // into the fresh one.
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }

        debug!("Opening fresh connection for user {}", user_id);
        let handle = self.open(path).await?;
        Ok(Box::new(handle))
    }

    async fn connect_with_session(
        &self,
        user_id: &str,
        blob: &str,
    ) -> Result<Box<dyn AuthClient>, TelegramError> {
        let bytes = BASE64
            .decode(blob.as_bytes())
            .map_err(|e| TelegramError::Session(e.to_string()))?;

        let path = self.sessions_dir.join(format!("{user_id}.import.session"));
        std::fs::write(&path, bytes).map_err(|e| TelegramError::Session(e.to_string()))?;

        debug!("Importing session for user {}", user_id);
        let handle = self.open(path).await?;

        let authorized = handle
            .client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()));

        match authorized {
            Ok(true) => Ok(Box::new(handle)),
            Ok(false) => {
                Box::new(handle).disconnect().await;
                Err(TelegramError::Session(
                    "session credential is not authorized".to_owned(),
                ))
            }
            Err(e) => {
                Box::new(handle).disconnect().await;
                Err(e)
            }
        }
    }
}

/// One live connection backing one login attempt.
struct GrammersHandle {
    client: Client,
    handle: sender::SenderPoolHandle,
    pool_task: JoinHandle<()>,
    session_path: PathBuf,
    api_hash: String,
    login_token: Option<LoginToken>,
    password_token: Option<PasswordToken>,
}

impl GrammersHandle {
    /// Exports the session database as the user-facing credential blob.
    fn export_blob(&self) -> Result<String, TelegramError> {
        let bytes =
            std::fs::read(&self.session_path).map_err(|e| TelegramError::Session(e.to_string()))?;
        Ok(BASE64.encode(bytes))
    }
}

#[async_trait]
impl AuthClient for GrammersHandle {
    async fn request_code(&mut self, phone: &str) -> Result<(), TelegramError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        match self.client.request_login_code(phone, &self.api_hash).await {
            Ok(token) => {
                self.login_token = Some(token);
                Ok(())
            }
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("PHONE_NUMBER_INVALID") {
                    Err(TelegramError::InvalidPhone)
                } else {
                    Err(TelegramError::SignInFailed(err_str))
                }
            }
        }
    }

    async fn submit_code(&mut self, code: &str) -> Result<String, TelegramError> {
        let Some(token) = self.login_token.take() else {
            return Err(TelegramError::Session(
                "no login code was requested on this connection".to_owned(),
            ));
        };

        match self.client.sign_in(&token, code).await {
            Ok(_user) => {
                info!("Successfully signed in");
                self.export_blob()
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                self.password_token = Some(password_token);
                Err(TelegramError::SecondFactorRequired)
            }
            Err(SignInError::InvalidCode) => {
                Err(TelegramError::SignInFailed("Invalid code".to_owned()))
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    async fn submit_password(&mut self, password: &str) -> Result<String, TelegramError> {
        let Some(token) = self.password_token.take() else {
            return Err(TelegramError::Session(
                "no password challenge is pending on this connection".to_owned(),
            ));
        };

        match self.client.check_password(token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA");
                self.export_blob()
            }
            Err(SignInError::InvalidPassword(_token)) => {
                Err(TelegramError::SignInFailed("Invalid password".to_owned()))
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    async fn join_channel(&mut self, channel: &str) -> JoinOutcome {
        let username = channel.trim_start_matches('@');

        let chat = match self.client.resolve_username(username).await {
            Ok(Some(chat)) => chat,
            Ok(None) => return JoinOutcome::Failed(format!("{channel} not found")),
            Err(e) => return JoinOutcome::Failed(e.to_string()),
        };

        let peer_ref = match chat.to_ref().await {
            Ok(Some(peer_ref)) => peer_ref,
            Ok(None) => return JoinOutcome::Failed(format!("{channel} cannot be referenced")),
            Err(e) => return JoinOutcome::Failed(e.to_string()),
        };

        match self.client.join_chat(peer_ref).await {
            Ok(_chat) => JoinOutcome::Joined,
            Err(e) if e.to_string().contains("USER_ALREADY_PARTICIPANT") => {
                JoinOutcome::AlreadyMember
            }
            Err(e) => JoinOutcome::Failed(e.to_string()),
        }
    }

    async fn disconnect(self: Box<Self>) {
        debug!("Disconnecting client");
        self.handle.quit();
        if let Err(e) = self.pool_task.await {
            warn!("Sender pool task ended abnormally: {}", e);
        }
        let _ = std::fs::remove_file(&self.session_path);
    }
}

impl std::fmt::Debug for GrammersHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammersHandle")
            .field("session_path", &self.session_path)
            .finish_non_exhaustive()
    }
}

/// Masks a phone number for logging (shows last 4 digits).
fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}
