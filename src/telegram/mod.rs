//! Telegram client interface module.
//!
//! Defines the narrow seam the authentication flow talks through:
//! a connector that opens live client handles, and the handle itself,
//! which owns one MTProto connection from creation to disconnect.

mod client;

pub use client::GrammersConnector;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Invalid phone number")]
    InvalidPhone,

    #[error("2FA password required")]
    SecondFactorRequired,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),
}

/// Outcome of a best-effort channel join.
///
/// Only `Failed` carries anything worth logging; none of the variants
/// abort the login that triggered the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Joined the channel.
    Joined,
    /// The account was already a member.
    AlreadyMember,
    /// The join failed for some other reason.
    Failed(String),
}

/// A live, exclusively owned client connection.
///
/// One handle backs one login attempt. `disconnect` consumes the handle,
/// so a released connection cannot be reused by mistake.
#[async_trait]
pub trait AuthClient: Send {
    /// Requests a verification code be sent to the given phone number.
    async fn request_code(&mut self, phone: &str) -> Result<(), TelegramError>;

    /// Attempts sign-in with the verification code.
    ///
    /// Returns the durable session credential on success, or
    /// `SecondFactorRequired` if the account has a 2FA password.
    async fn submit_code(&mut self, code: &str) -> Result<String, TelegramError>;

    /// Retries sign-in with the 2FA password after `SecondFactorRequired`.
    async fn submit_password(&mut self, password: &str) -> Result<String, TelegramError>;

    /// Joins the given channel. Best-effort; never fails the caller.
    async fn join_channel(&mut self, channel: &str) -> JoinOutcome;

    /// Releases the connection and any transient session state.
    async fn disconnect(self: Box<Self>);
}

/// Factory for live client handles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a fresh, unauthenticated connection for a phone login attempt.
    async fn connect(&self, user_id: &str) -> Result<Box<dyn AuthClient>, TelegramError>;

    /// Opens a connection from a previously exported session credential.
    async fn connect_with_session(
        &self,
        user_id: &str,
        blob: &str,
    ) -> Result<Box<dyn AuthClient>, TelegramError>;
}
