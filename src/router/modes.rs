//! Interaction modes and static command labels.

use std::fmt;

/// What the user's next plain-text message means.
///
/// At most one mode is pending per user; setting a new one replaces any
/// other, and handling a message consumes the mode regardless of outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    /// Next message is a session string to import.
    SessionImport,
    /// Next message is a `keyword|reply` pair to store.
    KeywordAdd,
    /// Next message is a keyword to delete.
    KeywordDelete,
    /// Next message is a phone number starting an OTP login.
    Phone,
    /// Next message is the verification code.
    Code,
    /// Next message is the 2FA password.
    Password,
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SessionImport => "session-import",
            Self::KeywordAdd => "keyword-add",
            Self::KeywordDelete => "keyword-delete",
            Self::Phone => "phone",
            Self::Code => "code",
            Self::Password => "password",
        };
        f.write_str(name)
    }
}

/// Static menu labels the bot reacts to when no mode is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Greeting and menu overview.
    Start,
    /// Begin a session-string import.
    LoginSession,
    /// Begin a phone/OTP login.
    LoginOtp,
    /// Begin adding a keyword reply.
    AddKeyword,
    /// Begin deleting a keyword.
    DeleteKeyword,
    /// Show account status.
    Info,
}

impl Command {
    /// Matches a message against the known labels.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "/start" => Some(Self::Start),
            "Login String Session" => Some(Self::LoginSession),
            "Login OTP" => Some(Self::LoginOtp),
            "Add Keyword" => Some(Self::AddKeyword),
            "Delete Keyword" => Some(Self::DeleteKeyword),
            "Info" | "/info" => Some(Self::Info),
            _ => None,
        }
    }
}
