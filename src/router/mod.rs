//! Inbound message routing.
//!
//! Interprets each user's next plain-text message according to their
//! pending interaction mode, falling back to keyword auto-replies and
//! the static menu labels.

mod handler;
mod modes;

pub use handler::{MessageRouter, SessionManager};
pub use modes::{Command, InteractionMode};

/// An inbound chat message handed to the core by the transport layer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub user_id: String,
    pub text: String,
}

/// A reply the transport layer should deliver.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub user_id: String,
    pub text: String,
}
