//! Account authentication.
//!
//! Holds the in-memory registry of in-flight login attempts and the
//! state machine that drives a user through them.

mod flow;
mod registry;

pub use flow::{Authenticator, NextStep, StepResult};
pub use registry::{PendingAuth, SessionRegistry};
