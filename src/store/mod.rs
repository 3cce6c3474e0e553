//! Durable per-user account storage.
//!
//! The store is the single source of truth for who has logged in and
//! which keyword replies they configured.

mod accounts;

pub use accounts::{AccountStore, StoreError, UserAccount};
