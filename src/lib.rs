//! Keyword Reply Bot Library
//!
//! Core of a Telegram bot that lets end-users authenticate an account
//! and maintain a personal keyword-triggered auto-reply table.
//!
//! This crate provides:
//! - Durable per-user account and keyword storage
//! - Keyword auto-reply lookup on every inbound text
//! - The phone/code/password and session-import login flows
//! - Interaction-mode routing of plain-text messages

pub mod auth;
pub mod config;
pub mod reply;
pub mod router;
pub mod store;
pub mod telegram;
