//! Warden - session authentication and login throttling
//!
//! In-process session validation backed by a durable MySQL record, plus a
//! per-user-per-origin ban on repeated login failures. The embedding
//! application brings the transport (HTTP handlers, cookies); this crate
//! owns the state.

// ============================================
// Core Modules
// ============================================

/// The wired facade most applications hold.
pub mod auth;
/// YAML configuration.
pub mod config;
/// Session issue, validation and invalidation.
pub mod session;
/// Failed-login accounting and bans.
pub mod throttle;
/// Emailed verification codes.
pub mod twofa;
/// User lifecycle and credential checks.
pub mod users;

// ============================================
// Infrastructure
// ============================================

/// Time source abstraction.
pub mod clock;
/// MySQL durable store.
pub mod db;
/// Error type.
pub mod error;
/// Peppered bcrypt hashing.
pub mod hasher;
/// Outbound mail.
pub mod notifier;
/// Expired-record sweeping.
pub mod reaper;
/// Durable store trait and in-memory double.
pub mod repository;
/// Generic expiring key-value store.
pub mod store;

pub use auth::Auth;
pub use config::AuthConfig;
pub use error::AuthError;
