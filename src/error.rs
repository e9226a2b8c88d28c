//! Error types shared across the crate.

/// Errors surfaced by the authentication core.
///
/// Business outcomes that a caller is expected to branch on in normal
/// operation (`is_blocked` returning false, `check_login` rejecting a
/// password, `verify_code` failing a code) are ordinary return values,
/// not variants here. `AuthError` covers infrastructure failures and
/// caller mistakes.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Token absent from both the cache and the durable store.
    #[error("session not found")]
    NotFound,

    /// Session exists but its expiry has passed.
    #[error("session expired at {expired_at}")]
    Expired { expired_at: i64 },

    /// The user/origin combination is currently banned.
    #[error("login throttled until {until}")]
    Banned { until: i64 },

    /// Durable store read or write failed.
    #[error("durable store failure: {0}")]
    Persistence(String),

    /// Malformed key component, e.g. an empty user or origin.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Credential hashing failed.
    #[error("hash failure: {0}")]
    Hash(String),

    /// Outbound notification could not be delivered.
    #[error("notification failure: {0}")]
    Notify(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Persistence(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AuthError::Hash(err.to_string())
    }
}
