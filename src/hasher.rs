//! Pluggable credential hashing.

use rand::distr::{Alphanumeric, SampleString};

use crate::error::AuthError;

/// bcrypt work factor used in production.
pub const BCRYPT_COST: u32 = 10;

/// Length of generated per-user salts.
pub const SALT_LEN: usize = 8;

/// One-way digest primitive over a secret plus a per-user salt.
///
/// Implementations are expected to fold in a pre-shared pepper so a leaked
/// digest table alone is not crackable offline.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, secret: &str, salt: &str) -> Result<String, AuthError>;
    fn verify(&self, secret: &str, salt: &str, digest: &str) -> bool;
}

/// Generates a fresh random alphanumeric salt.
pub fn generate_salt() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), SALT_LEN)
}

/// bcrypt hasher carrying the process-wide secret pepper.
///
/// The hashed input is `secret + salt + pepper`, so digests are bound to
/// both the per-user salt and the deployment secret.
pub struct BcryptHasher {
    pepper: String,
    cost: u32,
}

impl BcryptHasher {
    pub fn new(pepper: &str) -> Self {
        Self::with_cost(pepper, BCRYPT_COST)
    }

    /// Lower costs are only appropriate for tests.
    pub fn with_cost(pepper: &str, cost: u32) -> Self {
        Self {
            pepper: pepper.to_string(),
            cost,
        }
    }

    fn seasoned(&self, secret: &str, salt: &str) -> String {
        format!("{}{}{}", secret, salt, self.pepper)
    }
}

impl CredentialHasher for BcryptHasher {
    fn hash(&self, secret: &str, salt: &str) -> Result<String, AuthError> {
        Ok(bcrypt::hash(self.seasoned(secret, salt), self.cost)?)
    }

    fn verify(&self, secret: &str, salt: &str, digest: &str) -> bool {
        bcrypt::verify(self.seasoned(secret, salt), digest).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify_round() {
        let hasher = BcryptHasher::with_cost("pepper", 4);
        let digest = hasher.hash("hunter2", "abcd1234").unwrap();
        assert!(hasher.verify("hunter2", "abcd1234", &digest));
        assert!(!hasher.verify("hunter3", "abcd1234", &digest));
        assert!(!hasher.verify("hunter2", "zzzz9999", &digest));
    }

    #[test]
    fn test_pepper_binds_digest() {
        let a = BcryptHasher::with_cost("pepper-a", 4);
        let b = BcryptHasher::with_cost("pepper-b", 4);
        let digest = a.hash("secret", "salt0000").unwrap();
        assert!(!b.verify("secret", "salt0000", &digest));
    }

    #[test]
    fn test_generate_salt_shape() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_LEN);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_verify_rejects_garbage_digest() {
        let hasher = BcryptHasher::with_cost("pepper", 4);
        assert!(!hasher.verify("secret", "salt", "not-a-bcrypt-digest"));
    }
}
