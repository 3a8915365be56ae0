use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to hash password: {0}")]
pub struct CredentialError(String);

/// A client credential as persisted: the argon2 hash plus the retained
/// plaintext the dashboard displays. Both halves always come from the same
/// input.
#[derive(Clone)]
pub struct Credentials {
    hash: String,
    plain: String,
}

impl Credentials {
    pub fn from_plaintext(plain: &str) -> Result<Self, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| CredentialError(e.to_string()))?
            .to_string();

        Ok(Self {
            hash,
            plain: plain.to_string(),
        })
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn plain(&self) -> &str {
        &self.plain
    }

    /// Returns `(hash, plain)`.
    pub fn into_parts(self) -> (String, String) {
        (self.hash, self.plain)
    }

    /// Checks a plaintext against a stored PHC hash string.
    pub fn verify(hash: &str, plain: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_plain_come_from_same_input() {
        let creds = Credentials::from_plaintext("hunter2").unwrap();
        assert_eq!(creds.plain(), "hunter2");
        assert_ne!(creds.hash(), "hunter2");
        assert!(creds.hash().starts_with("$argon2"));
        assert!(Credentials::verify(creds.hash(), "hunter2"));
        assert!(!Credentials::verify(creds.hash(), "hunter3"));
    }

    #[test]
    fn test_salts_differ() {
        let a = Credentials::from_plaintext("same").unwrap();
        let b = Credentials::from_plaintext("same").unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!Credentials::verify("not-a-phc-string", "x"));
    }

    #[test]
    fn test_debug_redacts() {
        let creds = Credentials::from_plaintext("topsecret").unwrap();
        assert!(!format!("{:?}", creds).contains("topsecret"));
    }
}
