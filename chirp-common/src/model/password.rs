use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use std::fmt::{Debug, Formatter};
use thiserror::Error;

pub const PASSWORD_SALT_LEN: usize = 16;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing password failed: {0}")]
pub struct PasswordHashError(argon2::password_hash::Error);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The stored password digest is not a valid PHC string")]
pub struct InvalidPasswordDigestError;

/// Argon2id digest of a password in PHC string format.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn hash(password: &str) -> Result<Self, PasswordHashError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordHashError)?;

        let digest = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(PasswordHashError)?;

        Ok(Self(digest.to_string()))
    }

    /// Wraps a digest loaded from storage.
    pub fn from_phc(phc: String) -> Result<Self, InvalidPasswordDigestError> {
        PasswordHash::new(&phc).map_err(|_| InvalidPasswordDigestError)?;
        Ok(Self(phc))
    }

    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        PasswordHash::new(&self.0).is_ok_and(|hash| {
            Argon2::default()
                .verify_password(password.as_bytes(), &hash)
                .is_ok()
        })
    }

    #[must_use]
    pub fn as_phc(&self) -> &str {
        &self.0
    }
}

impl Debug for PasswordDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordDigest").field(&"[redacted]").finish()
    }
}
