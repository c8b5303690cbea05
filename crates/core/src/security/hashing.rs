use crate::{config::SecurityConfig, error::Result, Error, ErrorCode};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};

/// Argon2id password hashing with parameters taken from configuration
/// (production startup validation enforces the 64 MB / 3-pass floor).
/// Hashes are stored in PHC string format, so parameter changes roll out
/// gradually as users next log in.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_cost,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| {
            Error::new(
                ErrorCode::ConfigurationError,
                format!("Invalid Argon2 parameters: {e}"),
            )
        })?;

        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::new(ErrorCode::EncryptionError, format!("Password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// A wrong password is an `Ok(false)`, not an error — only a malformed
    /// stored hash or an internal failure surfaces as `Err`.
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(stored_hash).map_err(|e| {
            Error::new(ErrorCode::EncryptionError, format!("Stored hash is malformed: {e}"))
        })?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::new(
                ErrorCode::EncryptionError,
                format!("Password verification failed: {e}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_test_hasher() -> PasswordHasher {
        // Minimal cost parameters: these tests exercise correctness, not
        // hardness.
        PasswordHasher::new(&SecurityConfig {
            argon2_memory_cost: 8192,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn round_trips_and_rejects_wrong_password() {
        let hasher = fast_test_hasher();
        let hash = hasher.hash_password("SecurePassword123!").unwrap();

        assert_ne!(hash, "SecurePassword123!");
        assert!(hasher.verify_password("SecurePassword123!", &hash).unwrap());
        assert!(!hasher.verify_password("WrongPassword", &hash).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_error_not_a_mismatch() {
        let hasher = fast_test_hasher();
        assert!(hasher.verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn same_password_hashes_differently_per_salt() {
        let hasher = fast_test_hasher();
        let a = hasher.hash_password("SecurePassword123!").unwrap();
        let b = hasher.hash_password("SecurePassword123!").unwrap();
        assert_ne!(a, b);
    }
}
