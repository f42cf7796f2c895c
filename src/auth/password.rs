//! Account passwords: strength rules and Argon2id hashing.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::config::SecurityConfig;

/// Longer inputs are refused before they reach Argon2.
pub const MAX_PASSWORD_CHARS: usize = 128;

const MAX_MEMORY_COST_LOG2: u32 = 22;
const ITERATIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeakPassword {
    #[error("Password must be at least {0} characters")]
    TooShort(usize),
    #[error("Password must be at most {MAX_PASSWORD_CHARS} characters")]
    TooLong,
    #[error("Password must contain at least one {0}")]
    MissingClass(&'static str),
}

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(argon2::password_hash::Error);

/// Strength policy plus the hashing cost, shared through `AppState`.
#[derive(Debug, Clone)]
pub struct Passwords {
    min_chars: usize,
    require_mixed: bool,
    memory_cost_log2: u32,
}

impl From<&SecurityConfig> for Passwords {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            min_chars: config.min_password_length,
            require_mixed: config.require_password_complexity,
            memory_cost_log2: config.password_hash_cost,
        }
    }
}

impl Passwords {
    pub fn new(min_chars: usize, require_mixed: bool, memory_cost_log2: u32) -> Self {
        Self {
            min_chars,
            require_mixed,
            memory_cost_log2,
        }
    }

    /// First rule the candidate breaks, if any.
    pub fn check(&self, candidate: &str) -> Result<(), WeakPassword> {
        let chars = candidate.chars().count();
        if chars < self.min_chars {
            return Err(WeakPassword::TooShort(self.min_chars));
        }
        if chars > MAX_PASSWORD_CHARS {
            return Err(WeakPassword::TooLong);
        }
        if !self.require_mixed {
            return Ok(());
        }

        let classes: [(&'static str, fn(&char) -> bool); 4] = [
            ("uppercase letter", char::is_ascii_uppercase),
            ("lowercase letter", char::is_ascii_lowercase),
            ("digit", char::is_ascii_digit),
            ("symbol", |c| !c.is_alphanumeric()),
        ];
        match classes
            .iter()
            .find(|(_, matches)| !candidate.chars().any(|c| matches(&c)))
        {
            Some((name, _)) => Err(WeakPassword::MissingClass(name)),
            None => Ok(()),
        }
    }

    /// PHC string for a new password. Memory cost is `2^memory_cost_log2` KiB.
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let memory_kib = 1u32 << self.memory_cost_log2.min(MAX_MEMORY_COST_LOG2);
        let params = Params::new(memory_kib, ITERATIONS, 1, None)
            .map_err(|_| HashError(argon2::password_hash::Error::Algorithm))?;
        let salt = SaltString::generate(&mut OsRng);

        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(HashError)
    }

    /// Parameters come from the stored hash, so old costs keep verifying.
    pub fn verify(password: &str, stored: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(stored).map_err(HashError)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError(e)),
        }
    }
}
