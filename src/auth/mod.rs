//! Credentials: session tokens, password hashing, login lockout, auth cookie.

pub mod cookie;
pub mod jwt;
pub mod lockout;
pub mod password;

use sha2::{Digest, Sha256};

/// SHA-256 hex digest used for revocation keys and stored reset tokens.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares two secrets without an early exit. Both sides are hashed first so
/// neither length nor a matching prefix shows up in the timing.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Random URL-safe token for password resets, api keys and webhook secrets.
pub fn random_token(bytes: usize) -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let a = hash_token("abc");
        assert_eq!(a, hash_token("abc"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_token("abd"));
    }

    #[test]
    fn test_secrets_match() {
        let key = random_token(32);
        assert!(secrets_match(&key, &key.clone()));
        assert!(!secrets_match(&key[..10], &key));
        assert!(!secrets_match("", &key));
        assert!(!secrets_match(&format!("{key}x"), &key));
    }

    #[test]
    fn test_random_token_is_unique_and_url_safe() {
        let a = random_token(32);
        let b = random_token(32);
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
