//! Session tokens: Ed25519-signed JWTs carried in the `auth_token` cookie
//! or an `Authorization: Bearer` header.

use std::{collections::HashSet, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};
use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_EXPIRY_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum SigningKeyError {
    #[error("JWT_PRIVATE_KEY is not set")]
    Missing,
    #[error("JWT_PRIVATE_KEY is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("JWT_PRIVATE_KEY is not an Ed25519 key pair: {0}")]
    Key(jwt_simple::Error),
}

/// Custom part of the token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionPayload {
    email: String,
}

/// What a verified token says about its bearer.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Seconds until expiry, used as the TTL for revocation entries.
    pub fn remaining_secs(&self) -> u64 {
        (self.exp - chrono::Utc::now().timestamp()).max(1) as u64
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    key_pair: Arc<Ed25519KeyPair>,
    public_key: Arc<Ed25519PublicKey>,
    pub token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            token_expiry: DEFAULT_EXPIRY_SECS,
            issuer: None,
            audience: None,
        }
    }

    /// Loads the key pair from a base64 string as printed by `generate_keys`.
    pub fn from_base64(private_key: &str) -> Result<Self, SigningKeyError> {
        let bytes = STANDARD.decode(private_key.trim())?;
        let key_pair = Ed25519KeyPair::from_bytes(&bytes).map_err(SigningKeyError::Key)?;
        Ok(Self::from_key_pair(key_pair))
    }

    /// Reads `JWT_PRIVATE_KEY`. Startup cannot continue without it.
    pub fn from_env_with_expiry(
        token_expiry: i64,
        issuer: Option<String>,
        audience: Option<String>,
    ) -> Self {
        let loaded = std::env::var("JWT_PRIVATE_KEY")
            .map_err(|_| SigningKeyError::Missing)
            .and_then(|key| Self::from_base64(&key));

        match loaded {
            Ok(config) => Self {
                token_expiry,
                issuer,
                audience,
                ..config
            },
            Err(e) => panic!("{e}"),
        }
    }

    /// Fresh `(private, public)` pair, both base64.
    pub fn generate_key_pair() -> (String, String) {
        let key_pair = Ed25519KeyPair::generate();
        (
            STANDARD.encode(key_pair.to_bytes()),
            STANDARD.encode(key_pair.public_key().to_bytes()),
        )
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, jwt_simple::Error> {
        let payload = SessionPayload {
            email: email.to_string(),
        };
        let lifetime = Duration::from_secs(self.token_expiry.max(1) as u64);
        let mut claims = jwt_simple::claims::Claims::with_custom_claims(payload, lifetime)
            .with_subject(user_id.to_string());

        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }
        self.key_pair.sign(claims)
    }

    fn verification_options(&self) -> VerificationOptions {
        VerificationOptions {
            allowed_issuers: self.issuer.clone().map(|i| HashSet::from([i])),
            allowed_audiences: self.audience.clone().map(|a| HashSet::from([a])),
            ..Default::default()
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let verified = self
            .public_key
            .verify_token::<SessionPayload>(token, Some(self.verification_options()))?;
        let secs = |t: Option<Duration>| t.map_or(0, |t| t.as_secs() as i64);

        Ok(Claims {
            sub: verified.subject.unwrap_or_default(),
            email: verified.custom.email,
            exp: secs(verified.expires_at),
            iat: secs(verified.issued_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_issue_and_verify() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = config.issue(user_id, "owner@example.com").unwrap();
        let claims = config.verify(&token).unwrap();

        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.email, "owner@example.com");
        assert!(claims.exp > claims.iat);
        assert!(claims.remaining_secs() > 0);
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(test_config().verify("invalid.token.here").is_err());
    }

    #[test]
    fn test_token_from_other_key_is_rejected() {
        let token = test_config().issue(Uuid::new_v4(), "a@b.co").unwrap();
        assert!(test_config().verify(&token).is_err());
    }

    #[test]
    fn test_issuer_mismatch_is_rejected() {
        let mut signer = test_config();
        signer.issuer = Some("other".to_string());
        let token = signer.issue(Uuid::new_v4(), "a@b.co").unwrap();

        let mut verifier = signer.clone();
        verifier.issuer = Some("feedloop".to_string());
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_generated_key_loads_from_base64() {
        let (private_b64, public_b64) = JwtConfig::generate_key_pair();
        assert!(!public_b64.is_empty());

        let config = JwtConfig::from_base64(&private_b64).unwrap();
        let token = config.issue(Uuid::new_v4(), "a@b.co").unwrap();
        assert!(config.verify(&token).is_ok());
    }

    #[test]
    fn test_bad_key_material_is_reported() {
        assert!(matches!(
            JwtConfig::from_base64("not base64!"),
            Err(SigningKeyError::Encoding(_))
        ));
        assert!(matches!(
            JwtConfig::from_base64(&STANDARD.encode([0u8; 5])),
            Err(SigningKeyError::Key(_))
        ));
    }

    #[test]
    fn test_claims_with_bad_subject_has_no_user_id() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            email: String::new(),
            exp: 0,
            iat: 0,
        };
        assert!(claims.user_id().is_none());
    }
}
