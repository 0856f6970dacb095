//! JWT signing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthError;

/// JWT claims shared by the REST middleware and the WebSocket handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Issued-at, unix milliseconds. Compared against the password change
    /// stamp, which has the same precision.
    pub iat_ms: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Unique per token, so two logins in the same second never collide.
    pub jti: Uuid,
}

pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// HS256 key pair plus the session lifetime.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sign(&self, user_id: Uuid, issued_at: DateTime<Utc>) -> Result<SignedToken, AuthError> {
        let expires_at = issued_at + self.ttl;
        let claims = Claims {
            sub: user_id,
            iat: issued_at.timestamp(),
            iat_ms: issued_at.timestamp_millis(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("jwt encode: {}", e)))?;

        Ok(SignedToken { token, expires_at })
    }

    /// Check signature and expiry. Any failure is `InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let keys = JwtKeys::new("secret", Duration::hours(1));
        let user = Uuid::new_v4();
        let now = Utc::now();
        let signed = keys.sign(user, now).unwrap();
        let claims = keys.verify(&signed.token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.iat_ms, now.timestamp_millis());
        assert_eq!(claims.exp, (now + Duration::hours(1)).timestamp());
    }

    #[test]
    fn same_second_tokens_differ() {
        let keys = JwtKeys::new("secret", Duration::hours(1));
        let user = Uuid::new_v4();
        let now = Utc::now();
        let a = keys.sign(user, now).unwrap();
        let b = keys.sign(user, now).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn expired_token_is_invalid() {
        let keys = JwtKeys::new("secret", Duration::hours(1));
        let signed = keys
            .sign(Uuid::new_v4(), Utc::now() - Duration::hours(2))
            .unwrap();
        assert!(matches!(keys.verify(&signed.token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn foreign_signature_is_invalid() {
        let ours = JwtKeys::new("secret", Duration::hours(1));
        let theirs = JwtKeys::new("other-secret", Duration::hours(1));
        let signed = theirs.sign(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(matches!(ours.verify(&signed.token), Err(AuthError::InvalidToken)));
        assert!(matches!(ours.verify("not-a-jwt"), Err(AuthError::InvalidToken)));
    }
}
