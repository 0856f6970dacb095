//! One-time codes for email confirmation and password reset.
//!
//! Codes are stored as a hex HMAC-SHA256 tag keyed with the server secret and
//! checked with `Mac::verify_slice`, which compares in constant time.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// How long an emailed code stays usable, in seconds.
pub const OTP_TTL_SECS: i64 = 90;

/// Number of digits in a code.
pub const OTP_LEN: usize = 5;

pub struct IssuedOtp {
    /// Plain code, only ever sent by mail.
    pub code: String,
    /// Hex tag persisted on the user row.
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OtpKey {
    key: Vec<u8>,
}

impl OtpKey {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(&self.key).unwrap_or_else(|_| unreachable!())
    }

    pub fn issue(&self, now: DateTime<Utc>) -> IssuedOtp {
        let code = rand::rng().random_range(10_000..100_000u32).to_string();
        let hash = self.hash(&code);
        IssuedOtp {
            code,
            hash,
            expires_at: now + Duration::seconds(OTP_TTL_SECS),
        }
    }

    pub fn hash(&self, code: &str) -> String {
        let mut mac = self.mac();
        mac.update(code.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of `code` against a stored hex tag.
    pub fn verify(&self, code: &str, stored_hash: &str) -> bool {
        let Ok(expected) = hex::decode(stored_hash) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(code.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_code_is_five_digits_and_verifies() {
        let key = OtpKey::new("secret");
        let now = Utc::now();
        let otp = key.issue(now);
        assert_eq!(otp.code.len(), OTP_LEN);
        assert!(otp.code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(otp.expires_at, now + Duration::seconds(90));
        assert!(key.verify(&otp.code, &otp.hash));
    }

    #[test]
    fn wrong_code_or_key_fails() {
        let key = OtpKey::new("secret");
        let hash = key.hash("12345");
        assert!(!key.verify("12346", &hash));
        assert!(!OtpKey::new("other").verify("12345", &hash));
        assert!(!key.verify("12345", "zz-not-hex"));
    }
}
