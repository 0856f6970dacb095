//! Issued-token ledger.
//!
//! Every token handed to a client is recorded against its user before it is
//! returned. Logout moves all of a user's recorded tokens to the blacklist in
//! one transaction, after which the gate refuses them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use notecast_db::{Database, now_ms};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{AuthError, JwtKeys};

#[derive(Clone)]
pub struct TokenLedger {
    db: Arc<Database>,
    keys: Arc<JwtKeys>,
}

impl TokenLedger {
    pub fn new(db: Arc<Database>, keys: Arc<JwtKeys>) -> Self {
        Self { db, keys }
    }

    /// Sign a token for `user_id` and record it. Nothing is returned unless
    /// the record was written.
    pub async fn issue(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.issue_at(user_id, Utc::now()).await
    }

    pub(crate) async fn issue_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<String, AuthError> {
        let signed = self.keys.sign(user_id, now)?;
        let token = signed.token.clone();
        let expires_at = signed.expires_at.timestamp_millis();
        let created_at = now.timestamp_millis();

        self.db
            .blocking(move |db| db.insert_token(&user_id.to_string(), &signed.token, expires_at, created_at))
            .await?;

        debug!("Issued token for user {}", user_id);
        Ok(token)
    }

    /// Blacklist every token recorded for the user. Returns how many moved.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<usize, AuthError> {
        let revoked = self
            .db
            .blocking(move |db| db.blacklist_user_tokens(&user_id.to_string(), now_ms()))
            .await?;

        info!("Revoked {} token(s) for user {}", revoked, user_id);
        Ok(revoked)
    }

    pub async fn is_blacklisted(&self, token: &str) -> Result<bool, AuthError> {
        let token = token.to_owned();
        Ok(self.db.blocking(move |db| db.is_token_blacklisted(&token)).await?)
    }
}
