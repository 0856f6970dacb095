//! The bearer-token check.
//!
//! REST requests and WebSocket handshakes both go through
//! [`AuthGate::authenticate`]; there is no second implementation. The checks
//! run in a fixed order and stop at the first failure:
//!
//! 1. token present
//! 2. signature and expiry
//! 3. subject still exists
//! 4. email confirmed
//! 5. issued no earlier than the last password change (millisecond precision)
//! 6. not blacklisted

use std::sync::Arc;

use notecast_db::Database;
use notecast_types::models::Role;
use tracing::debug;
use uuid::Uuid;

use crate::{AuthError, JwtKeys, TokenLedger};

/// The authenticated caller, attached to request extensions or to a
/// WebSocket connection.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub email_confirmed: bool,
    pub profile_picture: Option<String>,
    pub notifications: bool,
}

impl Principal {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AuthError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[derive(Clone)]
pub struct AuthGate {
    db: Arc<Database>,
    keys: Arc<JwtKeys>,
    ledger: TokenLedger,
}

impl AuthGate {
    pub fn new(db: Arc<Database>, keys: Arc<JwtKeys>, ledger: TokenLedger) -> Self {
        Self { db, keys, ledger }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::Unauthenticated),
        };

        let claims = self.keys.verify(token)?;

        let user_id = claims.sub;
        let user = self
            .db
            .blocking(move |db| db.get_user_by_id(&user_id.to_string()))
            .await?
            .ok_or(AuthError::UserGone)?;

        if !user.email_confirmed {
            return Err(AuthError::EmailNotConfirmed);
        }

        if let Some(changed_at_ms) = user.password_changed_at {
            if claims.iat_ms < changed_at_ms {
                debug!("Stale token for user {} (iat_ms {})", user_id, claims.iat_ms);
                return Err(AuthError::StaleToken);
            }
        }

        if self.ledger.is_blacklisted(token).await? {
            return Err(AuthError::SessionRevoked);
        }

        let role = user
            .role
            .parse::<Role>()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("user {}: {}", user_id, e)))?;

        Ok(Principal {
            user_id,
            email: user.email,
            name: user.name,
            role,
            email_confirmed: user.email_confirmed,
            profile_picture: user.profile_picture,
            notifications: user.notifications,
        })
    }
}
