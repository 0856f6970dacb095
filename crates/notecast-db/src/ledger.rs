use anyhow::{Result, bail};

use crate::models::TokenRow;
use crate::{Database, OptionalExt};

impl Database {
    // -- Active tokens --

    pub fn insert_token(&self, user_id: &str, token: &str, expires_at: i64, created_at: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tokens (user_id, token, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, token, expires_at, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_tokens_for_user(&self, user_id: &str) -> Result<Vec<TokenRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, token, expires_at FROM tokens WHERE user_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(TokenRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        token: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Blacklist --

    /// Move every active token of a user into the blacklist, keeping the
    /// original expiry. Insert and delete run in one transaction; if the two
    /// counts disagree nothing is applied.
    pub fn blacklist_user_tokens(&self, user_id: &str, blacklisted_at: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT INTO blacklist_tokens (token, expires_at, created_at)
                 SELECT token, expires_at, ?2 FROM tokens WHERE user_id = ?1",
                rusqlite::params![user_id, blacklisted_at],
            )?;
            let deleted = tx.execute("DELETE FROM tokens WHERE user_id = ?1", [user_id])?;

            if inserted != deleted {
                // tx drops here and rolls back
                bail!(
                    "revocation mismatch for user {}: blacklisted {} but removed {}",
                    user_id,
                    inserted,
                    deleted
                );
            }

            tx.commit()?;
            Ok(deleted)
        })
    }

    pub fn is_token_blacklisted(&self, token: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let hit: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM blacklist_tokens WHERE token = ?1 LIMIT 1",
                    [token],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        })
    }

    /// Original expiry of a blacklisted token, if it was ever revoked.
    pub fn get_blacklisted_expiry(&self, token: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT expires_at FROM blacklist_tokens WHERE token = ?1 LIMIT 1",
                [token],
                |row| row.get(0),
            )
            .optional()
        })
    }
}
