use crate::models::{DigestRecipient, UserRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::Connection;

const USER_COLUMNS: &str = "id, name, email, password_hash, profile_picture, email_confirmed, \
     notifications, otp_hash, otp_expires_at, password_changed_at, role, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        created_at: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, name, email, password_hash, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Store a fresh OTP hash, replacing any previous one.
    pub fn set_otp(&self, id: &str, otp_hash: &str, expires_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET otp_hash = ?1, otp_expires_at = ?2 WHERE id = ?3",
                rusqlite::params![otp_hash, expires_at, id],
            )?;
            Ok(())
        })
    }

    /// Mark the email as confirmed and burn the OTP.
    pub fn confirm_email(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET email_confirmed = 1, otp_hash = NULL, otp_expires_at = NULL WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    /// Replace the password hash, stamp `password_changed_at` and burn any OTP.
    pub fn update_password(&self, id: &str, password_hash: &str, changed_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users
                 SET password_hash = ?1, password_changed_at = ?2, otp_hash = NULL, otp_expires_at = NULL
                 WHERE id = ?3",
                rusqlite::params![password_hash, changed_at, id],
            )?;
            Ok(())
        })
    }

    /// Update the editable profile fields; `None` leaves a field untouched.
    pub fn update_profile(
        &self,
        id: &str,
        name: Option<&str>,
        notifications: Option<bool>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users
                 SET name = COALESCE(?1, name), notifications = COALESCE(?2, notifications)
                 WHERE id = ?3",
                rusqlite::params![name, notifications, id],
            )?;
            Ok(())
        })
    }

    pub fn set_profile_picture(&self, id: &str, url: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET profile_picture = ?1 WHERE id = ?2",
                rusqlite::params![url, id],
            )?;
            Ok(())
        })
    }

    /// Returns false when no user has that email.
    pub fn set_user_role(&self, email: &str, role: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1 WHERE email = ?2",
                rusqlite::params![role, email],
            )?;
            Ok(changed > 0)
        })
    }

    /// How many of the given ids belong to existing users.
    pub fn count_existing_users(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT COUNT(*) FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );
            let count: i64 = conn.query_row(&sql, rusqlite::params_from_iter(ids.iter()), |row| {
                row.get(0)
            })?;
            Ok(count as usize)
        })
    }

    /// Confirmed users that opted into notifications.
    pub fn get_digest_recipients(&self) -> Result<Vec<DigestRecipient>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, name FROM users
                 WHERE notifications = 1 AND email_confirmed = 1
                 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(DigestRecipient {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                profile_picture: row.get(4)?,
                email_confirmed: row.get(5)?,
                notifications: row.get(6)?,
                otp_hash: row.get(7)?,
                otp_expires_at: row.get(8)?,
                password_changed_at: row.get(9)?,
                role: row.get(10)?,
                created_at: row.get(11)?,
            })
        })
        .optional()?;

    Ok(row)
}
