use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            email               TEXT NOT NULL UNIQUE,
            password_hash       TEXT NOT NULL,
            profile_picture     TEXT,
            email_confirmed     INTEGER NOT NULL DEFAULT 0,
            notifications       INTEGER NOT NULL DEFAULT 0,
            otp_hash            TEXT,
            otp_expires_at      INTEGER,
            password_changed_at INTEGER,
            role                TEXT NOT NULL DEFAULT 'user',
            created_at          INTEGER NOT NULL
        );

        -- Active session ledger: one row per issued token
        CREATE TABLE IF NOT EXISTS tokens (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL REFERENCES users(id),
            token       TEXT NOT NULL UNIQUE,
            expires_at  INTEGER NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tokens_user
            ON tokens(user_id);

        CREATE TABLE IF NOT EXISTS blacklist_tokens (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            token       TEXT NOT NULL,
            expires_at  INTEGER NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_blacklist_token
            ON blacklist_tokens(token);

        CREATE TABLE IF NOT EXISTS note_types (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            disabled    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS notes (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            type_id     INTEGER NOT NULL REFERENCES note_types(id),
            title       TEXT NOT NULL,
            message     TEXT NOT NULL,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notes_receiver
            ON notes(receiver_id, active, created_at);

        CREATE TABLE IF NOT EXISTS media (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            note_id     TEXT NOT NULL REFERENCES notes(id),
            media_url   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_media_note
            ON media(note_id);

        -- Seed the default note types
        INSERT OR IGNORE INTO note_types (id, name, disabled) VALUES
            (1, 'Congrats', 0),
            (2, 'Invitations', 0),
            (3, 'Reminders', 0);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
