use anyhow::Result;
use rusqlite::types::Value;

use crate::models::{MediaRow, NewNotes, NoteRow, NoteTypeRow};
use crate::{Database, OptionalExt};

impl Database {
    // -- Note types --

    pub fn get_note_type(&self, id: i64) -> Result<Option<NoteTypeRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, disabled FROM note_types WHERE id = ?1",
                [id],
                |row| {
                    Ok(NoteTypeRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        disabled: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn set_note_type_disabled(&self, id: i64, disabled: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE note_types SET disabled = ?1 WHERE id = ?2",
                rusqlite::params![disabled, id],
            )?;
            Ok(())
        })
    }

    // -- Notes --

    /// Insert one note row per receiver and attach every media URL to each
    /// of them, all in a single transaction.
    pub fn insert_notes(&self, notes: &NewNotes<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut insert_note = tx.prepare(
                    "INSERT INTO notes (id, sender_id, receiver_id, type_id, title, message, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                let mut insert_media =
                    tx.prepare("INSERT INTO media (note_id, media_url) VALUES (?1, ?2)")?;

                for (note_id, receiver_id) in notes.receivers {
                    insert_note.execute(rusqlite::params![
                        note_id,
                        notes.sender_id,
                        receiver_id,
                        notes.type_id,
                        notes.title,
                        notes.message,
                        notes.created_at,
                    ])?;
                    for url in notes.media_urls {
                        insert_media.execute(rusqlite::params![note_id, url])?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Active notes received by `receiver_id` since `since` (ms), newest
    /// first, skipping disabled types. An empty `types` means all types.
    pub fn get_timeline(
        &self,
        receiver_id: &str,
        types: &[i64],
        since: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT n.id, n.sender_id, n.receiver_id, n.type_id, nt.name, n.title, n.message, n.active, n.created_at
                 FROM notes n
                 JOIN note_types nt ON n.type_id = nt.id
                 WHERE n.receiver_id = ?1
                   AND n.active = 1
                   AND n.created_at >= ?2
                   AND nt.disabled = 0",
            );
            let mut params: Vec<Value> = vec![Value::Text(receiver_id.to_string()), Value::Integer(since)];

            if !types.is_empty() {
                let placeholders: Vec<String> =
                    (0..types.len()).map(|i| format!("?{}", i + 3)).collect();
                sql.push_str(&format!(" AND n.type_id IN ({})", placeholders.join(", ")));
                params.extend(types.iter().map(|t| Value::Integer(*t)));
            }

            let next = params.len();
            sql.push_str(&format!(
                " ORDER BY n.created_at DESC, n.rowid DESC LIMIT ?{} OFFSET ?{}",
                next + 1,
                next + 2
            ));
            params.push(Value::Integer(limit as i64));
            params.push(Value::Integer(offset as i64));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok(NoteRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        type_id: row.get(3)?,
                        type_name: row.get(4)?,
                        title: row.get(5)?,
                        message: row.get(6)?,
                        active: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Batch-fetch media for a set of note IDs.
    pub fn get_media_for_notes(&self, note_ids: &[String]) -> Result<Vec<MediaRow>> {
        if note_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=note_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT note_id, media_url FROM media WHERE note_id IN ({}) ORDER BY id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(note_ids.iter()), |row| {
                    Ok(MediaRow {
                        note_id: row.get(0)?,
                        media_url: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Soft-delete notes, but only the receiver's own rows. Returns how many
    /// rows were switched off.
    pub fn deactivate_notes(&self, receiver_id: &str, note_ids: &[String]) -> Result<usize> {
        if note_ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (0..note_ids.len()).map(|i| format!("?{}", i + 2)).collect();
            let sql = format!(
                "UPDATE notes SET active = 0 WHERE receiver_id = ?1 AND active = 1 AND id IN ({})",
                placeholders.join(", ")
            );
            let params = std::iter::once(receiver_id).chain(note_ids.iter().map(String::as_str));
            let changed = conn.execute(&sql, rusqlite::params_from_iter(params))?;
            Ok(changed)
        })
    }

    /// Per-type counts of the notes a receiver can currently see.
    pub fn count_visible_notes_by_type(&self, receiver_id: &str, since: i64) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT nt.name, COUNT(*)
                 FROM notes n
                 JOIN note_types nt ON n.type_id = nt.id
                 WHERE n.receiver_id = ?1
                   AND n.active = 1
                   AND n.created_at >= ?2
                   AND nt.disabled = 0
                 GROUP BY nt.id
                 ORDER BY nt.id",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![receiver_id, since], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
