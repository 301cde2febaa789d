use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::*;

const NOTE_COLUMNS: &str = "n.id, n.room_id, n.author_id, u.username, n.title, n.content,
     n.color, n.created_at, n.updated_at";

/// Fixed-width UTC stamps so text comparison orders them correctly.
fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_note(row: &Row<'_>) -> rusqlite::Result<DbNote> {
    Ok(DbNote {
        id: row.get(0)?,
        room_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        color: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl ScheduleDb {
    // =========================================================================
    // Notes
    // =========================================================================

    pub fn insert_note(
        &self,
        room_id: RoomId,
        author_id: UserId,
        fields: &NoteFields,
    ) -> Result<DbNote, DbError> {
        let now = stamp(Utc::now());
        self.conn.execute(
            "INSERT INTO notes (room_id, author_id, title, content, color, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![room_id, author_id, fields.title, fields.content, fields.color, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_note(id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_note(&self, note_id: NoteId) -> Result<Option<DbNote>, DbError> {
        let note = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM notes n JOIN users u ON n.author_id = u.id WHERE n.id = ?1",
                    NOTE_COLUMNS
                ),
                params![note_id],
                map_note,
            )
            .optional()?;
        Ok(note)
    }

    /// Notes on a room's board, newest first.
    pub fn list_notes(&self, room_id: RoomId) -> Result<Vec<DbNote>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM notes n JOIN users u ON n.author_id = u.id
             WHERE n.room_id = ?1
             ORDER BY n.created_at DESC, n.id DESC",
            NOTE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![room_id], map_note)?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }

    /// Returns false when the note no longer exists.
    pub fn update_note(&self, note_id: NoteId, fields: &NoteFields) -> Result<bool, DbError> {
        let affected = self.conn.execute(
            "UPDATE notes SET title = ?1, content = ?2, color = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                fields.title,
                fields.content,
                fields.color,
                stamp(Utc::now()),
                note_id
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_note(&self, note_id: NoteId) -> Result<bool, DbError> {
        let affected = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1", params![note_id])?;
        Ok(affected > 0)
    }

    pub fn delete_notes_for_room(&self, room_id: RoomId) -> Result<usize, DbError> {
        Ok(self
            .conn
            .execute("DELETE FROM notes WHERE room_id = ?1", params![room_id])?)
    }

    /// Notes by other members created since `user_id` last opened the board.
    pub fn count_unread_notes(&self, room_id: RoomId, user_id: UserId) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*)
             FROM notes n
             JOIN room_members rm ON rm.room_id = n.room_id AND rm.user_id = ?2
             WHERE n.room_id = ?1
               AND n.author_id != ?2
               AND (rm.last_notes_viewed_at IS NULL OR n.created_at > rm.last_notes_viewed_at)",
            params![room_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Returns false when `user_id` is not a member of the room.
    pub fn mark_notes_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let affected = self.conn.execute(
            "UPDATE room_members SET last_notes_viewed_at = ?1 WHERE room_id = ?2 AND user_id = ?3",
            params![stamp(at), room_id, user_id],
        )?;
        Ok(affected > 0)
    }
}
