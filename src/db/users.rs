use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::*;

fn map_user(row: &Row<'_>) -> rusqlite::Result<DbUser> {
    Ok(DbUser {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
    })
}

impl ScheduleDb {
    // =========================================================================
    // Users
    // =========================================================================

    pub fn create_user(&self, username: &str, email: &str) -> Result<DbUser, DbError> {
        self.conn.execute(
            "INSERT INTO users (username, email, created_at) VALUES (?1, ?2, ?3)",
            params![username, email, Utc::now().to_rfc3339()],
        )?;
        Ok(DbUser {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    pub fn get_user(&self, user_id: UserId) -> Result<Option<DbUser>, DbError> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, email FROM users WHERE id = ?1",
                params![user_id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<DbUser>, DbError> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, email FROM users WHERE username = ?1",
                params![username],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn set_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id],
        )?;
        Ok(())
    }

    /// A user by username or email, with the stored password hash if any.
    pub fn get_login(&self, identifier: &str) -> Result<Option<(DbUser, Option<String>)>, DbError> {
        let login = self
            .conn
            .query_row(
                "SELECT id, username, email, password_hash FROM users
                 WHERE username = ?1 OR email = ?1
                 ORDER BY username = ?1 DESC
                 LIMIT 1",
                params![identifier],
                |row| Ok((map_user(row)?, row.get(3)?)),
            )
            .optional()?;
        Ok(login)
    }

    // =========================================================================
    // Membership
    // =========================================================================

    pub fn add_member(&self, room_id: RoomId, user_id: UserId) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO room_members (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![room_id, user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Returns true if a membership row was removed.
    pub fn remove_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, DbError> {
        let affected = self.conn.execute(
            "DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        Ok(affected > 0)
    }

    pub fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2")?;
        Ok(stmt.exists(params![room_id, user_id])?)
    }

    /// Members of a room with their contact addresses, in join order.
    pub fn get_room_members(&self, room_id: RoomId) -> Result<Vec<DbUser>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.username, u.email
             FROM room_members rm
             JOIN users u ON rm.user_id = u.id
             WHERE rm.room_id = ?1
             ORDER BY rm.joined_at, u.id",
        )?;
        let rows = stmt.query_map(params![room_id], map_user)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }
}
