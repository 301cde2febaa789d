use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::*;

impl ScheduleDb {
    // =========================================================================
    // Sessions
    // =========================================================================

    pub fn insert_session(
        &self,
        token_hash: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                token_hash,
                user_id,
                Utc::now().to_rfc3339(),
                expires_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// The user behind an unexpired session.
    pub fn get_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, DbError> {
        let row: Option<(UserId, String)> = self
            .conn
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
                params![token_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.and_then(|(user_id, expires_at)| {
            match DateTime::parse_from_rfc3339(&expires_at) {
                Ok(expiry) if expiry.with_timezone(&Utc) > now => Some(user_id),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("Unreadable session expiry '{}': {}", expires_at, e);
                    None
                }
            }
        }))
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
        Ok(())
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, DbError> {
        let affected = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(affected)
    }
}
