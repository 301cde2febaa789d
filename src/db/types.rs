//! Shared type definitions for the database layer.

use serde::Serialize;
use thiserror::Error;

use crate::time_math::{ClockTime, Weekday};

pub type RoomId = i64;
pub type UserId = i64;
pub type MeetingId = i64;
pub type NoteId = i64;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

impl DbError {
    /// True when the statement tripped a UNIQUE or PRIMARY KEY constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        }
    }
}

/// A row from the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

/// A room's configured weekly slot. Both halves exist or neither does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingPreference {
    /// Slot length in whole hours.
    pub interval: u8,
    pub day: Weekday,
}

/// A row from the `rooms` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRoom {
    pub id: RoomId,
    pub name: String,
    pub code: String,
    pub creator_id: UserId,
    pub preference: Option<MeetingPreference>,
    pub created_at: String,
}

impl DbRoom {
    pub fn is_creator(&self, user_id: UserId) -> bool {
        self.creator_id == user_id
    }
}

/// A row from the `availability` table, joined with the submitter's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAvailability {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub location: String,
    pub updated_at: String,
}

/// A row from the `meetings` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMeeting {
    pub id: MeetingId,
    pub room_id: RoomId,
    pub confirmed_by: UserId,
    pub meeting_day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub location: String,
    pub created_at: String,
    pub started_notification_sent: bool,
    /// Calendar date (`YYYY-MM-DD`) the day-before reminder last went out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_sent_for_date: Option<String>,
}

/// A meeting as listed on a member's dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMemberMeeting {
    #[serde(flatten)]
    pub meeting: DbMeeting,
    pub room_name: String,
    pub confirmed_by_username: String,
}

/// Values for a new `meetings` row.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub room_id: RoomId,
    pub confirmed_by: UserId,
    pub meeting_day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub location: String,
}

/// Values for an `availability` upsert.
#[derive(Debug, Clone)]
pub struct AvailabilitySlot {
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub location: String,
}

/// A row from the `notes` table, joined with the author's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbNote {
    pub id: NoteId,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub author_username: String,
    pub title: String,
    pub content: String,
    /// `#rrggbb`
    pub color: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Editable fields of a note.
#[derive(Debug, Clone)]
pub struct NoteFields {
    pub title: String,
    pub content: String,
    pub color: String,
}
