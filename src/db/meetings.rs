use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::*;
use crate::time_math::Weekday;

const MEETING_COLUMNS: &str = "m.id, m.room_id, m.confirmed_by, m.meeting_day, m.start_time, \
     m.end_time, m.location, m.created_at, m.started_email_sent, m.reminder_sent_for_date";

/// Only a room's latest confirmation is live; older rows are history.
const CURRENT_MEETING: &str = "m.id = (SELECT l.id FROM meetings l WHERE l.room_id = m.room_id \
     ORDER BY l.created_at DESC, l.id DESC LIMIT 1)";

fn map_meeting(row: &Row<'_>) -> rusqlite::Result<DbMeeting> {
    Ok(DbMeeting {
        id: row.get(0)?,
        room_id: row.get(1)?,
        confirmed_by: row.get(2)?,
        meeting_day: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        location: row.get(6)?,
        created_at: row.get(7)?,
        started_notification_sent: row.get(8)?,
        reminder_sent_for_date: row.get(9)?,
    })
}

impl ScheduleDb {
    // =========================================================================
    // Meetings
    // =========================================================================

    pub fn insert_meeting(&self, meeting: &NewMeeting) -> Result<DbMeeting, DbError> {
        let created_at = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO meetings
                 (room_id, confirmed_by, meeting_day, start_time, end_time, location, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                meeting.room_id,
                meeting.confirmed_by,
                meeting.meeting_day,
                meeting.start_time,
                meeting.end_time,
                meeting.location,
                created_at,
            ],
        )?;

        Ok(DbMeeting {
            id: self.conn.last_insert_rowid(),
            room_id: meeting.room_id,
            confirmed_by: meeting.confirmed_by,
            meeting_day: meeting.meeting_day,
            start_time: meeting.start_time,
            end_time: meeting.end_time,
            location: meeting.location.clone(),
            created_at,
            started_notification_sent: false,
            reminder_sent_for_date: None,
        })
    }

    pub fn get_meeting(&self, meeting_id: MeetingId) -> Result<Option<DbMeeting>, DbError> {
        let meeting = self
            .conn
            .query_row(
                &format!("SELECT {} FROM meetings m WHERE m.id = ?1", MEETING_COLUMNS),
                params![meeting_id],
                map_meeting,
            )
            .optional()?;
        Ok(meeting)
    }

    /// The room's current meeting: the most recently confirmed row.
    pub fn get_latest_meeting(&self, room_id: RoomId) -> Result<Option<DbMeeting>, DbError> {
        let meeting = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM meetings m WHERE m.room_id = ?1
                     ORDER BY m.created_at DESC, m.id DESC LIMIT 1",
                    MEETING_COLUMNS
                ),
                params![room_id],
                map_meeting,
            )
            .optional()?;
        Ok(meeting)
    }

    /// Every meeting ever confirmed for the room, newest first.
    pub fn get_room_meetings(&self, room_id: RoomId) -> Result<Vec<DbMeeting>, DbError> {
        self.query_meetings(
            &format!(
                "SELECT {} FROM meetings m WHERE m.room_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC",
                MEETING_COLUMNS
            ),
            params![room_id],
        )
    }

    /// Meetings across all of a user's rooms, newest first.
    pub fn get_meetings_for_member(
        &self,
        user_id: UserId,
    ) -> Result<Vec<DbMemberMeeting>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}, r.name, u.username
             FROM meetings m
             JOIN rooms r ON m.room_id = r.id
             JOIN room_members rm ON rm.room_id = r.id
             JOIN users u ON m.confirmed_by = u.id
             WHERE rm.user_id = ?1
             ORDER BY m.created_at DESC, m.id DESC",
            MEETING_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(DbMemberMeeting {
                meeting: map_meeting(row)?,
                room_name: row.get(10)?,
                confirmed_by_username: row.get(11)?,
            })
        })?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }
        Ok(meetings)
    }

    /// Current meetings on `day` whose starting notification has not gone out yet.
    pub fn get_unsent_meetings_on(&self, day: Weekday) -> Result<Vec<DbMeeting>, DbError> {
        self.query_meetings(
            &format!(
                "SELECT {} FROM meetings m
                 WHERE m.meeting_day = ?1 AND m.started_email_sent = 0
                   AND {}
                 ORDER BY m.id",
                MEETING_COLUMNS, CURRENT_MEETING
            ),
            params![day],
        )
    }

    /// Current meetings on `day` not yet reminded on calendar date `date`.
    pub fn get_unreminded_meetings_on(
        &self,
        day: Weekday,
        date: &str,
    ) -> Result<Vec<DbMeeting>, DbError> {
        self.query_meetings(
            &format!(
                "SELECT {} FROM meetings m
                 WHERE m.meeting_day = ?1
                   AND (m.reminder_sent_for_date IS NULL OR m.reminder_sent_for_date != ?2)
                   AND {}
                 ORDER BY m.id",
                MEETING_COLUMNS, CURRENT_MEETING
            ),
            params![day, date],
        )
    }

    /// Flip the starting marker. Returns false when another scan already did;
    /// the caller must not notify in that case.
    pub fn claim_started_notification(&self, meeting_id: MeetingId) -> Result<bool, DbError> {
        let affected = self.conn.execute(
            "UPDATE meetings SET started_email_sent = 1
             WHERE id = ?1 AND started_email_sent = 0",
            params![meeting_id],
        )?;
        Ok(affected == 1)
    }

    /// Stamp the day-before marker for `date`. Returns false when already stamped.
    pub fn claim_day_before_reminder(
        &self,
        meeting_id: MeetingId,
        date: &str,
    ) -> Result<bool, DbError> {
        let affected = self.conn.execute(
            "UPDATE meetings SET reminder_sent_for_date = ?2
             WHERE id = ?1
               AND (reminder_sent_for_date IS NULL OR reminder_sent_for_date != ?2)",
            params![meeting_id, date],
        )?;
        Ok(affected == 1)
    }

    pub fn delete_meetings_for_room(&self, room_id: RoomId) -> Result<usize, DbError> {
        let affected = self
            .conn
            .execute("DELETE FROM meetings WHERE room_id = ?1", params![room_id])?;
        Ok(affected)
    }

    fn query_meetings(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DbMeeting>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map_meeting)?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }
        Ok(meetings)
    }
}
