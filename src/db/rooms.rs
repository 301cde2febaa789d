use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::*;
use crate::time_math::Weekday;

const ROOM_COLUMNS: &str = "id, name, code, creator_id, meeting_interval, meeting_day, created_at";

fn map_room(row: &Row<'_>) -> rusqlite::Result<DbRoom> {
    let interval: Option<u8> = row.get(4)?;
    let day: Option<Weekday> = row.get(5)?;
    Ok(DbRoom {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        creator_id: row.get(3)?,
        // Half-configured rows cannot be written (CHECK constraint); treat any as unset.
        preference: match (interval, day) {
            (Some(interval), Some(day)) => Some(MeetingPreference { interval, day }),
            _ => None,
        },
        created_at: row.get(6)?,
    })
}

impl ScheduleDb {
    // =========================================================================
    // Rooms
    // =========================================================================

    /// Insert a room with no meeting preference. Membership is left to the caller.
    pub fn insert_room(
        &self,
        name: &str,
        code: &str,
        creator_id: UserId,
    ) -> Result<DbRoom, DbError> {
        let created_at = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO rooms (name, code, creator_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, code, creator_id, created_at],
        )?;
        Ok(DbRoom {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            code: code.to_string(),
            creator_id,
            preference: None,
            created_at,
        })
    }

    pub fn get_room(&self, room_id: RoomId) -> Result<Option<DbRoom>, DbError> {
        let room = self
            .conn
            .query_row(
                &format!("SELECT {} FROM rooms WHERE id = ?1", ROOM_COLUMNS),
                params![room_id],
                map_room,
            )
            .optional()?;
        Ok(room)
    }

    pub fn get_room_by_code(&self, code: &str) -> Result<Option<DbRoom>, DbError> {
        let room = self
            .conn
            .query_row(
                &format!("SELECT {} FROM rooms WHERE code = ?1", ROOM_COLUMNS),
                params![code],
                map_room,
            )
            .optional()?;
        Ok(room)
    }

    /// Rooms the user belongs to, oldest first.
    pub fn get_rooms_for_user(&self, user_id: UserId) -> Result<Vec<DbRoom>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.name, r.code, r.creator_id, r.meeting_interval, r.meeting_day,
                    r.created_at
             FROM rooms r
             JOIN room_members rm ON r.id = rm.room_id
             WHERE rm.user_id = ?1
             ORDER BY r.created_at, r.id",
        )?;
        let rows = stmt.query_map(params![user_id], map_room)?;

        let mut rooms = Vec::new();
        for row in rows {
            rooms.push(row?);
        }
        Ok(rooms)
    }

    /// Write both preference columns in one statement.
    pub fn set_room_preference(
        &self,
        room_id: RoomId,
        preference: MeetingPreference,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE rooms SET meeting_interval = ?1, meeting_day = ?2 WHERE id = ?3",
            params![preference.interval, preference.day, room_id],
        )?;
        Ok(())
    }

    /// Delete a room together with everything hanging off it.
    pub fn delete_room_cascade(&self, room_id: RoomId) -> Result<(), DbError> {
        self.delete_availability_for_room(room_id)?;
        self.delete_meetings_for_room(room_id)?;
        self.delete_notes_for_room(room_id)?;
        self.conn
            .execute("DELETE FROM room_members WHERE room_id = ?1", params![room_id])?;
        self.conn
            .execute("DELETE FROM rooms WHERE id = ?1", params![room_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::{seed_room, seed_user, test_db};
    use crate::db::{MeetingPreference, NoteFields};
    use crate::time_math::Weekday;

    #[test]
    fn test_new_room_has_no_preference() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room(&db, &ana, "ROOM0001");

        let loaded = db.get_room(room.id).unwrap().expect("room");
        assert_eq!(loaded.preference, None);
        assert!(loaded.is_creator(ana.id));
        assert_eq!(
            db.get_room_by_code("ROOM0001").unwrap().map(|r| r.id),
            Some(room.id)
        );
    }

    #[test]
    fn test_set_preference_writes_both_columns() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room(&db, &ana, "ROOM0001");

        let pref = MeetingPreference {
            interval: 2,
            day: Weekday::Wednesday,
        };
        db.set_room_preference(room.id, pref).unwrap();
        assert_eq!(db.get_room(room.id).unwrap().unwrap().preference, Some(pref));
    }

    #[test]
    fn test_rooms_for_user_only_lists_memberships() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let first = seed_room(&db, &ana, "ROOM0001");
        seed_room(&db, &ben, "ROOM0002");

        let rooms = db.get_rooms_for_user(ana.id).unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, first.id);
    }

    #[test]
    fn test_delete_room_cascade_removes_members_and_notes() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room(&db, &ana, "ROOM0001");
        db.insert_note(
            room.id,
            ana.id,
            &NoteFields {
                title: "Agenda".to_string(),
                content: String::new(),
                color: "#ffffff".to_string(),
            },
        )
        .unwrap();

        db.delete_room_cascade(room.id).unwrap();
        assert!(db.get_room(room.id).unwrap().is_none());
        assert!(db.list_notes(room.id).unwrap().is_empty());
        assert!(db.get_rooms_for_user(ana.id).unwrap().is_empty());
    }
}
