use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::*;

fn map_availability(row: &Row<'_>) -> rusqlite::Result<DbAvailability> {
    Ok(DbAvailability {
        room_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        day: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        location: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl ScheduleDb {
    // =========================================================================
    // Availability ledger
    // =========================================================================

    /// Insert or overwrite the single entry for (room, user).
    ///
    /// One `INSERT ... ON CONFLICT DO UPDATE` statement, so two racing
    /// submissions from the same user always leave exactly one row.
    pub fn upsert_availability(
        &self,
        room_id: RoomId,
        user_id: UserId,
        slot: &AvailabilitySlot,
    ) -> Result<DbAvailability, DbError> {
        self.conn.execute(
            "INSERT INTO availability
                 (room_id, user_id, day, start_time, end_time, location, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (room_id, user_id) DO UPDATE SET
                 day = excluded.day,
                 start_time = excluded.start_time,
                 end_time = excluded.end_time,
                 location = excluded.location,
                 updated_at = excluded.updated_at",
            params![
                room_id,
                user_id,
                slot.day,
                slot.start_time,
                slot.end_time,
                slot.location,
                Utc::now().to_rfc3339(),
            ],
        )?;

        self.get_availability(room_id, user_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_availability(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<DbAvailability>, DbError> {
        let entry = self
            .conn
            .query_row(
                "SELECT a.room_id, a.user_id, u.username, a.day, a.start_time, a.end_time,
                        a.location, a.updated_at
                 FROM availability a
                 JOIN users u ON a.user_id = u.id
                 WHERE a.room_id = ?1 AND a.user_id = ?2",
                params![room_id, user_id],
                map_availability,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn list_availability(&self, room_id: RoomId) -> Result<Vec<DbAvailability>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.room_id, a.user_id, u.username, a.day, a.start_time, a.end_time,
                    a.location, a.updated_at
             FROM availability a
             JOIN users u ON a.user_id = u.id
             WHERE a.room_id = ?1
             ORDER BY a.id",
        )?;
        let rows = stmt.query_map(params![room_id], map_availability)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Returns the number of rows removed (0 or 1).
    pub fn delete_availability(&self, room_id: RoomId, user_id: UserId) -> Result<usize, DbError> {
        let affected = self.conn.execute(
            "DELETE FROM availability WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        Ok(affected)
    }

    pub fn delete_availability_for_room(&self, room_id: RoomId) -> Result<usize, DbError> {
        let affected = self
            .conn
            .execute("DELETE FROM availability WHERE room_id = ?1", params![room_id])?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::{seed_room, seed_user, test_db};
    use crate::db::AvailabilitySlot;
    use crate::time_math::Weekday;

    fn slot(start: &str, end: &str, location: &str) -> AvailabilitySlot {
        AvailabilitySlot {
            day: Weekday::Wednesday,
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            location: location.to_string(),
        }
    }

    #[test]
    fn test_upsert_overwrites_single_row() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room(&db, &ana, "ROOM0001");

        db.upsert_availability(room.id, ana.id, &slot("10:00", "12:00", "Library"))
            .unwrap();
        let second = db
            .upsert_availability(room.id, ana.id, &slot("14:00", "16:00", "Park"))
            .unwrap();

        let all = db.list_availability(room.id).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], second);
        assert_eq!(second.location, "Park");
        assert_eq!(second.username, "ana");
    }

    #[test]
    fn test_get_availability_missing() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room(&db, &ana, "ROOM0001");
        assert!(db.get_availability(room.id, ana.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_availability_scopes() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let room = seed_room(&db, &ana, "ROOM0001");
        db.add_member(room.id, ben.id).unwrap();

        db.upsert_availability(room.id, ana.id, &slot("10:00", "12:00", "Library"))
            .unwrap();
        db.upsert_availability(room.id, ben.id, &slot("10:00", "12:00", "Library"))
            .unwrap();

        assert_eq!(db.delete_availability(room.id, ben.id).unwrap(), 1);
        assert_eq!(db.list_availability(room.id).unwrap().len(), 1);
        assert_eq!(db.delete_availability_for_room(room.id).unwrap(), 1);
        assert!(db.list_availability(room.id).unwrap().is_empty());
    }
}
