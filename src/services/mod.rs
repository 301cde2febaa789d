// Scheduling services: the business rules between the command surface and the datastore.
// Every function takes an explicit `&ScheduleDb` (and a dispatch port where it notifies).

pub mod availability;
pub mod meetings;
pub mod notes;
pub mod preferences;
pub mod rooms;

use crate::db::{DbRoom, RoomId, ScheduleDb, UserId};
use crate::error::ScheduleError;
use crate::time_math::{ClockTime, Weekday};

/// Longest free-text location we store.
pub const MAX_LOCATION_LEN: usize = 100;

pub(crate) fn load_room(db: &ScheduleDb, room_id: RoomId) -> Result<DbRoom, ScheduleError> {
    db.get_room(room_id)?
        .ok_or_else(|| ScheduleError::NotFound(format!("Room {}", room_id)))
}

/// Load the room and check that `user_id` belongs to it.
pub(crate) fn require_member(
    db: &ScheduleDb,
    room_id: RoomId,
    user_id: UserId,
) -> Result<DbRoom, ScheduleError> {
    let room = load_room(db, room_id)?;
    if !db.is_member(room_id, user_id)? {
        return Err(ScheduleError::Forbidden(format!(
            "not a member of room {}",
            room_id
        )));
    }
    Ok(room)
}

pub(crate) fn require_user(db: &ScheduleDb, user_id: UserId) -> Result<(), ScheduleError> {
    match db.get_user(user_id)? {
        Some(_) => Ok(()),
        None => Err(ScheduleError::NotFound(format!("User {}", user_id))),
    }
}

pub(crate) fn parse_day(raw: &str) -> Result<Weekday, ScheduleError> {
    raw.parse()
        .map_err(|e| ScheduleError::invalid(format!("day: {}", e)))
}

pub(crate) fn parse_time(field: &str, raw: &str) -> Result<ClockTime, ScheduleError> {
    raw.parse()
        .map_err(|e| ScheduleError::invalid(format!("{}: {}", field, e)))
}

pub(crate) fn parse_location(raw: &str) -> Result<String, ScheduleError> {
    let location = raw.trim();
    if location.is_empty() {
        return Err(ScheduleError::invalid("location is required"));
    }
    if location.chars().count() > MAX_LOCATION_LEN {
        return Err(ScheduleError::invalid(format!(
            "location is too long (max {} characters)",
            MAX_LOCATION_LEN
        )));
    }
    Ok(location.to_string())
}
