// Preferences service: the room's weekly interval and day.
// Only the creator sets them; members cannot submit availability until they exist.

use crate::db::{DbRoom, MeetingPreference, RoomId, ScheduleDb, UserId};
use crate::error::ScheduleError;
use crate::notification::{self, DispatchPort};

use super::{load_room, parse_day};

/// Accepted meeting lengths, in hours.
pub const MIN_INTERVAL_HOURS: i64 = 1;
pub const MAX_INTERVAL_HOURS: i64 = 3;

fn validate_interval(interval: i64) -> Result<u8, ScheduleError> {
    if (MIN_INTERVAL_HOURS..=MAX_INTERVAL_HOURS).contains(&interval) {
        Ok(interval as u8)
    } else {
        Err(ScheduleError::invalid(format!(
            "interval must be between {} and {} hours, got {}",
            MIN_INTERVAL_HOURS, MAX_INTERVAL_HOURS, interval
        )))
    }
}

/// Set both halves of the room's preference at once.
///
/// When the values actually change, availability already submitted against
/// the old slot is purged in the same transaction. Members other than the
/// creator are then told to resubmit.
pub fn set_preference(
    db: &ScheduleDb,
    dispatch: &dyn DispatchPort,
    room_id: RoomId,
    requesting_user: UserId,
    interval: i64,
    day: &str,
) -> Result<DbRoom, ScheduleError> {
    let room = load_room(db, room_id)?;
    if !room.is_creator(requesting_user) {
        return Err(ScheduleError::forbidden("set the meeting preference"));
    }

    let preference = MeetingPreference {
        interval: validate_interval(interval)?,
        day: parse_day(day)?,
    };

    let changed = room.preference != Some(preference);
    db.with_transaction(|tx| -> Result<(), ScheduleError> {
        tx.set_room_preference(room_id, preference)?;
        if changed {
            let purged = tx.delete_availability_for_room(room_id)?;
            if purged > 0 {
                log::info!(
                    "Room {}: preference changed to {} x{}h, purged {} stale availability entries",
                    room_id,
                    preference.day,
                    preference.interval,
                    purged
                );
            }
        }
        Ok(())
    })?;

    let updated = DbRoom {
        preference: Some(preference),
        ..room
    };

    if changed {
        notify_members(db, dispatch, &updated, preference);
    }

    Ok(updated)
}

fn notify_members(
    db: &ScheduleDb,
    dispatch: &dyn DispatchPort,
    room: &DbRoom,
    preference: MeetingPreference,
) {
    match db.get_room_members(room.id) {
        Ok(members) => {
            let batch = members
                .iter()
                .filter(|m| !room.is_creator(m.id))
                .map(|m| notification::preference_changed(room, preference, m))
                .collect();
            dispatch.dispatch(batch);
        }
        Err(e) => log::warn!("Room {}: could not load members to notify: {}", room.id, e),
    }
}

/// The room's configured preference, `None` while unset.
pub fn get_preference(
    db: &ScheduleDb,
    room_id: RoomId,
) -> Result<Option<MeetingPreference>, ScheduleError> {
    Ok(load_room(db, room_id)?.preference)
}
