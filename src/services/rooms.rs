// Rooms service: create, join, leave, and membership listings.

use serde::Serialize;
use uuid::Uuid;

use crate::db::{DbRoom, DbUser, RoomId, ScheduleDb, UserId};
use crate::error::ScheduleError;

use super::{load_room, require_user};

pub const MIN_ROOM_NAME_LEN: usize = 3;
pub const MAX_ROOM_NAME_LEN: usize = 50;
pub const INVITE_CODE_LEN: usize = 8;
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaveOutcome {
    Left,
    RoomDeleted,
}

fn new_invite_code() -> String {
    Uuid::new_v4().simple().to_string()[..INVITE_CODE_LEN].to_uppercase()
}

fn validate_room_name(raw: &str) -> Result<String, ScheduleError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(MIN_ROOM_NAME_LEN..=MAX_ROOM_NAME_LEN).contains(&len) {
        return Err(ScheduleError::invalid(format!(
            "room name must be between {} and {} characters",
            MIN_ROOM_NAME_LEN, MAX_ROOM_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Create a room with a fresh invite code; the creator becomes its first member.
pub fn create_room(db: &ScheduleDb, creator: UserId, name: &str) -> Result<DbRoom, ScheduleError> {
    let name = validate_room_name(name)?;
    require_user(db, creator)?;

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = new_invite_code();
        let created = db.with_transaction(|tx| -> Result<DbRoom, ScheduleError> {
            let room = tx.insert_room(&name, &code, creator)?;
            tx.add_member(room.id, creator)?;
            Ok(room)
        });
        match created {
            Ok(room) => {
                log::info!("Room {} '{}' created by user {} ({})", room.id, room.name, creator, room.code);
                return Ok(room);
            }
            Err(ScheduleError::Conflict(_)) => {
                log::warn!("Invite code collision on attempt {}, regenerating", attempt);
            }
            Err(e) => return Err(e),
        }
    }
    Err(ScheduleError::Conflict(
        "could not allocate a unique invite code".to_string(),
    ))
}

/// Join by invite code. Codes match case-insensitively.
pub fn join_room(db: &ScheduleDb, user_id: UserId, code: &str) -> Result<DbRoom, ScheduleError> {
    let code = code.trim().to_uppercase();
    let room = db
        .get_room_by_code(&code)?
        .ok_or_else(|| ScheduleError::NotFound(format!("Room with code {}", code)))?;
    require_user(db, user_id)?;

    if db.is_member(room.id, user_id)? {
        return Err(ScheduleError::Conflict(format!(
            "already a member of room {}",
            room.id
        )));
    }
    db.add_member(room.id, user_id)?;
    log::info!("User {} joined room {}", user_id, room.id);
    Ok(room)
}

/// Leave a room. The creator leaving deletes the room with all its data.
pub fn leave_room(
    db: &ScheduleDb,
    room_id: RoomId,
    user_id: UserId,
) -> Result<LeaveOutcome, ScheduleError> {
    let room = load_room(db, room_id)?;

    if room.is_creator(user_id) {
        db.with_transaction(|tx| -> Result<(), ScheduleError> {
            tx.delete_room_cascade(room_id)?;
            Ok(())
        })?;
        log::info!("Room {} deleted by its creator", room_id);
        return Ok(LeaveOutcome::RoomDeleted);
    }

    db.with_transaction(|tx| -> Result<(), ScheduleError> {
        if !tx.remove_member(room_id, user_id)? {
            return Err(ScheduleError::NotFound(format!(
                "Membership of user {} in room {}",
                user_id, room_id
            )));
        }
        tx.delete_availability(room_id, user_id)?;
        Ok(())
    })?;
    log::info!("User {} left room {}", user_id, room_id);
    Ok(LeaveOutcome::Left)
}

pub fn get_room(db: &ScheduleDb, room_id: RoomId) -> Result<DbRoom, ScheduleError> {
    load_room(db, room_id)
}

pub fn list_members(db: &ScheduleDb, room_id: RoomId) -> Result<Vec<DbUser>, ScheduleError> {
    load_room(db, room_id)?;
    Ok(db.get_room_members(room_id)?)
}

pub fn list_rooms_for_user(db: &ScheduleDb, user_id: UserId) -> Result<Vec<DbRoom>, ScheduleError> {
    Ok(db.get_rooms_for_user(user_id)?)
}
