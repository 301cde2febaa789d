//! Operation-level command surface.
//!
//! Every command takes the caller's session token, resolves it to a user,
//! runs one service call under a single datastore lock, and returns either
//! the serializable result or an [`ErrorPayload`]. Transport wiring (HTTP,
//! RPC, CLI) sits outside this crate.

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

use crate::auth::hash_password;
use crate::db::{
    DbAvailability, DbMeeting, DbMemberMeeting, DbNote, DbRoom, DbUser, MeetingPreference, NoteId,
    RoomId, ScheduleDb, UserId,
};
use crate::error::{ErrorPayload, ScheduleError};
use crate::services::availability::{self, SubmitAvailability};
use crate::services::meetings::{self, ConfirmMeeting, MeetingBoard};
use crate::services::notes::{self, NoteDraft, UnreadNotes};
use crate::services::{preferences, require_member};
use crate::services::rooms::{self, LeaveOutcome};
use crate::state::AppState;
use crate::tally::Suggestion;

pub type CommandResult<T> = Result<T, ErrorPayload>;

/// A freshly issued session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub token: String,
    pub user: DbUser,
}

/// Resolve the caller and run `f` against the datastore.
fn authed<T>(
    state: &AppState,
    token: &str,
    f: impl FnOnce(&ScheduleDb, UserId) -> Result<T, ScheduleError>,
) -> CommandResult<T> {
    let db = state.db.lock();
    let user_id = state.auth.verify(&db, token)?;
    Ok(f(&db, user_id)?)
}

/// Like [`authed`], but the caller must also belong to `room_id`.
fn member_of<T>(
    state: &AppState,
    token: &str,
    room_id: RoomId,
    f: impl FnOnce(&ScheduleDb, UserId) -> Result<T, ScheduleError>,
) -> CommandResult<T> {
    authed(state, token, |db, user_id| {
        require_member(db, room_id, user_id)?;
        f(db, user_id)
    })
}

/// Local wall-clock time used to bucket the meeting board.
fn board_now(state: &AppState) -> NaiveDateTime {
    let entry = &state.config.schedules.meeting_started;
    crate::scheduler::local_time(entry, Utc::now()).unwrap_or_else(|e| {
        log::warn!("Falling back to UTC for the meeting board: {}", e);
        Utc::now().naive_utc()
    })
}

// =============================================================================
// Sessions
// =============================================================================

/// Create an account and open a session for it.
pub fn register_user(
    state: &AppState,
    username: &str,
    email: &str,
    password: &str,
) -> CommandResult<SessionInfo> {
    let username = username.trim();
    let email = email.trim();
    if username.is_empty() {
        return Err(ScheduleError::invalid("username is required").into());
    }
    if !email.contains('@') {
        return Err(ScheduleError::invalid("email address is malformed").into());
    }
    let password_hash = hash_password(password)?;

    let db = state.db.lock();
    let user = db.with_transaction(|tx| -> Result<DbUser, ScheduleError> {
        let user = tx.create_user(username, email)?;
        tx.set_password_hash(user.id, &password_hash)?;
        Ok(user)
    })?;
    let token = state.auth.issue(&db, user.id)?;
    log::info!("Registered user {} ({})", user.id, user.username);
    Ok(SessionInfo { token, user })
}

/// Open a new session from a username or email plus password.
pub fn login(state: &AppState, identifier: &str, password: &str) -> CommandResult<SessionInfo> {
    let db = state.db.lock();
    let (user, token) = state.auth.login(&db, identifier, password)?;
    log::info!("User {} logged in", user.id);
    Ok(SessionInfo { token, user })
}

pub fn current_user(state: &AppState, token: &str) -> CommandResult<DbUser> {
    authed(state, token, |db, user_id| {
        db.get_user(user_id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("User {}", user_id)))
    })
}

pub fn logout(state: &AppState, token: &str) -> CommandResult<()> {
    let db = state.db.lock();
    state.auth.revoke(&db, token)?;
    Ok(())
}

// =============================================================================
// Rooms
// =============================================================================

pub fn create_room(state: &AppState, token: &str, name: &str) -> CommandResult<DbRoom> {
    authed(state, token, |db, user_id| rooms::create_room(db, user_id, name))
}

pub fn join_room(state: &AppState, token: &str, code: &str) -> CommandResult<DbRoom> {
    authed(state, token, |db, user_id| rooms::join_room(db, user_id, code))
}

pub fn leave_room(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<LeaveOutcome> {
    authed(state, token, |db, user_id| rooms::leave_room(db, room_id, user_id))
}

pub fn get_room(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<DbRoom> {
    member_of(state, token, room_id, |db, _| rooms::get_room(db, room_id))
}

pub fn list_room_members(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<Vec<DbUser>> {
    member_of(state, token, room_id, |db, _| rooms::list_members(db, room_id))
}

pub fn list_my_rooms(state: &AppState, token: &str) -> CommandResult<Vec<DbRoom>> {
    authed(state, token, rooms::list_rooms_for_user)
}

// =============================================================================
// Preferences
// =============================================================================

pub fn set_schedule_preference(
    state: &AppState,
    token: &str,
    room_id: RoomId,
    interval: i64,
    day: &str,
) -> CommandResult<DbRoom> {
    authed(state, token, |db, user_id| {
        preferences::set_preference(db, state.dispatch.as_ref(), room_id, user_id, interval, day)
    })
}

pub fn get_schedule_preference(
    state: &AppState,
    token: &str,
    room_id: RoomId,
) -> CommandResult<Option<MeetingPreference>> {
    member_of(state, token, room_id, |db, _| preferences::get_preference(db, room_id))
}

// =============================================================================
// Availability
// =============================================================================

pub fn submit_availability(
    state: &AppState,
    token: &str,
    room_id: RoomId,
    request: &SubmitAvailability,
) -> CommandResult<DbAvailability> {
    authed(state, token, |db, user_id| availability::submit(db, room_id, user_id, request))
}

pub fn get_my_availability(
    state: &AppState,
    token: &str,
    room_id: RoomId,
) -> CommandResult<Option<DbAvailability>> {
    member_of(state, token, room_id, |db, user_id| availability::get_mine(db, room_id, user_id))
}

pub fn list_room_availability(
    state: &AppState,
    token: &str,
    room_id: RoomId,
) -> CommandResult<Vec<DbAvailability>> {
    member_of(state, token, room_id, |db, _| availability::list_for_room(db, room_id))
}

pub fn get_meeting_suggestion(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<Suggestion> {
    member_of(state, token, room_id, |db, _| availability::suggest_for_room(db, room_id))
}

// =============================================================================
// Meetings
// =============================================================================

pub fn confirm_meeting(
    state: &AppState,
    token: &str,
    room_id: RoomId,
    request: &ConfirmMeeting,
) -> CommandResult<DbMeeting> {
    authed(state, token, |db, user_id| {
        meetings::confirm(db, state.dispatch.as_ref(), room_id, user_id, request)
    })
}

pub fn get_latest_confirmed_meeting(
    state: &AppState,
    token: &str,
    room_id: RoomId,
) -> CommandResult<Option<DbMeeting>> {
    member_of(state, token, room_id, |db, _| meetings::get_latest_confirmed(db, room_id))
}

pub fn get_meeting_history(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<Vec<DbMeeting>> {
    member_of(state, token, room_id, |db, _| meetings::get_history(db, room_id))
}

/// History split into upcoming, active and past for the current week.
pub fn get_meeting_board(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<MeetingBoard> {
    let now = board_now(state);
    member_of(state, token, room_id, |db, _| {
        Ok(meetings::bucket_history(meetings::get_history(db, room_id)?, &now))
    })
}

pub fn list_my_meetings(state: &AppState, token: &str) -> CommandResult<Vec<DbMemberMeeting>> {
    authed(state, token, meetings::list_meetings_for_user)
}

// =============================================================================
// Notes
// =============================================================================

pub fn list_room_notes(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<Vec<DbNote>> {
    authed(state, token, |db, user_id| notes::list_notes(db, room_id, user_id))
}

pub fn create_note(
    state: &AppState,
    token: &str,
    room_id: RoomId,
    draft: &NoteDraft,
) -> CommandResult<DbNote> {
    authed(state, token, |db, user_id| notes::create_note(db, room_id, user_id, draft))
}

pub fn update_note(
    state: &AppState,
    token: &str,
    note_id: NoteId,
    draft: &NoteDraft,
) -> CommandResult<DbNote> {
    authed(state, token, |db, user_id| notes::update_note(db, note_id, user_id, draft))
}

pub fn delete_note(state: &AppState, token: &str, note_id: NoteId) -> CommandResult<()> {
    authed(state, token, |db, user_id| notes::delete_note(db, note_id, user_id))
}

pub fn get_unread_note_count(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<UnreadNotes> {
    authed(state, token, |db, user_id| notes::unread_count(db, room_id, user_id))
}

pub fn mark_notes_read(state: &AppState, token: &str, room_id: RoomId) -> CommandResult<()> {
    authed(state, token, |db, user_id| notes::mark_read(db, room_id, user_id))
}
