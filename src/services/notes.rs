// Notes service: a shared board per room. Any member posts; only the author edits or deletes.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{DbNote, NoteFields, NoteId, RoomId, ScheduleDb, UserId};
use crate::error::ScheduleError;

use super::require_member;

pub const MAX_NOTE_TITLE_LEN: usize = 100;
pub const MAX_NOTE_CONTENT_LEN: usize = 5000;
pub const DEFAULT_NOTE_COLOR: &str = "#ffffff";

/// Note fields as they arrive from a caller. Missing text fields are stored empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadNotes {
    pub count: i64,
}

fn bounded(field: &str, raw: Option<&str>, max: usize) -> Result<String, ScheduleError> {
    let value = raw.unwrap_or("").trim();
    if value.chars().count() > max {
        return Err(ScheduleError::invalid(format!(
            "{} is too long (max {} characters)",
            field, max
        )));
    }
    Ok(value.to_string())
}

/// `#rrggbb`, stored lowercase.
fn parse_color(raw: &str) -> Result<String, ScheduleError> {
    let color = raw.trim();
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].bytes().all(|b| b.is_ascii_hexdigit());
    if !valid {
        return Err(ScheduleError::invalid(format!(
            "color '{}' is not a #rrggbb value",
            color
        )));
    }
    Ok(color.to_ascii_lowercase())
}

fn validate(draft: &NoteDraft, fallback_color: &str) -> Result<NoteFields, ScheduleError> {
    Ok(NoteFields {
        title: bounded("title", draft.title.as_deref(), MAX_NOTE_TITLE_LEN)?,
        content: bounded("content", draft.content.as_deref(), MAX_NOTE_CONTENT_LEN)?,
        color: parse_color(draft.color.as_deref().unwrap_or(fallback_color))?,
    })
}

/// Load a note the caller may change: they must still be in the room and be its author.
fn load_own_note(db: &ScheduleDb, note_id: NoteId, user_id: UserId) -> Result<DbNote, ScheduleError> {
    let note = db
        .get_note(note_id)?
        .ok_or_else(|| ScheduleError::NotFound(format!("Note {}", note_id)))?;
    require_member(db, note.room_id, user_id)?;
    if note.author_id != user_id {
        return Err(ScheduleError::Forbidden(
            "only the author can change this note".to_string(),
        ));
    }
    Ok(note)
}

pub fn create_note(
    db: &ScheduleDb,
    room_id: RoomId,
    user_id: UserId,
    draft: &NoteDraft,
) -> Result<DbNote, ScheduleError> {
    require_member(db, room_id, user_id)?;
    let fields = validate(draft, DEFAULT_NOTE_COLOR)?;
    let note = db.insert_note(room_id, user_id, &fields)?;
    log::info!("Room {}: note {} posted by user {}", room_id, note.id, user_id);
    Ok(note)
}

pub fn list_notes(db: &ScheduleDb, room_id: RoomId, user_id: UserId) -> Result<Vec<DbNote>, ScheduleError> {
    require_member(db, room_id, user_id)?;
    Ok(db.list_notes(room_id)?)
}

/// Replace a note's text. An omitted color keeps the current one.
pub fn update_note(
    db: &ScheduleDb,
    note_id: NoteId,
    user_id: UserId,
    draft: &NoteDraft,
) -> Result<DbNote, ScheduleError> {
    let note = load_own_note(db, note_id, user_id)?;
    let fields = validate(draft, &note.color)?;
    if !db.update_note(note_id, &fields)? {
        return Err(ScheduleError::NotFound(format!("Note {}", note_id)));
    }
    db.get_note(note_id)?
        .ok_or_else(|| ScheduleError::NotFound(format!("Note {}", note_id)))
}

pub fn delete_note(db: &ScheduleDb, note_id: NoteId, user_id: UserId) -> Result<(), ScheduleError> {
    let note = load_own_note(db, note_id, user_id)?;
    db.delete_note(note_id)?;
    log::info!("Room {}: note {} deleted by its author", note.room_id, note_id);
    Ok(())
}

/// Notes from other members posted since the caller last opened the board.
pub fn unread_count(db: &ScheduleDb, room_id: RoomId, user_id: UserId) -> Result<UnreadNotes, ScheduleError> {
    require_member(db, room_id, user_id)?;
    Ok(UnreadNotes {
        count: db.count_unread_notes(room_id, user_id)?,
    })
}

pub fn mark_read(db: &ScheduleDb, room_id: RoomId, user_id: UserId) -> Result<(), ScheduleError> {
    require_member(db, room_id, user_id)?;
    db.mark_notes_read(room_id, user_id, Utc::now())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{seed_room, seed_user, test_db};

    fn draft(title: &str, color: Option<&str>) -> NoteDraft {
        NoteDraft {
            title: Some(title.to_string()),
            content: Some("chapters 3 and 4".to_string()),
            color: color.map(str::to_string),
        }
    }

    #[test]
    fn test_members_post_and_read_notes() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let room = seed_room(&db, &ana, "ROOM0001");
        db.add_member(room.id, ben.id).unwrap();

        let note = create_note(&db, room.id, ben.id, &draft("  Reading ", None)).unwrap();
        assert_eq!(note.title, "Reading");
        assert_eq!(note.color, DEFAULT_NOTE_COLOR);
        assert_eq!(note.author_username, "ben");

        let blank = create_note(&db, room.id, ana.id, &NoteDraft::default()).unwrap();
        assert_eq!(blank.title, "");
        assert_eq!(list_notes(&db, room.id, ana.id).unwrap().len(), 2);
    }

    #[test]
    fn test_outsiders_see_nothing() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let eve = seed_user(&db, "eve");
        let room = seed_room(&db, &ana, "ROOM0001");
        create_note(&db, room.id, ana.id, &draft("Agenda", None)).unwrap();

        for result in [
            list_notes(&db, room.id, eve.id).map(|_| ()),
            create_note(&db, room.id, eve.id, &draft("Spam", None)).map(|_| ()),
            unread_count(&db, room.id, eve.id).map(|_| ()),
            mark_read(&db, room.id, eve.id),
        ] {
            assert!(matches!(result, Err(ScheduleError::Forbidden(_))));
        }
    }

    #[test]
    fn test_only_author_edits_or_deletes() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let room = seed_room(&db, &ana, "ROOM0001");
        db.add_member(room.id, ben.id).unwrap();
        let note = create_note(&db, room.id, ben.id, &draft("Reading", Some("#FFEEAA"))).unwrap();
        assert_eq!(note.color, "#ffeeaa");

        assert!(matches!(
            update_note(&db, note.id, ana.id, &draft("Mine now", None)),
            Err(ScheduleError::Forbidden(_))
        ));
        assert!(matches!(
            delete_note(&db, note.id, ana.id),
            Err(ScheduleError::Forbidden(_))
        ));

        let updated = update_note(&db, note.id, ben.id, &draft("Reading list", None)).unwrap();
        assert_eq!(updated.title, "Reading list");
        assert_eq!(updated.color, "#ffeeaa", "omitted color is kept");

        delete_note(&db, note.id, ben.id).unwrap();
        assert!(matches!(
            delete_note(&db, note.id, ben.id),
            Err(ScheduleError::NotFound(_))
        ));
    }

    #[test]
    fn test_bad_fields_are_invalid() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room(&db, &ana, "ROOM0001");

        for bad in [
            draft("Agenda", Some("red")),
            draft("Agenda", Some("#12345g")),
            draft(&"t".repeat(MAX_NOTE_TITLE_LEN + 1), None),
        ] {
            assert!(matches!(
                create_note(&db, room.id, ana.id, &bad),
                Err(ScheduleError::InvalidArgument(_))
            ));
        }
        assert!(db.list_notes(room.id).unwrap().is_empty());
    }

    #[test]
    fn test_unread_then_mark_read() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let room = seed_room(&db, &ana, "ROOM0001");
        db.add_member(room.id, ben.id).unwrap();

        create_note(&db, room.id, ana.id, &draft("Agenda", None)).unwrap();
        create_note(&db, room.id, ana.id, &draft("Snacks", None)).unwrap();
        assert_eq!(unread_count(&db, room.id, ben.id).unwrap().count, 2);
        assert_eq!(unread_count(&db, room.id, ana.id).unwrap().count, 0);

        mark_read(&db, room.id, ben.id).unwrap();
        assert_eq!(unread_count(&db, room.id, ben.id).unwrap().count, 0);
    }
}
