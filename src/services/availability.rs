// Availability service: one entry per member per room, validated against the room preference.
// End times are always computed here from the interval; a client-sent end time is ignored.

use serde::Deserialize;

use crate::db::{AvailabilitySlot, DbAvailability, MeetingPreference, RoomId, ScheduleDb, UserId};
use crate::error::ScheduleError;
use crate::tally::{self, Suggestion};

use super::{load_room, parse_day, parse_location, parse_time, require_member};

/// Raw submission as it arrives from a caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAvailability {
    pub day: String,
    pub start_time: String,
    pub location: String,
    /// Accepted for compatibility, never stored.
    #[serde(default)]
    pub end_time: Option<String>,
}

/// Validate and upsert the caller's entry for the room. Only members vote.
pub fn submit(
    db: &ScheduleDb,
    room_id: RoomId,
    user_id: UserId,
    request: &SubmitAvailability,
) -> Result<DbAvailability, ScheduleError> {
    let room = require_member(db, room_id, user_id)?;
    let preference = room.preference.ok_or(ScheduleError::PreferenceNotSet)?;

    let day = parse_day(&request.day)?;
    if day != preference.day {
        return Err(ScheduleError::DayMismatch {
            expected: preference.day,
            submitted: day,
        });
    }

    let start_time = parse_time("start_time", &request.start_time)?;
    let location = parse_location(&request.location)?;

    if let Some(sent) = request.end_time.as_deref() {
        log::debug!("Room {}: ignoring client end time {} from user {}", room_id, sent, user_id);
    }

    let slot = AvailabilitySlot {
        day,
        start_time,
        end_time: start_time.add_hours(preference.interval),
        location,
    };
    let entry = db.upsert_availability(room_id, user_id, &slot)?;
    log::info!(
        "Room {}: user {} available {} {}-{}",
        room_id,
        user_id,
        entry.day,
        entry.start_time,
        entry.end_time
    );
    Ok(entry)
}

pub fn list_for_room(db: &ScheduleDb, room_id: RoomId) -> Result<Vec<DbAvailability>, ScheduleError> {
    load_room(db, room_id)?;
    Ok(db.list_availability(room_id)?)
}

pub fn get_mine(
    db: &ScheduleDb,
    room_id: RoomId,
    user_id: UserId,
) -> Result<Option<DbAvailability>, ScheduleError> {
    Ok(db.get_availability(room_id, user_id)?)
}

pub fn remove_for_user_leaving_room(
    db: &ScheduleDb,
    room_id: RoomId,
    user_id: UserId,
) -> Result<usize, ScheduleError> {
    Ok(db.delete_availability(room_id, user_id)?)
}

pub fn remove_all_for_room(db: &ScheduleDb, room_id: RoomId) -> Result<usize, ScheduleError> {
    Ok(db.delete_availability_for_room(room_id)?)
}

/// Whether a stored entry still matches the room preference.
pub fn check_conformance(
    entry: &DbAvailability,
    preference: MeetingPreference,
) -> Result<(), ScheduleError> {
    if entry.day != preference.day {
        return Err(ScheduleError::DayMismatch {
            expected: preference.day,
            submitted: entry.day,
        });
    }
    let expected_minutes = u16::from(preference.interval) * 60;
    let submitted_minutes = entry.start_time.minutes_until(entry.end_time);
    if submitted_minutes != expected_minutes {
        return Err(ScheduleError::DurationMismatch {
            expected_minutes,
            submitted_minutes,
        });
    }
    Ok(())
}

/// Tally the room's conforming entries into a suggested slot and location.
pub fn suggest_for_room(db: &ScheduleDb, room_id: RoomId) -> Result<Suggestion, ScheduleError> {
    let room = load_room(db, room_id)?;
    let Some(preference) = room.preference else {
        return Ok(Suggestion::NoSuggestion);
    };

    let entries: Vec<DbAvailability> = db
        .list_availability(room_id)?
        .into_iter()
        .filter(|entry| match check_conformance(entry, preference) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Room {}: skipping availability of user {} in tally: {}",
                    room_id,
                    entry.user_id,
                    e
                );
                false
            }
        })
        .collect();

    Ok(tally::compute_suggestion(&entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{seed_room, seed_room_with_preference, seed_user, test_db};
    use crate::time_math::Weekday;

    fn request(day: &str, start: &str, location: &str) -> SubmitAvailability {
        SubmitAvailability {
            day: day.to_string(),
            start_time: start.to_string(),
            location: location.to_string(),
            end_time: None,
        }
    }

    #[test]
    fn test_submit_without_preference() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room(&db, &ana, "ROOM0001");

        let err = submit(&db, room.id, ana.id, &request("Monday", "10:00", "Library")).unwrap_err();
        assert!(matches!(err, ScheduleError::PreferenceNotSet));
        assert!(db.list_availability(room.id).unwrap().is_empty());
    }

    #[test]
    fn test_submit_on_wrong_day() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 2, Weekday::Wednesday);

        let err = submit(&db, room.id, ana.id, &request("Thursday", "10:00", "Library")).unwrap_err();
        match err {
            ScheduleError::DayMismatch { expected, submitted } => {
                assert_eq!(expected, Weekday::Wednesday);
                assert_eq!(submitted, Weekday::Thursday);
            }
            other => panic!("expected DayMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_end_time_is_server_computed() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 2, Weekday::Wednesday);

        let mut req = request("Wednesday", "10:00", "Library");
        req.end_time = Some("10:15".to_string());
        let entry = submit(&db, room.id, ana.id, &req).unwrap();
        assert_eq!(entry.end_time.to_string(), "12:00");
        assert_eq!(entry.username, "ana");
    }

    #[test]
    fn test_end_time_wraps_past_midnight() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Friday);

        let entry = submit(&db, room.id, ana.id, &request("Friday", "23:30", "Dorm")).unwrap();
        assert_eq!(entry.end_time.to_string(), "00:30");
    }

    #[test]
    fn test_resubmit_keeps_single_entry() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Monday);

        submit(&db, room.id, ana.id, &request("Monday", "09:00", "Cafe")).unwrap();
        submit(&db, room.id, ana.id, &request("Monday", "15:00", "Lab")).unwrap();

        let entries = list_for_room(&db, room.id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].start_time.to_string(), "15:00");
        assert_eq!(entries[0].location, "Lab");

        let mine = get_mine(&db, room.id, ana.id).unwrap().unwrap();
        assert_eq!(mine, entries[0]);
    }

    #[test]
    fn test_malformed_input_is_rejected_before_write() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Monday);

        for req in [
            request("Monday", "9am", "Cafe"),
            request("Monday", "10:00", "  "),
            request("Mon", "10:00", "Cafe"),
        ] {
            let err = submit(&db, room.id, ana.id, &req).unwrap_err();
            assert!(matches!(err, ScheduleError::InvalidArgument(_)), "{:?}", req);
        }
        assert!(get_mine(&db, room.id, ana.id).unwrap().is_none());
    }

    #[test]
    fn test_unknown_user_and_room() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Monday);

        let err = submit(&db, room.id, 404, &request("Monday", "10:00", "Cafe")).unwrap_err();
        assert!(matches!(err, ScheduleError::Forbidden(_)));
        let err = submit(&db, 404, ana.id, &request("Monday", "10:00", "Cafe")).unwrap_err();
        assert!(matches!(err, ScheduleError::NotFound(_)));
    }

    #[test]
    fn test_outsider_cannot_sway_the_tally() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let mallory = seed_user(&db, "mallory");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Monday);
        submit(&db, room.id, ana.id, &request("Monday", "18:00", "Cafe")).unwrap();

        let err = submit(&db, room.id, mallory.id, &request("Monday", "20:00", "Bar")).unwrap_err();
        assert!(matches!(err, ScheduleError::Forbidden(_)));
        assert!(get_mine(&db, room.id, mallory.id).unwrap().is_none());

        match suggest_for_room(&db, room.id).unwrap() {
            Suggestion::Suggested { best_location, .. } => {
                assert_eq!(best_location.location, "Cafe");
                assert_eq!(best_location.votes, 1);
            }
            Suggestion::NoSuggestion => panic!("expected a suggestion"),
        }
    }

    #[test]
    fn test_removals() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Monday);
        db.add_member(room.id, ben.id).unwrap();
        submit(&db, room.id, ana.id, &request("Monday", "10:00", "Cafe")).unwrap();
        submit(&db, room.id, ben.id, &request("Monday", "11:00", "Cafe")).unwrap();

        assert_eq!(remove_for_user_leaving_room(&db, room.id, ben.id).unwrap(), 1);
        assert_eq!(remove_for_user_leaving_room(&db, room.id, ben.id).unwrap(), 0);
        assert_eq!(remove_all_for_room(&db, room.id).unwrap(), 1);
        assert!(list_for_room(&db, room.id).unwrap().is_empty());
    }

    #[test]
    fn test_conformance_detects_stale_duration() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Monday);
        let entry = submit(&db, room.id, ana.id, &request("Monday", "23:30", "Cafe")).unwrap();

        let same = MeetingPreference { interval: 1, day: Weekday::Monday };
        assert!(check_conformance(&entry, same).is_ok());

        let longer = MeetingPreference { interval: 2, day: Weekday::Monday };
        match check_conformance(&entry, longer) {
            Err(ScheduleError::DurationMismatch {
                expected_minutes,
                submitted_minutes,
            }) => {
                assert_eq!(expected_minutes, 120);
                assert_eq!(submitted_minutes, 60);
            }
            other => panic!("expected DurationMismatch, got {:?}", other),
        }

        let other_day = MeetingPreference { interval: 1, day: Weekday::Tuesday };
        assert!(matches!(
            check_conformance(&entry, other_day),
            Err(ScheduleError::DayMismatch { .. })
        ));
    }

    #[test]
    fn test_suggest_for_room() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let cam = seed_user(&db, "cam");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 2, Weekday::Wednesday);
        db.add_member(room.id, ben.id).unwrap();
        db.add_member(room.id, cam.id).unwrap();

        assert_eq!(suggest_for_room(&db, room.id).unwrap(), Suggestion::NoSuggestion);

        submit(&db, room.id, ana.id, &request("Wednesday", "10:00", "Library")).unwrap();
        submit(&db, room.id, ben.id, &request("Wednesday", "10:00", "Library")).unwrap();
        submit(&db, room.id, cam.id, &request("Wednesday", "14:00", "Park")).unwrap();

        match suggest_for_room(&db, room.id).unwrap() {
            Suggestion::Suggested {
                best_slot,
                best_location,
                ..
            } => {
                assert_eq!(best_slot.slot.start_time.to_string(), "10:00");
                assert_eq!(best_slot.votes, 2);
                assert_eq!(best_location.location, "Library");
            }
            Suggestion::NoSuggestion => panic!("expected a suggestion"),
        }
    }

    #[test]
    fn test_suggest_skips_nonconforming_rows() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Monday);
        // Written straight to the store, bypassing the ledger's checks.
        db.upsert_availability(
            room.id,
            ana.id,
            &AvailabilitySlot {
                day: Weekday::Monday,
                start_time: "10:00".parse().unwrap(),
                end_time: "13:00".parse().unwrap(),
                location: "Cafe".to_string(),
            },
        )
        .unwrap();

        assert_eq!(suggest_for_room(&db, room.id).unwrap(), Suggestion::NoSuggestion);
    }
}
