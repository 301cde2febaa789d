// Meetings service: creator confirmation, history, and the upcoming/active/past board.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::{DbMeeting, DbMemberMeeting, DbRoom, NewMeeting, RoomId, ScheduleDb, UserId};
use crate::error::ScheduleError;
use crate::notification::{self, DispatchPort};
use crate::time_math::{within_slot, ClockTime, Weekday};

use super::{load_room, parse_day, parse_location, parse_time};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmMeeting {
    pub day: String,
    pub start_time: String,
    pub location: String,
}

/// Persist a confirmed meeting and queue one email per member.
///
/// The row is written before anything is dispatched; delivery problems never
/// reach the caller.
pub fn confirm(
    db: &ScheduleDb,
    dispatch: &dyn DispatchPort,
    room_id: RoomId,
    requesting_user: UserId,
    request: &ConfirmMeeting,
) -> Result<DbMeeting, ScheduleError> {
    let room = load_room(db, room_id)?;
    if !room.is_creator(requesting_user) {
        return Err(ScheduleError::forbidden("confirm meetings"));
    }
    let preference = room.preference.ok_or(ScheduleError::PreferenceNotSet)?;

    let meeting_day = parse_day(&request.day)?;
    let start_time = parse_time("start_time", &request.start_time)?;
    let location = parse_location(&request.location)?;

    let meeting = db.insert_meeting(&NewMeeting {
        room_id,
        confirmed_by: requesting_user,
        meeting_day,
        start_time,
        end_time: start_time.add_hours(preference.interval),
        location,
    })?;
    log::info!(
        "Room {}: meeting {} confirmed for {} {}-{} at {}",
        room_id,
        meeting.id,
        meeting.meeting_day,
        meeting.start_time,
        meeting.end_time,
        meeting.location
    );

    notify_confirmed(db, dispatch, &room, &meeting);
    Ok(meeting)
}

fn notify_confirmed(db: &ScheduleDb, dispatch: &dyn DispatchPort, room: &DbRoom, meeting: &DbMeeting) {
    match db.get_room_members(room.id) {
        Ok(members) => {
            let batch = members
                .iter()
                .map(|member| notification::meeting_confirmed(room, meeting, member))
                .collect();
            dispatch.dispatch(batch);
        }
        Err(e) => log::warn!(
            "Meeting {}: could not load members for confirmation emails: {}",
            meeting.id,
            e
        ),
    }
}

pub fn get_latest_confirmed(
    db: &ScheduleDb,
    room_id: RoomId,
) -> Result<Option<DbMeeting>, ScheduleError> {
    load_room(db, room_id)?;
    Ok(db.get_latest_meeting(room_id)?)
}

/// Every meeting of the room, newest first.
pub fn get_history(db: &ScheduleDb, room_id: RoomId) -> Result<Vec<DbMeeting>, ScheduleError> {
    load_room(db, room_id)?;
    Ok(db.get_room_meetings(room_id)?)
}

pub fn list_meetings_for_user(
    db: &ScheduleDb,
    user_id: UserId,
) -> Result<Vec<DbMemberMeeting>, ScheduleError> {
    Ok(db.get_meetings_for_member(user_id)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MeetingStatus {
    Upcoming,
    Active,
    Past,
}

/// Place a weekly meeting relative to `now`, within the current Sunday-first week.
pub fn classify(
    day: Weekday,
    start: ClockTime,
    end: ClockTime,
    now: &NaiveDateTime,
) -> MeetingStatus {
    let today = Weekday::of(now);
    if day < today {
        return MeetingStatus::Past;
    }
    if day > today {
        return MeetingStatus::Upcoming;
    }

    let clock = ClockTime::of(now);
    if within_slot(start, end, clock) {
        MeetingStatus::Active
    } else if start <= end && clock > end {
        MeetingStatus::Past
    } else {
        MeetingStatus::Upcoming
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingBoard {
    pub upcoming: Vec<DbMeeting>,
    pub active: Vec<DbMeeting>,
    pub past: Vec<DbMeeting>,
}

/// Split history into board columns, keeping each column's input order.
pub fn bucket_history(meetings: Vec<DbMeeting>, now: &NaiveDateTime) -> MeetingBoard {
    let mut board = MeetingBoard::default();
    for meeting in meetings {
        match classify(meeting.meeting_day, meeting.start_time, meeting.end_time, now) {
            MeetingStatus::Upcoming => board.upcoming.push(meeting),
            MeetingStatus::Active => board.active.push(meeting),
            MeetingStatus::Past => board.past.push(meeting),
        }
    }
    board
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{seed_room, seed_room_with_preference, seed_user, test_db};
    use crate::notification::test_utils::RecordingDispatcher;
    use chrono::NaiveDate;

    fn request(day: &str, start: &str, location: &str) -> ConfirmMeeting {
        ConfirmMeeting {
            day: day.to_string(),
            start_time: start.to_string(),
            location: location.to_string(),
        }
    }

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    /// 2026-10-14 is a Wednesday.
    fn wednesday_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_confirm_persists_and_notifies_every_member() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let cam = seed_user(&db, "cam");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 2, Weekday::Wednesday);
        db.add_member(room.id, ben.id).unwrap();
        db.add_member(room.id, cam.id).unwrap();
        let dispatch = RecordingDispatcher::default();

        let meeting = confirm(&db, &dispatch, room.id, ana.id, &request("Wednesday", "10:00", "Library"))
            .unwrap();
        assert_eq!(meeting.start_time.to_string(), "10:00");
        assert_eq!(meeting.end_time.to_string(), "12:00");
        assert_eq!(meeting.confirmed_by, ana.id);
        assert!(!meeting.started_notification_sent);

        let recipients: Vec<String> = dispatch.messages().into_iter().map(|m| m.to).collect();
        assert_eq!(
            recipients,
            vec!["ana@example.com", "ben@example.com", "cam@example.com"]
        );
        assert_eq!(get_latest_confirmed(&db, room.id).unwrap(), Some(meeting));
    }

    #[test]
    fn test_non_creator_cannot_confirm() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let ben = seed_user(&db, "ben");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 2, Weekday::Wednesday);
        db.add_member(room.id, ben.id).unwrap();
        let dispatch = RecordingDispatcher::default();

        let err = confirm(&db, &dispatch, room.id, ben.id, &request("Wednesday", "10:00", "Library"))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Forbidden(_)));
        assert!(get_history(&db, room.id).unwrap().is_empty());
        assert!(dispatch.batches().is_empty());
    }

    #[test]
    fn test_confirm_needs_preference_and_room() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room(&db, &ana, "ROOM0001");
        let dispatch = RecordingDispatcher::default();

        let err = confirm(&db, &dispatch, room.id, ana.id, &request("Monday", "10:00", "Cafe"))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::PreferenceNotSet));

        let err = confirm(&db, &dispatch, 999, ana.id, &request("Monday", "10:00", "Cafe"))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::NotFound(_)));
    }

    #[test]
    fn test_confirm_wraps_end_time() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Friday);
        let dispatch = RecordingDispatcher::default();

        let meeting = confirm(&db, &dispatch, room.id, ana.id, &request("Friday", "23:30", "Dorm"))
            .unwrap();
        assert_eq!(meeting.end_time.to_string(), "00:30");
    }

    #[test]
    fn test_history_is_newest_first() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Monday);
        let dispatch = RecordingDispatcher::default();

        let first = confirm(&db, &dispatch, room.id, ana.id, &request("Monday", "09:00", "Cafe")).unwrap();
        let second = confirm(&db, &dispatch, room.id, ana.id, &request("Tuesday", "09:00", "Lab")).unwrap();

        let history = get_history(&db, room.id).unwrap();
        assert_eq!(history, vec![second.clone(), first]);
        assert_eq!(get_latest_confirmed(&db, room.id).unwrap(), Some(second));

        let mine = list_meetings_for_user(&db, ana.id).unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].room_name, "Study Group");
        assert_eq!(mine[0].confirmed_by_username, "ana");
    }

    #[test]
    fn test_classify_relative_to_today() {
        let now = wednesday_at(11, 0);
        assert_eq!(classify(Weekday::Tuesday, t("10:00"), t("11:00"), &now), MeetingStatus::Past);
        assert_eq!(classify(Weekday::Thursday, t("10:00"), t("11:00"), &now), MeetingStatus::Upcoming);
        assert_eq!(classify(Weekday::Wednesday, t("10:00"), t("12:00"), &now), MeetingStatus::Active);
        assert_eq!(classify(Weekday::Wednesday, t("08:00"), t("10:00"), &now), MeetingStatus::Past);
        assert_eq!(classify(Weekday::Wednesday, t("13:00"), t("14:00"), &now), MeetingStatus::Upcoming);
    }

    #[test]
    fn test_classify_window_edges_are_inclusive() {
        assert_eq!(
            classify(Weekday::Wednesday, t("10:00"), t("12:00"), &wednesday_at(10, 0)),
            MeetingStatus::Active
        );
        assert_eq!(
            classify(Weekday::Wednesday, t("10:00"), t("12:00"), &wednesday_at(12, 0)),
            MeetingStatus::Active
        );
        assert_eq!(
            classify(Weekday::Wednesday, t("10:00"), t("12:00"), &wednesday_at(12, 1)),
            MeetingStatus::Past
        );
    }

    #[test]
    fn test_classify_wrapped_slot() {
        let (start, end) = (t("23:30"), t("00:30"));
        assert_eq!(
            classify(Weekday::Wednesday, start, end, &wednesday_at(23, 45)),
            MeetingStatus::Active
        );
        assert_eq!(
            classify(Weekday::Wednesday, start, end, &wednesday_at(0, 15)),
            MeetingStatus::Upcoming
        );
    }

    #[test]
    fn test_bucket_history() {
        let db = test_db();
        let ana = seed_user(&db, "ana");
        let room = seed_room_with_preference(&db, &ana, "ROOM0001", 1, Weekday::Wednesday);
        let dispatch = RecordingDispatcher::default();
        for (day, start) in [("Monday", "09:00"), ("Wednesday", "10:30"), ("Saturday", "09:00")] {
            confirm(&db, &dispatch, room.id, ana.id, &request(day, start, "Cafe")).unwrap();
        }

        let board = bucket_history(get_history(&db, room.id).unwrap(), &wednesday_at(11, 0));
        assert_eq!(board.past.len(), 1);
        assert_eq!(board.past[0].meeting_day, Weekday::Monday);
        assert_eq!(board.active.len(), 1);
        assert_eq!(board.active[0].meeting_day, Weekday::Wednesday);
        assert_eq!(board.upcoming.len(), 1);
        assert_eq!(board.upcoming[0].meeting_day, Weekday::Saturday);
    }
}
