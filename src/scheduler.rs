//! Scheduler for the meeting notification triggers
//!
//! Runs two cron-driven jobs against the shared datastore:
//! - Starting-now: emails every member when a confirmed meeting's window opens
//! - Day-before: reminds every member the evening before the meeting day
//!
//! Each meeting carries a marker per trigger. The marker is claimed with a
//! conditional UPDATE before anything is dispatched, so overlapping scans
//! notify at most once. The loop also detects sleep/wake time jumps and
//! catches up on jobs missed within a grace period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::db::{DbMeeting, DbRoom, DbUser, ScheduleDb};
use crate::error::ScheduleError;
use crate::notification::{self, DispatchPort, EmailMessage};
use crate::state::{AppState, JobId};
use crate::time_math::{within_slot, ClockTime, Weekday};
use crate::types::ScheduleEntry;

/// Grace period for missed jobs (2 hours)
const MISSED_JOB_GRACE_PERIOD_SECS: i64 = 7200;

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// How far back a scheduled time still counts as due on a regular poll
const DUE_WINDOW_SECS: i64 = 120;

const POLL_INTERVAL_SECS: u64 = 30;

const SESSION_PURGE_INTERVAL_HOURS: i64 = 24;

pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the scheduler loop
    ///
    /// This runs indefinitely. Trigger failures are logged and the loop
    /// carries on with the next poll.
    pub async fn run(&self) {
        let mut last_check = Utc::now();
        let mut last_session_purge = Utc::now();
        log::info!("Notification scheduler started");

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let now = Utc::now();

            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), checking for missed jobs",
                    time_jump
                );
                self.check_missed_jobs(now);
            }

            self.check_and_run_due_jobs(now);

            if (now - last_session_purge).num_hours() >= SESSION_PURGE_INTERVAL_HOURS {
                self.purge_expired_sessions(now);
                last_session_purge = now;
            }

            last_check = now;
        }
    }

    fn jobs(&self) -> [(JobId, &ScheduleEntry); 2] {
        let schedules = &self.state.config.schedules;
        [
            (JobId::MeetingStarted, &schedules.meeting_started),
            (JobId::DayBeforeReminder, &schedules.day_before_reminder),
        ]
    }

    fn check_and_run_due_jobs(&self, now: DateTime<Utc>) {
        for (job, entry) in self.jobs() {
            if !entry.enabled {
                continue;
            }
            let last_run = self.state.get_last_scheduled_run(job);
            match find_due_time(entry, last_run, now) {
                Ok(Some(scheduled)) => self.run_job(job, entry, scheduled, now),
                Ok(None) => {}
                Err(e) => log::warn!("Schedule for {} is unusable: {}", job.as_str(), e),
            }
        }
    }

    fn check_missed_jobs(&self, now: DateTime<Utc>) {
        for (job, entry) in self.jobs() {
            if !entry.enabled {
                continue;
            }
            let last_run = self.state.get_last_scheduled_run(job);
            if let Ok(Some(scheduled)) = find_missed_job(entry, last_run, now) {
                log::info!("Found missed '{}' job, running now", job.as_str());
                self.run_job(job, entry, scheduled, now);
            }
        }
    }

    fn run_job(&self, job: JobId, entry: &ScheduleEntry, scheduled: DateTime<Utc>, now: DateTime<Utc>) {
        self.state.set_last_scheduled_run(job, scheduled);

        let local_now = match local_time(entry, now) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Skipping {}: {}", job.as_str(), e);
                return;
            }
        };

        let db = self.state.db.lock();
        let dispatch = self.state.dispatch.as_ref();
        let result = match job {
            JobId::MeetingStarted => run_started_trigger(&db, dispatch, &local_now),
            JobId::DayBeforeReminder => run_day_before_trigger(&db, dispatch, &local_now),
        };

        match result {
            Ok(0) => log::debug!("{}: nothing to send", job.as_str()),
            Ok(count) => log::info!("{}: notified members of {} meeting(s)", job.as_str(), count),
            Err(e) => log::error!("{} trigger failed: {}", job.as_str(), e),
        }
    }

    fn purge_expired_sessions(&self, now: DateTime<Utc>) {
        let db = self.state.db.lock();
        match db.purge_expired_sessions(now) {
            Ok(count) if count > 0 => log::info!("Purged {} expired sessions", count),
            Ok(_) => {}
            Err(e) => log::warn!("Failed to purge expired sessions: {}", e),
        }
    }
}

/// Parse a cron expression
pub fn parse_cron(expr: &str) -> Result<Schedule, ScheduleError> {
    // The cron crate expects 6 fields (with seconds), but we use 5-field format
    let full_expr = format!("0 {}", expr);

    full_expr.parse::<Schedule>().map_err(|e| {
        ScheduleError::Configuration(format!("Invalid cron expression '{}': {}", expr, e))
    })
}

fn parse_timezone(entry: &ScheduleEntry) -> Result<Tz, ScheduleError> {
    entry
        .timezone
        .parse()
        .map_err(|_| ScheduleError::Configuration(format!("Invalid timezone: {}", entry.timezone)))
}

/// Wall-clock time in the schedule's timezone. Meeting days and times are
/// compared against this, never against UTC.
pub fn local_time(entry: &ScheduleEntry, now: DateTime<Utc>) -> Result<NaiveDateTime, ScheduleError> {
    Ok(now.with_timezone(&parse_timezone(entry)?).naive_local())
}

/// The latest scheduled time in the due window that has not run yet.
pub fn find_due_time(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    latest_unrun(entry, last_run, now, DUE_WINDOW_SECS)
}

/// Like `find_due_time`, over the missed-job grace period.
pub fn find_missed_job(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    latest_unrun(entry, last_run, now, MISSED_JOB_GRACE_PERIOD_SECS)
}

fn latest_unrun(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_secs: i64,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_timezone(entry)?;
    let window_start = (now - chrono::Duration::seconds(window_secs)).with_timezone(&tz);

    let latest = schedule
        .after(&window_start)
        .map(|t| t.with_timezone(&Utc))
        .take_while(|t| *t <= now)
        .last();

    Ok(latest.filter(|scheduled| match last_run {
        Some(last) => last < *scheduled,
        None => true,
    }))
}

/// Get the next scheduled time for a job
pub fn get_next_run_time(entry: &ScheduleEntry) -> Result<DateTime<Utc>, ScheduleError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_timezone(entry)?;

    let next = schedule
        .upcoming(tz)
        .next()
        .ok_or_else(|| ScheduleError::Configuration("No upcoming scheduled time".to_string()))?;

    Ok(next.with_timezone(&Utc))
}

// =============================================================================
// Triggers
// =============================================================================

/// Email every member of each meeting whose window contains `now`.
///
/// Returns the number of meetings notified.
pub fn run_started_trigger(
    db: &ScheduleDb,
    dispatch: &dyn DispatchPort,
    now: &NaiveDateTime,
) -> Result<usize, ScheduleError> {
    let today = Weekday::of(now);
    let clock = ClockTime::of(now);

    let mut notified = 0;
    for meeting in db.get_unsent_meetings_on(today)? {
        if !within_slot(meeting.start_time, meeting.end_time, clock) {
            continue;
        }
        if !db.claim_started_notification(meeting.id)? {
            log::debug!("Meeting {} already claimed by another scan", meeting.id);
            continue;
        }
        if let Some(batch) = member_batch(db, &meeting, notification::meeting_started) {
            dispatch.dispatch(batch);
        }
        notified += 1;
    }
    Ok(notified)
}

/// Remind members of meetings on tomorrow's weekday, once per calendar date.
pub fn run_day_before_trigger(
    db: &ScheduleDb,
    dispatch: &dyn DispatchPort,
    now: &NaiveDateTime,
) -> Result<usize, ScheduleError> {
    let tomorrow = Weekday::of(now).next();
    let date = now.date().format("%Y-%m-%d").to_string();

    let mut notified = 0;
    for meeting in db.get_unreminded_meetings_on(tomorrow, &date)? {
        if !db.claim_day_before_reminder(meeting.id, &date)? {
            continue;
        }
        if let Some(batch) = member_batch(db, &meeting, notification::meeting_tomorrow) {
            dispatch.dispatch(batch);
        }
        notified += 1;
    }
    Ok(notified)
}

/// One email per member of the meeting's room. A lookup failure is logged
/// and yields no batch; the marker stays claimed.
fn member_batch(
    db: &ScheduleDb,
    meeting: &DbMeeting,
    template: fn(&DbRoom, &DbMeeting, &DbUser) -> EmailMessage,
) -> Option<Vec<EmailMessage>> {
    let room = match db.get_room(meeting.room_id) {
        Ok(Some(room)) => room,
        Ok(None) => {
            log::warn!("Meeting {} refers to missing room {}", meeting.id, meeting.room_id);
            return None;
        }
        Err(e) => {
            log::warn!("Meeting {}: failed to load room: {}", meeting.id, e);
            return None;
        }
    };
    match db.get_room_members(room.id) {
        Ok(members) => Some(members.iter().map(|m| template(&room, meeting, m)).collect()),
        Err(e) => {
            log::warn!("Meeting {}: failed to load members: {}", meeting.id, e);
            None
        }
    }
}
