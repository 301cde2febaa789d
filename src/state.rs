use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::SessionAuthenticator;
use crate::db::ScheduleDb;
use crate::notification::DispatchPort;
use crate::types::Config;

/// Scheduled notification jobs tracked by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobId {
    MeetingStarted,
    DayBeforeReminder,
}

impl JobId {
    pub fn as_str(self) -> &'static str {
        match self {
            JobId::MeetingStarted => "meeting_started",
            JobId::DayBeforeReminder => "day_before_reminder",
        }
    }
}

/// Everything the command surface and the scheduler share.
///
/// The datastore handle and the dispatch port are injected so tests can
/// substitute an in-memory database and a recording dispatcher.
pub struct AppState {
    pub config: Config,
    pub db: parking_lot::Mutex<ScheduleDb>,
    pub dispatch: Arc<dyn DispatchPort>,
    pub auth: SessionAuthenticator,
    pub last_scheduled_run: Mutex<HashMap<JobId, DateTime<Utc>>>,
}

impl AppState {
    pub fn new(config: Config, db: ScheduleDb, dispatch: Arc<dyn DispatchPort>) -> Self {
        let auth = SessionAuthenticator::new(config.session_ttl_days);
        Self {
            config,
            db: parking_lot::Mutex::new(db),
            dispatch,
            auth,
            last_scheduled_run: Mutex::new(HashMap::new()),
        }
    }

    /// Record when a scheduled run last occurred
    pub fn set_last_scheduled_run(&self, job: JobId, time: DateTime<Utc>) {
        if let Ok(mut guard) = self.last_scheduled_run.lock() {
            guard.insert(job, time);
        }
    }

    /// Get when a job last ran on schedule
    pub fn get_last_scheduled_run(&self, job: JobId) -> Option<DateTime<Utc>> {
        self.last_scheduled_run
            .lock()
            .ok()
            .and_then(|guard| guard.get(&job).cloned())
    }
}
