//! ScheduleMate: rooms vote on a weekly meeting slot, the creator confirms
//! it, and every member is emailed on confirmation, the evening before, and
//! when the meeting starts.

pub mod auth;
pub mod commands;
pub mod db;
pub mod error;
mod migrations;
pub mod notification;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod tally;
pub mod time_math;
pub mod types;

use std::sync::Arc;

use db::ScheduleDb;
use notification::BackgroundDispatcher;
use scheduler::Scheduler;
use state::AppState;

/// Load config, open the datastore and run the dispatch worker plus the
/// notification scheduler until interrupted.
pub fn run() -> Result<(), String> {
    let config = types::load_config()?;

    let db_path = ScheduleDb::resolve_path(config.database_path.as_deref())
        .map_err(|e| format!("Failed to resolve database path: {}", e))?;
    let db = ScheduleDb::open_at(db_path.clone())
        .map_err(|e| format!("Failed to open database at {}: {}", db_path.display(), e))?;
    log::info!("Database ready at {}", db_path.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    runtime.block_on(async move {
        let notifier = notification::notifier_from_config(&config.email);
        let (dispatcher, receiver) = BackgroundDispatcher::channel();
        let state = Arc::new(AppState::new(config, db, Arc::new(dispatcher)));

        let worker = tokio::spawn(notification::run_dispatch_worker(receiver, notifier));

        let scheduler_state = state.clone();
        let scheduler = tokio::spawn(async move {
            Scheduler::new(scheduler_state).run().await;
        });

        for (name, entry) in [
            ("meeting_started", &state.config.schedules.meeting_started),
            ("day_before_reminder", &state.config.schedules.day_before_reminder),
        ] {
            match scheduler::get_next_run_time(entry) {
                Ok(next) if entry.enabled => log::info!("Next {} run at {}", name, next),
                Ok(_) => log::info!("{} is disabled", name),
                Err(e) => log::warn!("{} schedule is invalid: {}", name, e),
            }
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
        }
        log::info!("Shutting down");

        scheduler.abort();
        let _ = scheduler.await;
        // Dropping the last dispatcher closes the queue; the worker drains what is left.
        drop(state);
        if let Err(e) = worker.await {
            log::warn!("Dispatch worker ended abnormally: {}", e);
        }
    });

    Ok(())
}
