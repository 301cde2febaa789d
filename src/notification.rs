//! Outbound email notifications.
//!
//! Two seams:
//! - [`Notifier`]: delivers one message (SendGrid in production, a logger when
//!   no API key is configured).
//! - [`DispatchPort`]: accepts a batch and returns immediately. Callers hand
//!   it a batch only after their state change has been written.
//!
//! Delivery is best effort. A failed recipient is logged and never retried,
//! and never holds up the rest of its batch.

use std::sync::Arc;

use async_trait::async_trait;
use html_escape::encode_safe;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::db::{DbMeeting, DbRoom, DbUser, MeetingPreference};
use crate::types::EmailConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Email API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Dispatch queue closed")]
    QueueClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Fire-and-forget handoff of a batch of messages.
pub trait DispatchPort: Send + Sync {
    fn dispatch(&self, batch: Vec<EmailMessage>);
}

// =============================================================================
// Templates
// =============================================================================

/// Wraps a message in the shared email layout. `heading` and `lead` are
/// markup; user-supplied text in them must already be escaped. The greeting
/// name and row values are escaped here.
fn card(heading: &str, greeting_name: &str, lead: &str, rows: &[(&str, String)]) -> String {
    let details: String = rows
        .iter()
        .map(|(label, value)| format!("<p><strong>{}:</strong> {}</p>", label, encode_safe(value)))
        .collect();
    format!(
        "<div style=\"font-family: Arial, sans-serif; color: #333;\">\
         <h3>{}</h3><p>Hello <strong>{}</strong>,</p><p>{}</p>\
         <div style=\"background: #f3f4f6; padding: 15px; border-radius: 8px;\">{}</div></div>",
        heading,
        encode_safe(greeting_name),
        lead,
        details
    )
}

/// "Meeting confirmed", sent to every member when the creator confirms.
pub fn meeting_confirmed(room: &DbRoom, meeting: &DbMeeting, member: &DbUser) -> EmailMessage {
    let when = format!(
        "{}, {} - {}",
        meeting.meeting_day, meeting.start_time, meeting.end_time
    );
    EmailMessage {
        to: member.email.clone(),
        subject: format!("Meeting Confirmed for \"{}\"", room.name),
        text: format!(
            "Hello {},\n\nThe meeting for \"{}\" has been confirmed.\n\nWhen: {}\nLocation: {}\n\nSee you there!",
            member.username, room.name, when, meeting.location
        ),
        html: card(
            "Meeting Confirmed",
            &member.username,
            &format!("The meeting for <strong>{}</strong> has been confirmed.", encode_safe(&room.name)),
            &[("When", when), ("Location", meeting.location.clone())],
        ),
    }
}

/// "Happening now", sent by the starting-now trigger.
pub fn meeting_started(room: &DbRoom, meeting: &DbMeeting, member: &DbUser) -> EmailMessage {
    EmailMessage {
        to: member.email.clone(),
        subject: format!("Happening Now: Meeting in \"{}\"", room.name),
        text: format!(
            "Hello {},\n\nThe meeting for \"{}\" has started!\n\nTime: {}\nLocation: {}\n\nHop in!",
            member.username, room.name, meeting.start_time, meeting.location
        ),
        html: card(
            "Meeting Started!",
            &member.username,
            &format!("The meeting for <strong>{}</strong> is happening right now.", encode_safe(&room.name)),
            &[
                ("Time", meeting.start_time.to_string()),
                ("Location", meeting.location.clone()),
            ],
        ),
    }
}

/// "Meeting tomorrow", sent by the day-before trigger.
pub fn meeting_tomorrow(room: &DbRoom, meeting: &DbMeeting, member: &DbUser) -> EmailMessage {
    EmailMessage {
        to: member.email.clone(),
        subject: format!("Reminder: Meeting Tomorrow for \"{}\"", room.name),
        text: format!(
            "Hello {},\n\nJust a reminder that you have a meeting tomorrow!\n\nRoom: {}\nTime: {}\nLocation: {}\n\nSee you there!",
            member.username, room.name, meeting.start_time, meeting.location
        ),
        html: card(
            "Meeting Reminder",
            &member.username,
            "Don't forget, you have a meeting coming up tomorrow:",
            &[
                ("Room", room.name.clone()),
                ("Time", meeting.start_time.to_string()),
                ("Location", meeting.location.clone()),
            ],
        ),
    }
}

/// "Details changed", sent to members other than the creator after a preference change.
pub fn preference_changed(
    room: &DbRoom,
    preference: MeetingPreference,
    member: &DbUser,
) -> EmailMessage {
    EmailMessage {
        to: member.email.clone(),
        subject: format!("Update: Meeting Details for \"{}\" Changed", room.name),
        text: format!(
            "Hello {},\n\nThe meeting for \"{}\" is now on {} for {} hour(s). Please log in and update your availability.",
            member.username, room.name, preference.day, preference.interval
        ),
        html: card(
            "Meeting Update",
            &member.username,
            &format!(
                "The meeting for <strong>{}</strong> has been updated. Please log in and update your availability.",
                encode_safe(&room.name)
            ),
            &[
                ("Day", preference.day.to_string()),
                ("Length", format!("{} hour(s)", preference.interval)),
            ],
        ),
    }
}

// =============================================================================
// Notifiers
// =============================================================================

/// SendGrid v3 `mail/send` client.
pub struct SendGridNotifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_address: String,
}

#[derive(Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct SendGridPersonalization<'a> {
    to: [SendGridAddress<'a>; 1],
}

#[derive(Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct SendGridRequest<'a> {
    personalizations: [SendGridPersonalization<'a>; 1],
    from: SendGridAddress<'a>,
    subject: &'a str,
    content: [SendGridContent<'a>; 2],
}

impl SendGridNotifier {
    pub fn new(api_key: String, from_address: String, api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from_address,
        }
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let body = SendGridRequest {
            personalizations: [SendGridPersonalization {
                to: [SendGridAddress { email: &message.to }],
            }],
            from: SendGridAddress {
                email: &self.from_address,
            },
            subject: &message.subject,
            content: [
                SendGridContent {
                    kind: "text/plain",
                    value: &message.text,
                },
                SendGridContent {
                    kind: "text/html",
                    value: &message.html,
                },
            ],
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        log::info!(
            "Email (not sent, no API key): to={} subject={:?}",
            message.to,
            message.subject
        );
        Ok(())
    }
}

/// Pick the notifier the config allows.
pub fn notifier_from_config(config: &EmailConfig) -> Arc<dyn Notifier> {
    match config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => Arc::new(SendGridNotifier::new(
            key.to_string(),
            config.from_address.clone(),
            config.api_url.clone(),
        )),
        None => {
            log::warn!("No email API key configured; notifications will only be logged");
            Arc::new(LogNotifier)
        }
    }
}

// =============================================================================
// Background dispatch
// =============================================================================

/// Queues batches for [`run_dispatch_worker`]. Never blocks the caller.
pub struct BackgroundDispatcher {
    sender: mpsc::UnboundedSender<Vec<EmailMessage>>,
}

impl BackgroundDispatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<EmailMessage>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DispatchPort for BackgroundDispatcher {
    fn dispatch(&self, batch: Vec<EmailMessage>) {
        if batch.is_empty() {
            return;
        }
        let size = batch.len();
        if self.sender.send(batch).is_err() {
            log::error!("{}: dropped batch of {} message(s)", NotifyError::QueueClosed, size);
        }
    }
}

/// Send one batch, every recipient concurrently. Returns how many succeeded.
pub async fn deliver_batch(notifier: Arc<dyn Notifier>, batch: Vec<EmailMessage>) -> usize {
    let mut tasks = JoinSet::new();
    for message in batch {
        let notifier = notifier.clone();
        tasks.spawn(async move {
            match notifier.send(&message).await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to email {}: {}", message.to, e);
                    false
                }
            }
        });
    }

    let mut delivered = 0;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(true) => delivered += 1,
            Ok(false) => {}
            Err(e) => log::warn!("Email task panicked: {}", e),
        }
    }
    delivered
}

/// Drain queued batches until every [`BackgroundDispatcher`] is dropped.
pub async fn run_dispatch_worker(
    mut receiver: mpsc::UnboundedReceiver<Vec<EmailMessage>>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(batch) = receiver.recv().await {
        let total = batch.len();
        // Each batch runs on its own task so a slow provider doesn't stall the queue.
        let notifier = notifier.clone();
        tokio::spawn(async move {
            let delivered = deliver_batch(notifier, batch).await;
            log::info!("Delivered {}/{} notification(s)", delivered, total);
        });
    }
    log::info!("Notification dispatch worker stopped");
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use parking_lot::Mutex;

    /// Records every batch handed to it.
    #[derive(Default)]
    pub struct RecordingDispatcher {
        batches: Mutex<Vec<Vec<EmailMessage>>>,
    }

    impl RecordingDispatcher {
        pub fn batches(&self) -> Vec<Vec<EmailMessage>> {
            self.batches.lock().clone()
        }

        pub fn messages(&self) -> Vec<EmailMessage> {
            self.batches.lock().iter().flatten().cloned().collect()
        }
    }

    impl DispatchPort for RecordingDispatcher {
        fn dispatch(&self, batch: Vec<EmailMessage>) {
            self.batches.lock().push(batch);
        }
    }
}
