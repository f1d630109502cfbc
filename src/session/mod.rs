//! Session Divider
//!
//! Splits a time-ordered event stream into bounded analysis units.

pub mod divider;
pub mod stats;

pub use divider::SessionDivider;
pub use stats::{filter_by_event_count, SessionStats};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::RawEvent;

/// A continuous run of user activity.
/// Invariant: `events` is time-ordered and `event_count == events.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub application: Option<String>,
    pub bundle_id: Option<String>,
    pub events: Vec<RawEvent>,
    pub event_count: usize,
}

impl Session {
    /// Opens a session on its first event.
    pub fn open(first: RawEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time: first.timestamp,
            end_time: Some(first.timestamp),
            application: first.application().map(str::to_string),
            bundle_id: first.bundle_id().map(str::to_string),
            events: vec![first],
            event_count: 1,
        }
    }

    pub(crate) fn push(&mut self, event: RawEvent) {
        self.end_time = Some(event.timestamp);
        self.events.push(event);
        self.event_count = self.events.len();
    }

    /// Latest known instant of the session.
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.end_time
            .or_else(|| self.events.last().map(|e| e.timestamp))
            .unwrap_or(self.start_time)
    }

    pub fn duration(&self) -> Duration {
        self.last_seen() - self.start_time
    }
}
