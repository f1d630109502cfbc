use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::Session;

/// Read-only summary over an already divided session list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub total_events: usize,
    pub avg_event_count: f64,
    pub avg_duration_secs: f64,
    pub by_application: BTreeMap<String, usize>,
    pub shortest: Option<SessionExtreme>,
    pub longest: Option<SessionExtreme>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExtreme {
    pub id: Uuid,
    pub duration_secs: f64,
}

impl SessionExtreme {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id,
            duration_secs: duration_secs(session),
        }
    }
}

fn duration_secs(session: &Session) -> f64 {
    session.duration().num_milliseconds() as f64 / 1000.0
}

impl SessionStats {
    pub fn compute(sessions: &[Session]) -> Self {
        let mut stats = SessionStats::default();
        if sessions.is_empty() {
            return stats;
        }

        let mut total_secs = 0.0;
        for session in sessions {
            stats.total_events += session.event_count;
            let secs = duration_secs(session);
            total_secs += secs;

            let app = session.application.clone().unwrap_or_else(|| "unknown".to_string());
            *stats.by_application.entry(app).or_insert(0) += 1;

            // Ties keep the earliest session.
            if stats.shortest.as_ref().map_or(true, |s| secs < s.duration_secs) {
                stats.shortest = Some(SessionExtreme::of(session));
            }
            if stats.longest.as_ref().map_or(true, |s| secs > s.duration_secs) {
                stats.longest = Some(SessionExtreme::of(session));
            }
        }

        stats.total_sessions = sessions.len();
        stats.avg_event_count = stats.total_events as f64 / sessions.len() as f64;
        stats.avg_duration_secs = total_secs / sessions.len() as f64;
        stats
    }
}

/// Sessions with at least `min_events` events, order preserved.
pub fn filter_by_event_count(sessions: &[Session], min_events: usize) -> Vec<Session> {
    sessions
        .iter()
        .filter(|s| s.event_count >= min_events)
        .cloned()
        .collect()
}
