use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mining::Pattern;

/// Counters of one pipeline run. Contains no user content, only counts and times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub events: usize,
    pub sessions: usize,
    pub patterns: usize,
    pub valuable: usize,
    pub scored: usize,
    pub duration_ms: u64,
    /// Run stopped at a skip condition; nothing was persisted or published.
    pub skipped: bool,
}

impl AnalysisSummary {
    pub fn skipped(window_start: DateTime<Utc>, window_end: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            window_start,
            window_end,
            events: 0,
            sessions: 0,
            patterns: 0,
            valuable: 0,
            scored: 0,
            duration_ms,
            skipped: true,
        }
    }
}

/// Outcome of one run: counters plus the patterns it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: AnalysisSummary,
    pub patterns: Vec<Pattern>,
}

/// Messages published on the notification bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// Published once per successful, non-skipped run.
    Completed(AnalysisSummary),
}
