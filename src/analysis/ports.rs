//! Contracts of the collaborators around the pipeline.
//! Adapters return `anyhow::Result`; the orchestrator decides what a failure means for the run.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::summary::AnalysisEvent;
use crate::event::RawEvent;
use crate::mining::{AiVerdict, Pattern};

/// Source of captured events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events in `[start, end)`, ascending by timestamp.
    async fn find_events_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<RawEvent>>;
}

/// Durable home of mined patterns. Saving an existing id must upsert.
#[async_trait]
pub trait PatternSink: Send + Sync {
    async fn save_batch(&self, patterns: &[Pattern]) -> Result<()>;

    async fn update(&self, pattern: &Pattern) -> Result<()>;

    /// Verdicts already stored for these ids. Stores that keep none may rely on the default.
    async fn known_verdicts(&self, _ids: &[String]) -> Result<HashMap<String, AiVerdict>> {
        Ok(HashMap::new())
    }
}

/// External judge of whether a pattern is worth automating.
#[async_trait]
pub trait PatternScorer: Send + Sync {
    /// Verdicts keyed by pattern id. Patterns missing from the map stay unscored.
    async fn score_batch(&self, patterns: &[Pattern]) -> Result<HashMap<String, AiVerdict>>;
}

/// Receiver of run notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: AnalysisEvent) -> Result<()>;
}
