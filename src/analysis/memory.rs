//! In-memory collaborators. Used by tests and by the offline binary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::{mpsc, RwLock};

use super::ports::{EventSource, NotificationSink, PatternScorer, PatternSink};
use super::summary::AnalysisEvent;
use crate::event::RawEvent;
use crate::mining::{AiVerdict, Complexity, Pattern};

/// Event store kept sorted by timestamp.
#[derive(Debug, Default)]
pub struct InMemoryEventSource {
    events: RwLock<Vec<RawEvent>>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut events: Vec<RawEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self { events: RwLock::new(events) }
    }

    /// One JSON event per line; blank lines are skipped.
    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read events from {}", path.display()))?;

        let mut events = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: RawEvent = serde_json::from_str(line)
                .with_context(|| format!("invalid event on line {}", lineno + 1))?;
            events.push(event);
        }
        Ok(Self::with_events(events))
    }

    pub async fn push(&self, event: RawEvent) {
        let mut events = self.events.write().await;
        let at = events.partition_point(|e| e.timestamp <= event.timestamp);
        events.insert(at, event);
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn find_events_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<RawEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .cloned()
            .collect())
    }
}

/// Upserting pattern store keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryPatternSink {
    patterns: RwLock<BTreeMap<String, Pattern>>,
}

impl InMemoryPatternSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn patterns(&self) -> Vec<Pattern> {
        self.patterns.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Pattern> {
        self.patterns.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.patterns.read().await.len()
    }
}

#[async_trait]
impl PatternSink for InMemoryPatternSink {
    async fn save_batch(&self, patterns: &[Pattern]) -> Result<()> {
        let mut stored = self.patterns.write().await;
        for pattern in patterns {
            stored.insert(pattern.id.clone(), pattern.clone());
        }
        Ok(())
    }

    async fn update(&self, pattern: &Pattern) -> Result<()> {
        self.patterns.write().await.insert(pattern.id.clone(), pattern.clone());
        Ok(())
    }

    async fn known_verdicts(&self, ids: &[String]) -> Result<HashMap<String, AiVerdict>> {
        let stored = self.patterns.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                let verdict = stored.get(id)?.ai_analysis.clone()?;
                Some((id.clone(), verdict))
            })
            .collect())
    }
}

/// Forwards notifications into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<AnalysisEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<AnalysisEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AnalysisEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelNotifier {
    async fn publish(&self, event: AnalysisEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("notification channel closed"))
    }
}

/// Offline stand-in for the model scorer.
/// A pattern is worth automating once it recurs in `min_support` sessions with `min_length` steps.
#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    pub min_support: usize,
    pub min_length: usize,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self { min_support: 3, min_length: 3 }
    }
}

impl HeuristicScorer {
    pub fn verdict(&self, pattern: &Pattern) -> AiVerdict {
        let worth = pattern.support_count >= self.min_support && pattern.len() >= self.min_length;
        let complexity = match pattern.len() {
            0..=3 => Complexity::Low,
            4..=6 => Complexity::Medium,
            _ => Complexity::High,
        };
        let reason = if worth {
            format!("recurs in {} sessions", pattern.support_count)
        } else {
            "too rare or too short to pay off".to_string()
        };

        AiVerdict {
            worth_automating: worth,
            reason,
            // Two seconds per step per recurrence.
            estimated_time_saving_secs: (pattern.support_count * pattern.len() * 2) as u64,
            complexity,
            suggested_name: pattern
                .sequence
                .iter()
                .map(|s| s.action.as_str())
                .collect::<Vec<_>>()
                .join(" then "),
            suggested_steps: pattern.sequence.iter().map(|s| s.signature()).collect(),
        }
    }
}

#[async_trait]
impl PatternScorer for HeuristicScorer {
    async fn score_batch(&self, patterns: &[Pattern]) -> Result<HashMap<String, AiVerdict>> {
        Ok(patterns.iter().map(|p| (p.id.clone(), self.verdict(p))).collect())
    }
}
