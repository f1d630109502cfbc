use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize::Step;

const SIGNATURE_SEPARATOR: &str = "->";
const SECS_PER_DAY: f64 = 86_400.0;

/// Effort tier suggested by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Advisory verdict attached by the external scorer.
/// Immutable once attached; a pattern carrying one is never re-scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiVerdict {
    pub worth_automating: bool,
    pub reason: String,
    pub estimated_time_saving_secs: u64,
    pub complexity: Complexity,
    pub suggested_name: String,
    #[serde(default)]
    pub suggested_steps: Vec<String>,
}

/// A frequent contiguous step sequence.
///
/// Invariants: sequence length within the miner's bounds, `support_count >= min_support`,
/// `id` derived only from the `(type, action)` signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub sequence: Vec<Step>,
    pub support_count: usize,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_automated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<AiVerdict>,
}

/// `type:action` pairs joined in order.
pub fn signature_of(steps: &[Step]) -> String {
    steps
        .iter()
        .map(Step::signature)
        .collect::<Vec<_>>()
        .join(SIGNATURE_SEPARATOR)
}

/// Stable id for a signature. Rediscovering a sequence yields the same id.
pub fn pattern_id(signature: &str) -> String {
    hex::encode(Sha256::digest(signature.as_bytes()))
}

impl Pattern {
    pub fn new(
        sequence: Vec<Step>,
        support_count: usize,
        total_sessions: usize,
        first_seen: DateTime<Utc>,
        last_seen: DateTime<Utc>,
    ) -> Self {
        let confidence = if total_sessions == 0 {
            0.0
        } else {
            support_count as f64 / total_sessions as f64
        };

        Self {
            id: pattern_id(&signature_of(&sequence)),
            sequence,
            support_count,
            confidence,
            first_seen,
            last_seen,
            is_automated: false,
            description: None,
            ai_analysis: None,
        }
    }

    pub fn signature(&self) -> String {
        signature_of(&self.sequence)
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn is_scored(&self) -> bool {
        self.ai_analysis.is_some()
    }

    pub fn is_valuable(&self) -> bool {
        self.ai_analysis.as_ref().is_some_and(|v| v.worth_automating)
    }

    /// Sessions per day over the observed span. Zero when the span is empty.
    pub fn frequency_per_day(&self) -> f64 {
        let span_secs = (self.last_seen - self.first_seen).num_milliseconds() as f64 / 1000.0;
        if span_secs <= 0.0 {
            return 0.0;
        }
        self.support_count as f64 / (span_secs / SECS_PER_DAY)
    }
}
