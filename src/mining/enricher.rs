use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

use super::prefixspan::SequenceMiner;
use super::types::Pattern;
use crate::config::MinerConfig;
use crate::error::{ConfigError, MiningError};
use crate::normalize::{Normalizer, StepKey, StepKind};
use crate::session::Session;

const MAX_LISTED_APPS: usize = 3;

/// Sessions reduced to step keys, aligned with their events.
struct KeyedSessions<'a> {
    sessions: &'a [Session],
    keys: Vec<Vec<StepKey>>,
}

impl<'a> KeyedSessions<'a> {
    fn new(sessions: &'a [Session], normalizer: &Normalizer) -> Self {
        let keys = sessions
            .iter()
            .map(|s| s.events.iter().map(|e| normalizer.normalize(e).key()).collect())
            .collect();
        Self { sessions, keys }
    }

    /// Start times of non-overlapping contiguous matches, plus the apps of matching sessions.
    fn occurrences(&self, pattern: &[StepKey]) -> (Vec<DateTime<Utc>>, BTreeSet<String>) {
        let mut times = Vec::new();
        let mut apps = BTreeSet::new();
        let n = pattern.len();
        if n == 0 {
            return (times, apps);
        }

        for (session, keys) in self.sessions.iter().zip(&self.keys) {
            let mut matched = false;
            let mut i = 0;
            while i + n <= keys.len() {
                if keys[i..i + n] == *pattern {
                    times.push(session.events[i].timestamp);
                    matched = true;
                    i += n;
                } else {
                    i += 1;
                }
            }
            if matched {
                if let Some(app) = &session.application {
                    apps.insert(app.clone());
                }
            }
        }

        times.sort();
        (times, apps)
    }
}

/// Mean gap between consecutive occurrences, zero with fewer than two.
pub fn average_interval(times: &[DateTime<Utc>]) -> Duration {
    if times.len() < 2 {
        return Duration::zero();
    }
    let total: Duration = times.windows(2).map(|w| w[1] - w[0]).sum();
    total / (times.len() as i32 - 1)
}

pub fn format_interval(interval: Duration) -> String {
    let secs = interval.num_seconds();
    let (days, hours, mins, secs) = (secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60, secs % 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

fn describe(pattern: &Pattern, apps: &BTreeSet<String>, interval: Duration) -> String {
    let mut kinds: BTreeMap<StepKind, usize> = BTreeMap::new();
    for step in &pattern.sequence {
        *kinds.entry(step.kind.clone()).or_insert(0) += 1;
    }
    let kinds = kinds
        .iter()
        .map(|(kind, count)| format!("{count} {kind}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut text = format!("Sequence of {} steps ({kinds})", pattern.len());

    if !apps.is_empty() {
        let listed: Vec<&str> = apps.iter().take(MAX_LISTED_APPS).map(String::as_str).collect();
        text.push_str(&format!(" in {}", listed.join(", ")));
        if apps.len() > MAX_LISTED_APPS {
            text.push_str(" etc.");
        }
    }

    if interval > Duration::zero() {
        text.push_str(&format!(", recurring about every {}", format_interval(interval)));
    }

    text
}

/// Facade over the sequence miner: mines, describes, and ranks.
#[derive(Debug, Clone)]
pub struct PatternMiner {
    miner: SequenceMiner,
}

impl PatternMiner {
    pub fn new(config: MinerConfig) -> Result<Self, ConfigError> {
        Ok(Self { miner: SequenceMiner::new(config)? })
    }

    pub fn sequence_miner(&self) -> &SequenceMiner {
        &self.miner
    }

    /// Mined, described, and ranked by support, then length, then signature.
    pub fn mine(&self, sessions: &[Session]) -> Vec<Pattern> {
        let patterns = self.miner.mine(sessions);
        self.finish(patterns, sessions)
    }

    pub async fn parallel_mine(
        &self,
        sessions: &[Session],
        worker_count: usize,
    ) -> Result<Vec<Pattern>, MiningError> {
        let patterns = self.miner.parallel_mine(sessions, worker_count).await?;
        Ok(self.finish(patterns, sessions))
    }

    /// Fills in `description`. Nothing else on the pattern changes.
    pub fn enrich(&self, pattern: &mut Pattern, sessions: &[Session]) {
        let keyed = KeyedSessions::new(sessions, self.miner.normalizer());
        Self::enrich_keyed(pattern, &keyed);
    }

    /// Mean gap between occurrences of the pattern across `sessions`.
    pub fn average_interval(&self, pattern: &Pattern, sessions: &[Session]) -> Duration {
        let keyed = KeyedSessions::new(sessions, self.miner.normalizer());
        let keys: Vec<StepKey> = pattern.sequence.iter().map(|s| s.key()).collect();
        average_interval(&keyed.occurrences(&keys).0)
    }

    fn enrich_keyed(pattern: &mut Pattern, keyed: &KeyedSessions<'_>) {
        let keys: Vec<StepKey> = pattern.sequence.iter().map(|s| s.key()).collect();
        let (times, apps) = keyed.occurrences(&keys);
        let interval = average_interval(&times);
        pattern.description = Some(describe(pattern, &apps, interval));
    }

    fn finish(&self, mut patterns: Vec<Pattern>, sessions: &[Session]) -> Vec<Pattern> {
        let keyed = KeyedSessions::new(sessions, self.miner.normalizer());
        for pattern in &mut patterns {
            Self::enrich_keyed(pattern, &keyed);
        }
        rank(&mut patterns);
        patterns
    }
}

pub fn rank(patterns: &mut [Pattern]) {
    patterns.sort_by_cached_key(|p| {
        (std::cmp::Reverse(p.support_count), std::cmp::Reverse(p.len()), p.signature())
    });
}
