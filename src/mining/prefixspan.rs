use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::types::Pattern;
use crate::config::MinerConfig;
use crate::error::{ConfigError, MiningError};
use crate::normalize::{Normalizer, Step, StepKey};
use crate::session::Session;

type Symbol = u32;

/// Remainder of one sequence after the first occurrence of the current prefix.
#[derive(Debug, Clone, Copy)]
struct Projection {
    seq: usize,
    offset: usize,
}

/// Sessions normalized and interned into a dense alphabet.
struct SequenceDb {
    /// Index-aligned with the input sessions.
    steps: Vec<Vec<Step>>,
    symbols: Vec<Vec<Symbol>>,
    /// Sequences long enough to hold a pattern.
    minable: Vec<usize>,
}

impl SequenceDb {
    fn build(sessions: &[Session], normalizer: &Normalizer, min_len: usize) -> Self {
        let mut alphabet: HashMap<StepKey, Symbol> = HashMap::new();
        let mut steps = Vec::with_capacity(sessions.len());
        let mut symbols = Vec::with_capacity(sessions.len());
        let mut minable = Vec::new();

        for (idx, session) in sessions.iter().enumerate() {
            let normalized = normalizer.normalize_all(&session.events);
            let interned: Vec<Symbol> = normalized
                .iter()
                .map(|step| {
                    let next = alphabet.len() as Symbol;
                    *alphabet.entry(step.key()).or_insert(next)
                })
                .collect();

            if interned.len() >= min_len {
                minable.push(idx);
            }
            steps.push(normalized);
            symbols.push(interned);
        }

        Self { steps, symbols, minable }
    }
}

/// Position of the first contiguous occurrence of `needle` in `haystack`.
fn find_run(haystack: &[Symbol], needle: &[Symbol]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Contiguous sequence miner in the PrefixSpan style.
///
/// Patterns are exact runs of steps, not gapped subsequences. Step identity is
/// `(type, action)`; application context is ignored, so the same run recurring in
/// different applications is one pattern.
#[derive(Debug, Clone)]
pub struct SequenceMiner {
    config: MinerConfig,
    normalizer: Normalizer,
}

impl SequenceMiner {
    pub fn new(config: MinerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let normalizer = Normalizer::new(config.normalizer.clone());
        Ok(Self { config, normalizer })
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn mine(&self, sessions: &[Session]) -> Vec<Pattern> {
        let db = SequenceDb::build(sessions, &self.normalizer, self.config.min_pattern_length);
        if db.minable.is_empty() {
            return Vec::new();
        }

        // 1. Grow candidates over projected databases
        let root: Vec<Projection> = db
            .minable
            .iter()
            .map(|&seq| Projection { seq, offset: 0 })
            .collect();
        let mut prefix = Vec::with_capacity(self.config.max_pattern_length);
        let mut levels: Vec<Vec<Projection>> = vec![Vec::new(); self.config.max_pattern_length];
        let mut candidates = Vec::new();
        self.grow(&db, &mut prefix, &root, &mut levels, &mut candidates);

        // 2. Materialize against the full session set
        let mut seen = HashSet::new();
        let mut patterns = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            if let Some(pattern) = self.materialize(&db, sessions, candidate) {
                if seen.insert(pattern.signature()) {
                    patterns.push(pattern);
                }
            }
        }

        debug!(
            sessions = sessions.len(),
            candidates = candidates.len(),
            patterns = patterns.len(),
            "mined sequences"
        );
        patterns
    }

    fn grow(
        &self,
        db: &SequenceDb,
        prefix: &mut Vec<Symbol>,
        projected: &[Projection],
        levels: &mut Vec<Vec<Projection>>,
        candidates: &mut Vec<Vec<Symbol>>,
    ) {
        let depth = prefix.len();
        if depth >= self.config.max_pattern_length {
            return;
        }

        for item in self.frequent_items(db, projected, depth == 0) {
            prefix.push(item);
            let len = prefix.len();

            if len >= self.config.min_pattern_length && len <= self.config.max_pattern_length {
                candidates.push(prefix.clone());
            }

            if len < self.config.max_pattern_length {
                // Every sequence holding the longer prefix also holds the shorter one,
                // so the parent projection bounds the scan.
                let mut child = std::mem::take(&mut levels[depth]);
                child.clear();
                for p in projected {
                    let seq = &db.symbols[p.seq];
                    if let Some(pos) = find_run(seq, prefix) {
                        child.push(Projection { seq: p.seq, offset: pos + len });
                    }
                }
                self.grow(db, prefix, &child, levels, candidates);
                levels[depth] = child;
            }

            prefix.pop();
        }
    }

    /// Items meeting `min_support`, in alphabet order.
    ///
    /// Below the root an item is the step right after the prefix's first occurrence.
    /// At the root the empty prefix sits at every offset, so each distinct step of
    /// a sequence counts once.
    fn frequent_items(&self, db: &SequenceDb, projected: &[Projection], root: bool) -> Vec<Symbol> {
        let mut counts: BTreeMap<Symbol, usize> = BTreeMap::new();

        for p in projected {
            let remainder = &db.symbols[p.seq][p.offset..];
            if root {
                let distinct: HashSet<Symbol> = remainder.iter().copied().collect();
                for symbol in distinct {
                    *counts.entry(symbol).or_insert(0) += 1;
                }
            } else if let Some(&first) = remainder.first() {
                *counts.entry(first).or_insert(0) += 1;
            }
        }

        counts
            .into_iter()
            .filter(|&(_, count)| count >= self.config.min_support)
            .map(|(symbol, _)| symbol)
            .collect()
    }

    fn materialize(&self, db: &SequenceDb, sessions: &[Session], candidate: &[Symbol]) -> Option<Pattern> {
        let mut support = 0usize;
        let mut sequence: Option<Vec<Step>> = None;
        let mut first_seen: Option<DateTime<Utc>> = None;
        let mut last_seen: Option<DateTime<Utc>> = None;

        for (idx, session) in sessions.iter().enumerate() {
            let Some(pos) = find_run(&db.symbols[idx], candidate) else {
                continue;
            };
            support += 1;

            if sequence.is_none() {
                sequence = Some(db.steps[idx][pos..pos + candidate.len()].to_vec());
            }

            let start = session.start_time;
            let end = session.last_seen();
            first_seen = Some(first_seen.map_or(start, |t| t.min(start)));
            last_seen = Some(last_seen.map_or(end, |t| t.max(end)));
        }

        if support < self.config.min_support {
            return None;
        }

        Some(Pattern::new(sequence?, support, sessions.len(), first_seen?, last_seen?))
    }

    /// Mines `worker_count` contiguous chunks independently and unions the results.
    ///
    /// Support and confidence are computed per chunk against the chunk's own
    /// sessions. Workers are joined as they finish; the first failure aborts the
    /// tasks that have not started and fails the whole call. A worker already
    /// running is detached and its result dropped. Merging follows chunk order,
    /// so when chunks share a pattern the earliest chunk's numbers are kept.
    pub async fn parallel_mine(
        &self,
        sessions: &[Session],
        worker_count: usize,
    ) -> Result<Vec<Pattern>, MiningError> {
        if sessions.is_empty() {
            return Ok(Vec::new());
        }

        let workers = worker_count.clamp(1, sessions.len());
        let chunk_size = sessions.len().div_ceil(workers);
        let miner = Arc::new(self.clone());

        let mut tasks = JoinSet::new();
        let mut chunks = 0;
        for (worker, chunk) in sessions.chunks(chunk_size).enumerate() {
            let miner = Arc::clone(&miner);
            let chunk = chunk.to_vec();
            tasks.spawn_blocking(move || {
                let mined = panic::catch_unwind(AssertUnwindSafe(|| miner.mine(&chunk)));
                (worker, mined.map_err(|cause| panic_reason(cause.as_ref())))
            });
            chunks += 1;
        }

        let mut results: Vec<Option<Vec<Pattern>>> = vec![None; chunks];
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((worker, Ok(patterns))) => {
                    results[worker] = Some(patterns);
                    continue;
                }
                Ok((worker, Err(reason))) => MiningError::WorkerFailed { worker, reason },
                Err(e) => MiningError::Join(e.to_string()),
            };
            warn!(error = %failure, "mining worker failed");
            tasks.abort_all();
            return Err(failure);
        }

        let mut seen = HashSet::new();
        let merged: Vec<Pattern> = results
            .into_iter()
            .flatten()
            .flatten()
            .filter(|p| seen.insert(p.signature()))
            .collect();

        debug!(workers = chunks, patterns = merged.len(), "parallel mining finished");
        Ok(merged)
    }
}

fn panic_reason(cause: &(dyn Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
