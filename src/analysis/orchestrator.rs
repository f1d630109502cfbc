use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ports::{EventSource, NotificationSink, PatternScorer, PatternSink};
use super::summary::{AnalysisEvent, AnalysisReport, AnalysisSummary};
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, ConfigError, LifecycleError, MiningError};
use crate::mining::{filter_unscored, AiVerdict, Pattern, PatternMiner};
use crate::session::{Session, SessionDivider};

/// Budget for the loop to exit after cancellation.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything one run needs. Shared between the handle and the loop task.
struct Pipeline {
    config: AnalyzerConfig,
    divider: SessionDivider,
    miner: PatternMiner,
    source: Arc<dyn EventSource>,
    sink: Arc<dyn PatternSink>,
    scorer: Option<Arc<dyn PatternScorer>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    /// Upper bound of the last successfully analyzed window.
    watermark: RwLock<DateTime<Utc>>,
    /// Verdicts seen by this process, so a pattern is scored at most once.
    verdicts: Mutex<HashMap<String, AiVerdict>>,
}

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives the incremental mining pipeline on a fixed schedule.
///
/// Lifecycle: `Stopped -> Running -> Stopped`. The watermark starts at the Unix
/// epoch, so the first run covers the whole event history.
pub struct AnalysisOrchestrator {
    pipeline: Arc<Pipeline>,
    running: RwLock<Option<LoopHandle>>,
}

pub struct OrchestratorBuilder {
    config: AnalyzerConfig,
    source: Option<Arc<dyn EventSource>>,
    sink: Option<Arc<dyn PatternSink>>,
    scorer: Option<Arc<dyn PatternScorer>>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl OrchestratorBuilder {
    pub fn event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn pattern_sink(mut self, sink: Arc<dyn PatternSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn PatternScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<AnalysisOrchestrator, ConfigError> {
        self.config.validate()?;
        let divider = SessionDivider::new(self.config.divider.clone())?;
        let miner = PatternMiner::new(self.config.miner.clone())?;
        let source = self.source.ok_or(ConfigError::MissingCollaborator("event source"))?;
        let sink = self.sink.ok_or(ConfigError::MissingCollaborator("pattern sink"))?;
        if self.config.orchestrator.enable_ai_scoring && self.scorer.is_none() {
            return Err(ConfigError::MissingCollaborator("scorer"));
        }

        Ok(AnalysisOrchestrator {
            pipeline: Arc::new(Pipeline {
                config: self.config,
                divider,
                miner,
                source,
                sink,
                scorer: self.scorer,
                notifier: self.notifier,
                watermark: RwLock::new(DateTime::<Utc>::UNIX_EPOCH),
                verdicts: Mutex::new(HashMap::new()),
            }),
            running: RwLock::new(None),
        })
    }
}

impl AnalysisOrchestrator {
    pub fn builder(config: AnalyzerConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            source: None,
            sink: None,
            scorer: None,
            notifier: None,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.pipeline.config
    }

    pub async fn is_running(&self) -> bool {
        self.running.read().await.is_some()
    }

    pub async fn last_analyzed_at(&self) -> DateTime<Utc> {
        *self.pipeline.watermark.read().await
    }

    /// Launches the scheduling loop. The first run happens immediately.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let mut running = self.running.write().await;
        if running.is_some() {
            return Err(LifecycleError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(Arc::clone(&self.pipeline), cancel.clone()));
        *running = Some(LoopHandle { cancel, task });
        info!(
            interval_secs = self.pipeline.config.orchestrator.interval_secs,
            "analysis loop started"
        );
        Ok(())
    }

    /// Cancels the loop and waits up to `STOP_TIMEOUT` for it to exit.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let LoopHandle { cancel, mut task } = self
            .running
            .write()
            .await
            .take()
            .ok_or(LifecycleError::NotRunning)?;

        cancel.cancel();
        match timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {
                info!("analysis loop stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(LifecycleError::Join(e.to_string())),
            Err(_) => {
                task.abort();
                error!("analysis loop ignored cancellation for {:?}", STOP_TIMEOUT);
                Err(LifecycleError::StopTimeout(STOP_TIMEOUT))
            }
        }
    }

    /// One run over `[start, end)`. On success the watermark moves up to `end`.
    pub async fn analyze_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AnalysisReport, AnalysisError> {
        self.pipeline.run(start, end, &CancellationToken::new()).await
    }

    /// One run over everything newer than the watermark.
    pub async fn analyze_now(&self) -> Result<AnalysisReport, AnalysisError> {
        self.pipeline.run_incremental(&CancellationToken::new()).await
    }
}

async fn run_loop(pipeline: Arc<Pipeline>, cancel: CancellationToken) {
    let mut ticker = interval(pipeline.config.orchestrator.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // The first tick resolves immediately.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = pipeline.run_incremental(&cancel) => match result {
                Ok(report) if report.summary.skipped => debug!("analysis run skipped"),
                Ok(_) => {}
                Err(AnalysisError::Cancelled) => break,
                Err(e) => error!(error = %e, "analysis run failed"),
            },
        }
    }

    debug!("analysis loop exited");
}

impl Pipeline {
    async fn run_incremental(&self, cancel: &CancellationToken) -> Result<AnalysisReport, AnalysisError> {
        let start = *self.watermark.read().await;
        self.run(start, Utc::now(), cancel).await
    }

    async fn run(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();
        let skipped = |started: Instant| AnalysisReport {
            summary: AnalysisSummary::skipped(start, end, elapsed_ms(started)),
            patterns: Vec::new(),
        };

        // 1. Pull
        checkpoint(cancel)?;
        let events = self
            .source
            .find_events_in_range(start, end)
            .await
            .map_err(AnalysisError::EventSource)?;
        let event_count = events.len();
        if event_count < self.config.orchestrator.min_events_for_analysis {
            debug!(
                events = event_count,
                required = self.config.orchestrator.min_events_for_analysis,
                "not enough events to analyze"
            );
            return Ok(skipped(started));
        }

        // 2. Segment
        checkpoint(cancel)?;
        let sessions = self.divider.divide(events);
        if sessions.is_empty() {
            debug!(events = event_count, "no sessions formed");
            return Ok(skipped(started));
        }

        // 3. Mine + enrich
        checkpoint(cancel)?;
        let (sessions, mut patterns) = self.mine(sessions).await?;
        if patterns.is_empty() {
            debug!(sessions = sessions.len(), "no patterns found");
            return Ok(skipped(started));
        }
        self.attach_known_verdicts(&mut patterns).await;

        // 4. Persist
        checkpoint(cancel)?;
        self.sink
            .save_batch(&patterns)
            .await
            .map_err(AnalysisError::Persistence)?;

        // 5. Score
        checkpoint(cancel)?;
        let scored = if self.config.orchestrator.enable_ai_scoring {
            self.score(&mut patterns).await
        } else {
            0
        };
        let valuable = patterns.iter().filter(|p| p.is_valuable()).count();

        // 6. Advance + publish
        {
            let mut watermark = self.watermark.write().await;
            if end > *watermark {
                *watermark = end;
            }
        }

        let summary = AnalysisSummary {
            window_start: start,
            window_end: end,
            events: event_count,
            sessions: sessions.len(),
            patterns: patterns.len(),
            valuable,
            scored,
            duration_ms: elapsed_ms(started),
            skipped: false,
        };
        info!(
            events = summary.events,
            sessions = summary.sessions,
            patterns = summary.patterns,
            valuable = summary.valuable,
            scored = summary.scored,
            duration_ms = summary.duration_ms,
            "analysis completed"
        );

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.publish(AnalysisEvent::Completed(summary.clone())).await {
                warn!(error = %e, "failed to publish analysis summary");
            }
        }

        Ok(AnalysisReport { summary, patterns })
    }

    /// Mining is CPU work, so it runs off the async workers.
    async fn mine(&self, sessions: Vec<Session>) -> Result<(Vec<Session>, Vec<Pattern>), AnalysisError> {
        if self.config.orchestrator.parallel_mining {
            let patterns = self
                .miner
                .parallel_mine(&sessions, self.config.miner.worker_count)
                .await?;
            return Ok((sessions, patterns));
        }

        let miner = self.miner.clone();
        let mined = tokio::task::spawn_blocking(move || {
            let patterns = miner.mine(&sessions);
            (sessions, patterns)
        })
        .await
        .map_err(|e| MiningError::WorkerFailed { worker: 0, reason: e.to_string() })?;
        Ok(mined)
    }

    /// Carries earlier verdicts over to rediscovered patterns so saving does not erase them.
    async fn attach_known_verdicts(&self, patterns: &mut [Pattern]) {
        let mut memo = self.verdicts.lock().await;

        let missing: Vec<String> = patterns
            .iter()
            .filter(|p| !memo.contains_key(&p.id))
            .map(|p| p.id.clone())
            .collect();
        if !missing.is_empty() {
            match self.sink.known_verdicts(&missing).await {
                Ok(stored) => memo.extend(stored),
                Err(e) => warn!(error = %e, "failed to load stored verdicts"),
            }
        }

        for pattern in patterns.iter_mut() {
            if let Some(verdict) = memo.get(&pattern.id) {
                pattern.ai_analysis = Some(verdict.clone());
            }
        }
    }

    /// Scores patterns lacking a verdict. Failures only cost the scored count.
    async fn score(&self, patterns: &mut [Pattern]) -> usize {
        let Some(scorer) = &self.scorer else {
            return 0;
        };

        let unscored = filter_unscored(patterns);
        if unscored.is_empty() {
            return 0;
        }

        let limit = self.config.orchestrator.scoring_timeout();
        let verdicts = match timeout(limit, scorer.score_batch(&unscored)).await {
            Ok(Ok(verdicts)) => verdicts,
            Ok(Err(e)) => {
                warn!(error = %e, patterns = unscored.len(), "scoring failed");
                return 0;
            }
            Err(_) => {
                warn!(timeout = ?limit, patterns = unscored.len(), "scoring timed out");
                return 0;
            }
        };

        let mut memo = self.verdicts.lock().await;
        let mut scored = 0;
        for pattern in patterns.iter_mut().filter(|p| !p.is_scored()) {
            let Some(verdict) = verdicts.get(&pattern.id) else {
                continue;
            };
            pattern.ai_analysis = Some(verdict.clone());
            memo.insert(pattern.id.clone(), verdict.clone());
            scored += 1;

            if let Err(e) = self.sink.update(pattern).await {
                warn!(pattern = %pattern.id, error = %e, "failed to persist verdict");
            }
        }
        scored
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), AnalysisError> {
    if cancel.is_cancelled() {
        Err(AnalysisError::Cancelled)
    } else {
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
