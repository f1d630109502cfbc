//! Analysis Orchestrator
//!
//! Owns the watermark and the scheduling loop, and wires the pure pipeline
//! stages to the external event store, pattern store, scorer, and notification bus.

pub mod memory;
pub mod orchestrator;
pub mod ports;
pub mod summary;

pub use memory::{ChannelNotifier, HeuristicScorer, InMemoryEventSource, InMemoryPatternSink};
pub use orchestrator::{AnalysisOrchestrator, OrchestratorBuilder, STOP_TIMEOUT};
pub use ports::{EventSource, NotificationSink, PatternScorer, PatternSink};
pub use summary::{AnalysisEvent, AnalysisReport, AnalysisSummary};
