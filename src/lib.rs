pub mod analysis;
pub mod config;
pub mod error;
pub mod event;
pub mod mining;
pub mod normalize;
pub mod session;

// Re-export the pipeline entry points for convenient access
pub use analysis::{AnalysisOrchestrator, AnalysisReport, AnalysisSummary};
pub use config::AnalyzerConfig;
pub use event::{EventPayload, RawEvent};
pub use mining::{Pattern, PatternMiner, SequenceMiner};
pub use normalize::{Normalizer, Step};
pub use session::{Session, SessionDivider};
