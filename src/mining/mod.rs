//! Sequence mining: frequent contiguous step runs across sessions.

pub mod enricher;
pub mod prefixspan;
pub mod stats;
pub mod types;

pub use enricher::{average_interval, rank, PatternMiner};
pub use prefixspan::SequenceMiner;
pub use stats::{
    filter_by_confidence, filter_by_length, filter_by_support, filter_unscored, top_patterns,
    PatternStats,
};
pub use types::{pattern_id, signature_of, AiVerdict, Complexity, Pattern};
