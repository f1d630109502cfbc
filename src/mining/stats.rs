use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::Pattern;

// Filters are order-preserving and never touch their input.

pub fn filter_by_support(patterns: &[Pattern], min_support: usize) -> Vec<Pattern> {
    patterns.iter().filter(|p| p.support_count >= min_support).cloned().collect()
}

pub fn filter_by_confidence(patterns: &[Pattern], min_confidence: f64) -> Vec<Pattern> {
    patterns.iter().filter(|p| p.confidence >= min_confidence).cloned().collect()
}

pub fn filter_by_length(patterns: &[Pattern], min_len: usize, max_len: usize) -> Vec<Pattern> {
    patterns
        .iter()
        .filter(|p| (min_len..=max_len).contains(&p.len()))
        .cloned()
        .collect()
}

/// Patterns that have no verdict yet.
pub fn filter_unscored(patterns: &[Pattern]) -> Vec<Pattern> {
    patterns.iter().filter(|p| !p.is_scored()).cloned().collect()
}

/// The `k` highest-support patterns. Ties keep input order.
pub fn top_patterns(patterns: &[Pattern], k: usize) -> Vec<Pattern> {
    let mut sorted = patterns.to_vec();
    sorted.sort_by(|a, b| b.support_count.cmp(&a.support_count));
    sorted.truncate(k);
    sorted
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub total_patterns: usize,
    pub by_length: BTreeMap<usize, usize>,
    pub by_support: BTreeMap<usize, usize>,
    pub unscored: usize,
    pub automated: usize,
    pub avg_confidence: f64,
    pub longest: Option<Pattern>,
    pub shortest: Option<Pattern>,
}

impl PatternStats {
    pub fn compute(patterns: &[Pattern]) -> Self {
        let mut stats = PatternStats {
            total_patterns: patterns.len(),
            ..Default::default()
        };
        if patterns.is_empty() {
            return stats;
        }

        let mut confidence_sum = 0.0;
        let mut longest: Option<&Pattern> = None;
        let mut shortest: Option<&Pattern> = None;

        for pattern in patterns {
            *stats.by_length.entry(pattern.len()).or_insert(0) += 1;
            *stats.by_support.entry(pattern.support_count).or_insert(0) += 1;
            if !pattern.is_scored() {
                stats.unscored += 1;
            }
            if pattern.is_automated {
                stats.automated += 1;
            }
            confidence_sum += pattern.confidence;

            if longest.map_or(true, |l| pattern.len() > l.len()) {
                longest = Some(pattern);
            }
            if shortest.map_or(true, |s| pattern.len() < s.len()) {
                shortest = Some(pattern);
            }
        }

        stats.avg_confidence = confidence_sum / patterns.len() as f64;
        stats.longest = longest.cloned();
        stats.shortest = shortest.cloned();
        stats
    }
}
