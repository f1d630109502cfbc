use chrono::{DateTime, Duration, TimeZone, Utc};
use routine::config::MinerConfig;
use routine::event::{EventPayload, RawEvent};
use routine::mining::{
    average_interval, filter_by_confidence, filter_by_length, filter_by_support, filter_unscored,
    pattern_id, rank, top_patterns, AiVerdict, Complexity, Pattern, PatternMiner, PatternStats,
    SequenceMiner,
};
use routine::normalize::{Step, StepKind};
use routine::session::Session;
use uuid::Uuid;

const FN: u16 = 96;
const RETURN: u16 = 36;
const ESCAPE: u16 = 53;
const LETTER: u16 = 0;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
}

fn key(code: u16) -> EventPayload {
    EventPayload::keyboard(code)
}

fn copy() -> EventPayload {
    EventPayload::clipboard("copy")
}

/// One session starting `start_secs` after base, one event per second.
fn session(start_secs: i64, app: &str, payloads: Vec<EventPayload>) -> Session {
    let start = base() + Duration::seconds(start_secs);
    let events: Vec<RawEvent> = payloads
        .into_iter()
        .enumerate()
        .map(|(i, p)| RawEvent::new(start + Duration::seconds(i as i64), p).in_app(app))
        .collect();
    Session {
        id: Uuid::new_v4(),
        start_time: start,
        end_time: events.last().map(|e| e.timestamp),
        application: Some(app.to_string()),
        bundle_id: None,
        event_count: events.len(),
        events,
    }
}

fn miner(min_support: usize, min_len: usize, max_len: usize) -> SequenceMiner {
    SequenceMiner::new(MinerConfig {
        min_support,
        min_pattern_length: min_len,
        max_pattern_length: max_len,
        ..MinerConfig::default()
    })
    .unwrap()
}

fn find<'a>(patterns: &'a [Pattern], signature: &str) -> Option<&'a Pattern> {
    patterns.iter().find(|p| p.signature() == signature)
}

const FN_COPY: &str = "keyboard:function_key->clipboard:clipboard_copy";

fn scenario_sessions() -> Vec<Session> {
    vec![
        session(0, "Xcode", vec![key(LETTER), key(FN), copy(), key(LETTER)]),
        session(3600, "Xcode", vec![key(FN), copy(), key(RETURN)]),
        session(7200, "Xcode", vec![key(ESCAPE), key(FN), copy()]),
        session(10800, "Xcode", vec![key(LETTER), key(RETURN), key(ESCAPE)]),
    ]
}

#[test]
fn test_frequent_run_found_with_support_and_confidence() {
    let sessions = scenario_sessions();
    let patterns = miner(2, 2, 10).mine(&sessions);

    let pattern = find(&patterns, FN_COPY).expect("function key then copy is frequent");
    assert_eq!(pattern.support_count, 3);
    assert!((pattern.confidence - 0.75).abs() < 1e-9);
    assert_eq!(pattern.first_seen, sessions[0].start_time);
    assert_eq!(pattern.last_seen, sessions[2].last_seen());
    assert_eq!(pattern.id, pattern_id(FN_COPY));
    assert!(!pattern.is_automated);
    assert!(pattern.ai_analysis.is_none());

    // Runs seen in only one session never qualify.
    assert!(find(&patterns, "keyboard:special_key->keyboard:special_key").is_none());
    assert_eq!(patterns.len(), 1);
}

#[test]
fn test_patterns_respect_configured_bounds() {
    let sessions = vec![
        session(0, "Xcode", vec![key(FN), copy(), key(RETURN), key(ESCAPE), key(LETTER)]),
        session(100, "Xcode", vec![key(FN), copy(), key(RETURN), key(ESCAPE), key(LETTER)]),
        session(200, "Xcode", vec![key(LETTER), key(FN), copy(), key(RETURN)]),
    ];

    let patterns = miner(2, 2, 3).mine(&sessions);

    assert!(!patterns.is_empty());
    for pattern in &patterns {
        assert!((2..=3).contains(&pattern.len()), "{} out of bounds", pattern.signature());
        assert!(pattern.support_count >= 2);
        assert!(pattern.confidence > 0.0 && pattern.confidence <= 1.0);
    }
    let three = "keyboard:function_key->clipboard:clipboard_copy->keyboard:special_key";
    assert_eq!(find(&patterns, three).map(|p| p.support_count), Some(3));
}

#[test]
fn test_only_contiguous_runs_are_patterns() {
    let sessions = vec![
        session(0, "Xcode", vec![key(FN), key(LETTER), copy()]),
        session(100, "Xcode", vec![key(FN), key(LETTER), copy()]),
    ];

    let patterns = miner(2, 2, 10).mine(&sessions);

    assert!(find(&patterns, FN_COPY).is_none());
    assert!(find(&patterns, "keyboard:function_key->keyboard:alphanumeric_key").is_some());
    assert!(find(
        &patterns,
        "keyboard:function_key->keyboard:alphanumeric_key->clipboard:clipboard_copy"
    )
    .is_some());
}

#[test]
fn test_application_context_does_not_split_patterns() {
    let sessions = vec![
        session(0, "Xcode", vec![key(FN), copy()]),
        session(100, "Safari", vec![key(FN), copy()]),
    ];

    let patterns = miner(2, 2, 10).mine(&sessions);

    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].support_count, 2);
    // Steps keep the context of the first supporting session.
    assert_eq!(patterns[0].sequence[0].application(), Some("Xcode"));
}

#[test]
fn test_unknown_types_do_not_merge() {
    let no_key_code = EventPayload::Unknown {
        kind: "keyboard".to_string(),
        data: serde_json::json!({ "characters": "a" }),
    };
    let sessions = vec![
        session(0, "Xcode", vec![EventPayload::unknown("gesture"), key(FN)]),
        session(100, "Xcode", vec![EventPayload::unknown("mouse"), key(FN)]),
        session(200, "Xcode", vec![no_key_code, key(FN)]),
    ];

    let patterns = miner(2, 2, 10).mine(&sessions);

    assert!(patterns.is_empty(), "unexpected {:?}", patterns.iter().map(Pattern::signature).collect::<Vec<_>>());
}

#[test]
fn test_same_unknown_type_still_forms_patterns() {
    let sessions = vec![
        session(0, "Xcode", vec![EventPayload::unknown("gesture"), key(FN)]),
        session(100, "Xcode", vec![EventPayload::unknown("gesture"), key(FN)]),
    ];

    let patterns = miner(2, 2, 10).mine(&sessions);

    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].signature(), "gesture:unknown->keyboard:function_key");
    assert_eq!(patterns[0].id, pattern_id("gesture:unknown->keyboard:function_key"));
}

#[test]
fn test_short_sessions_still_count_toward_confidence() {
    let sessions = vec![
        session(0, "Xcode", vec![key(FN), copy()]),
        session(100, "Xcode", vec![key(FN), copy()]),
        session(200, "Xcode", vec![key(FN)]),
    ];

    let patterns = miner(2, 2, 10).mine(&sessions);

    let pattern = find(&patterns, FN_COPY).unwrap();
    assert_eq!(pattern.support_count, 2);
    assert!((pattern.confidence - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_mining_is_idempotent() {
    let sessions = scenario_sessions();
    let miner = miner(2, 2, 10);

    let mut first: Vec<String> = miner.mine(&sessions).into_iter().map(|p| p.id).collect();
    let mut second: Vec<String> = miner.mine(&sessions).into_iter().map(|p| p.id).collect();
    first.sort();
    second.sort();

    assert_eq!(first, second);
}

#[test]
fn test_empty_input_yields_nothing() {
    let miner = miner(2, 2, 10);
    assert!(miner.mine(&[]).is_empty());
    assert!(miner.mine(&[session(0, "Xcode", vec![key(FN)])]).is_empty());
}

#[test]
fn test_invalid_miner_config_rejected() {
    assert!(SequenceMiner::new(MinerConfig {
        min_pattern_length: 5,
        max_pattern_length: 2,
        ..MinerConfig::default()
    })
    .is_err());
    assert!(SequenceMiner::new(MinerConfig {
        min_support: 0,
        ..MinerConfig::default()
    })
    .is_err());
}

#[tokio::test]
async fn test_parallel_mine_merges_chunks() {
    let sessions: Vec<Session> = (0..4)
        .map(|i| session(i * 100, "Xcode", vec![key(FN), copy()]))
        .collect();
    let miner = miner(2, 2, 10);

    let patterns = miner.parallel_mine(&sessions, 2).await.unwrap();

    // Each chunk of two sessions finds the run; the merge keeps one copy.
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].signature(), FN_COPY);
    assert_eq!(patterns[0].support_count, 2);
    assert!((patterns[0].confidence - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_parallel_mine_merges_in_chunk_order() {
    // First chunk holds the run three times, the second only twice.
    let mut sessions: Vec<Session> = (0..3)
        .map(|i| session(i * 100, "Xcode", vec![key(FN), copy()]))
        .collect();
    sessions.push(session(300, "Safari", vec![key(FN), copy()]));
    sessions.push(session(400, "Safari", vec![key(FN), copy()]));
    sessions.push(session(500, "Safari", vec![key(ESCAPE)]));
    let miner = miner(2, 2, 10);

    for _ in 0..5 {
        let patterns = miner.parallel_mine(&sessions, 2).await.unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].support_count, 3);
        assert_eq!(patterns[0].sequence[0].application(), Some("Xcode"));
    }
}

#[tokio::test]
async fn test_parallel_mine_single_worker_matches_sequential() {
    let sessions = scenario_sessions();
    let miner = miner(2, 2, 10);

    let sequential = miner.mine(&sessions);
    let parallel = miner.parallel_mine(&sessions, 1).await.unwrap();
    let oversized = miner.parallel_mine(&sessions, 64).await.unwrap();

    assert_eq!(sequential, parallel);
    // One session per chunk cannot reach support 2.
    assert!(oversized.is_empty());
    assert!(miner.parallel_mine(&[], 4).await.unwrap().is_empty());
}

#[test]
fn test_pattern_miner_describes_and_ranks() {
    let sessions = vec![
        session(0, "Xcode", vec![key(FN), copy(), key(RETURN)]),
        session(240, "Safari", vec![key(FN), copy(), key(RETURN)]),
        session(480, "Mail", vec![key(FN), copy(), key(LETTER)]),
    ];
    let miner = PatternMiner::new(MinerConfig::default()).unwrap();

    let patterns = miner.mine(&sessions);

    // Support first, then length.
    assert_eq!(patterns[0].signature(), FN_COPY);
    assert_eq!(patterns[0].support_count, 3);
    assert!(patterns.windows(2).all(|w| w[0].support_count >= w[1].support_count));

    let description = patterns[0].description.as_deref().unwrap();
    assert!(description.starts_with("Sequence of 2 steps (1 keyboard, 1 clipboard)"));
    assert!(description.contains("in Mail, Safari, Xcode"));
    assert!(description.contains("recurring about every 4m 0s"));
}

#[test]
fn test_enrich_only_sets_description() {
    let sessions = vec![
        session(0, "A", vec![key(FN), copy()]),
        session(60, "B", vec![key(FN), copy()]),
        session(120, "C", vec![key(FN), copy()]),
        session(180, "D", vec![key(FN), copy()]),
    ];
    let miner = PatternMiner::new(MinerConfig::default()).unwrap();
    let mut pattern = miner.sequence_miner().mine(&sessions).remove(0);
    let before = pattern.clone();

    miner.enrich(&mut pattern, &sessions);

    let description = pattern.description.clone().unwrap();
    assert!(description.contains("in A, B, C etc."));
    pattern.description = None;
    assert_eq!(pattern, before);

    assert_eq!(miner.average_interval(&pattern, &sessions), Duration::seconds(60));
}

#[test]
fn test_average_interval_edges() {
    assert_eq!(average_interval(&[]), Duration::zero());
    assert_eq!(average_interval(&[base()]), Duration::zero());
    let times = [base(), base() + Duration::seconds(10), base() + Duration::seconds(30)];
    assert_eq!(average_interval(&times), Duration::seconds(15));
}

fn synthetic(actions: &[&str], support: usize) -> Pattern {
    let steps = actions.iter().map(|a| Step::new(StepKind::Keyboard, *a)).collect();
    Pattern::new(steps, support, 10, base(), base() + Duration::days(2))
}

#[test]
fn test_single_day_pattern_has_zero_frequency() {
    let steps = vec![Step::new(StepKind::Keyboard, "function_key"), Step::new(StepKind::Clipboard, "clipboard_copy")];
    let pattern = Pattern::new(steps, 4, 4, base(), base());

    assert_eq!(pattern.frequency_per_day(), 0.0);
    assert!((synthetic(&["a", "b"], 4).frequency_per_day() - 2.0).abs() < 1e-9);
}

#[test]
fn test_filter_by_support_keeps_order() {
    let patterns = vec![
        synthetic(&["a", "b"], 5),
        synthetic(&["b", "c"], 3),
        synthetic(&["c", "d"], 1),
        synthetic(&["d", "e"], 7),
    ];

    let kept: Vec<usize> = filter_by_support(&patterns, 3).iter().map(|p| p.support_count).collect();

    assert_eq!(kept, vec![5, 3, 7]);
    assert_eq!(patterns.len(), 4);
}

#[test]
fn test_other_filters() {
    let mut scored = synthetic(&["a", "b", "c"], 8);
    scored.ai_analysis = Some(AiVerdict {
        worth_automating: true,
        reason: "frequent".to_string(),
        estimated_time_saving_secs: 30,
        complexity: Complexity::Low,
        suggested_name: "abc".to_string(),
        suggested_steps: vec![],
    });
    let patterns = vec![synthetic(&["a", "b"], 2), scored, synthetic(&["x", "y", "z", "w"], 5)];

    assert_eq!(filter_by_confidence(&patterns, 0.5).len(), 2);
    assert_eq!(filter_by_length(&patterns, 3, 4).len(), 2);
    assert_eq!(filter_unscored(&patterns).len(), 2);

    let top: Vec<usize> = top_patterns(&patterns, 2).iter().map(|p| p.support_count).collect();
    assert_eq!(top, vec![8, 5]);
    assert!(top_patterns(&patterns, 0).is_empty());
}

#[test]
fn test_rank_breaks_ties_by_length_then_signature() {
    let mut patterns = vec![
        synthetic(&["b", "c"], 3),
        synthetic(&["a", "b", "c"], 3),
        synthetic(&["a", "b"], 3),
        synthetic(&["z", "z"], 9),
    ];

    rank(&mut patterns);

    let order: Vec<String> = patterns.iter().map(|p| p.signature()).collect();
    assert_eq!(
        order,
        vec![
            "keyboard:z->keyboard:z",
            "keyboard:a->keyboard:b->keyboard:c",
            "keyboard:a->keyboard:b",
            "keyboard:b->keyboard:c",
        ]
    );
}

#[test]
fn test_pattern_stats() {
    let mut automated = synthetic(&["a", "b", "c"], 4);
    automated.is_automated = true;
    let patterns = vec![synthetic(&["a", "b"], 2), automated, synthetic(&["c", "d"], 2)];

    let stats = PatternStats::compute(&patterns);

    assert_eq!(stats.total_patterns, 3);
    assert_eq!(stats.by_length.get(&2), Some(&2));
    assert_eq!(stats.by_length.get(&3), Some(&1));
    assert_eq!(stats.by_support.get(&2), Some(&2));
    assert_eq!(stats.automated, 1);
    assert_eq!(stats.unscored, 3);
    assert!((stats.avg_confidence - (0.2 + 0.4 + 0.2) / 3.0).abs() < 1e-9);
    assert_eq!(stats.longest.as_ref().map(Pattern::len), Some(3));
    assert_eq!(
        stats.shortest.as_ref().map(|p| p.signature()),
        Some("keyboard:a->keyboard:b".to_string())
    );

    assert_eq!(PatternStats::compute(&[]).total_patterns, 0);
}
