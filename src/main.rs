use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use routine::analysis::{
    AnalysisEvent, AnalysisOrchestrator, ChannelNotifier, HeuristicScorer, InMemoryEventSource,
    InMemoryPatternSink,
};
use routine::config::AnalyzerConfig;
use routine::mining::PatternStats;

/// Mine recurring action sequences from captured interaction events.
#[derive(Debug, Parser)]
#[command(name = "routine", version)]
struct Cli {
    /// Captured events, one JSON object per line.
    #[arg(long)]
    events: PathBuf,

    /// TOML config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single analysis pass and exit instead of scheduling.
    #[arg(long)]
    once: bool,

    /// Score patterns with the offline heuristic scorer.
    #[arg(long)]
    score: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")?;

    let cli = Cli::parse();

    // 2. Config
    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };
    if cli.score {
        config.orchestrator.enable_ai_scoring = true;
    }

    // 3. Collaborators
    let source = Arc::new(InMemoryEventSource::from_jsonl(&cli.events)?);
    let sink = Arc::new(InMemoryPatternSink::new());
    let (notifier, mut notifications) = ChannelNotifier::channel(16);
    tracing::info!(events = source.len().await, "events loaded");

    let mut builder = AnalysisOrchestrator::builder(config)
        .event_source(source)
        .pattern_sink(sink.clone())
        .notifier(Arc::new(notifier));
    if cli.score {
        builder = builder.scorer(Arc::new(HeuristicScorer::default()));
    }
    let orchestrator = builder.build()?;

    // 4. Run
    if cli.once {
        let report = orchestrator.analyze_now().await?;
        let stats = PatternStats::compute(&report.patterns);
        let output = json!({
            "summary": report.summary,
            "stats": stats,
            "patterns": report.patterns,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    orchestrator.start().await?;
    let printer = tokio::spawn(async move {
        while let Some(AnalysisEvent::Completed(summary)) = notifications.recv().await {
            if let Ok(line) = serde_json::to_string(&summary) {
                println!("{line}");
            }
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    orchestrator.stop().await?;
    drop(orchestrator);
    printer.abort();

    let patterns = sink.patterns().await;
    println!("{}", serde_json::to_string_pretty(&PatternStats::compute(&patterns))?);
    Ok(())
}
