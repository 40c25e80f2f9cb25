//! Salience CLI
//!
//! Feeds a transcript through the pool one turn per line and prints what
//! the conversation is currently about.

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use salience::config::CacheConfig;
use salience::{
    CandidateExtractor, KeywordExtractor, LlmExtractor, PoolConfig, PoolHandle, ResilientExtractor, ScoredPool,
    Turn,
};
use serde::Deserialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Salience - track what a conversation is about
#[derive(Parser, Debug)]
#[command(name = "salience")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transcript file, one turn per line; reads stdin when omitted
    #[arg(short, long)]
    transcript: Option<PathBuf>,

    /// Extract with the LLM (keyword fallback on failure)
    #[arg(long)]
    llm: bool,

    /// Bounded cache mode with capacity-based eviction
    #[arg(long)]
    cache: bool,

    /// Print the state after every turn instead of only at the end
    #[arg(long)]
    every_turn: bool,

    /// Print the prompt block instead of the JSON snapshot
    #[arg(long)]
    prompt: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Transcript line given as JSON instead of plain text
#[derive(Debug, Deserialize)]
struct TurnLine {
    text: String,
    #[serde(default)]
    emotion: Option<f64>,
    #[serde(default)]
    intent: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // logs go to stderr so stdout stays machine-readable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = PoolConfig::load_or_default(cli.config.as_deref()).context("loading config")?;
    config.extractor = config.extractor.with_env_overrides();
    if cli.cache && config.cache.is_none() {
        config.cache = Some(CacheConfig::default());
    }

    let extractor = build_extractor(&cli, &config);
    let handle = if cli.cache {
        PoolHandle::spawn(ScoredPool::cache(config), extractor)
    } else {
        PoolHandle::spawn(ScoredPool::focus(config), extractor)
    };

    if cli.verbose {
        let mut events = Box::pin(handle.events());
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                debug!("Pool event {:?}: '{}' ({})", event.kind, event.item.label, event.item.tier);
            }
        });
    }

    let lines = read_transcript(cli.transcript.as_deref())?;
    info!("Processing {} turns", lines.len());

    for line in lines {
        let Some(turn) = parse_turn(&line) else {
            continue;
        };
        handle.ingest_text(turn).await?;
        if cli.every_turn {
            print_state(&handle, cli.prompt)?;
        }
    }

    if !cli.every_turn {
        print_state(&handle, cli.prompt)?;
    }
    handle.shutdown().await?;
    Ok(())
}

fn build_extractor(cli: &Cli, config: &PoolConfig) -> Arc<dyn CandidateExtractor> {
    if !cli.llm {
        return Arc::new(KeywordExtractor::new());
    }
    match LlmExtractor::from_config(&config.extractor) {
        Ok(llm) => Arc::new(ResilientExtractor::new(Arc::new(llm), config.extractor.timeout())),
        Err(e) => {
            warn!("LLM extractor unavailable ({}), using keywords only", e);
            Arc::new(KeywordExtractor::new())
        }
    }
}

fn read_transcript(path: Option<&Path>) -> anyhow::Result<Vec<String>> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading transcript {}", path.display()))?;
            Ok(content.lines().map(str::to_string).collect())
        }
        None => io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("reading stdin"),
    }
}

/// Plain text, or a JSON object with `text` and optional `emotion`/`intent`.
fn parse_turn(line: &str) -> Option<Turn> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<TurnLine>(line) {
            let mut turn = Turn::new(parsed.text);
            if let Some(emotion) = parsed.emotion {
                turn = turn.with_emotion(emotion);
            }
            if let Some(intent) = parsed.intent {
                turn = turn.with_intent(intent);
            }
            return Some(turn);
        }
    }
    Some(Turn::new(line))
}

fn print_state(handle: &PoolHandle, as_prompt: bool) -> anyhow::Result<()> {
    let snapshot = handle.snapshot();
    let mut stdout = io::stdout().lock();
    if as_prompt {
        writeln!(stdout, "{}", snapshot.to_prompt_string())?;
    } else {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&snapshot)?)?;
    }
    stdout.flush()?;
    Ok(())
}
