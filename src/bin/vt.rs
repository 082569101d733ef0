//! vt - Voyager Transits CLI
//!
//! Day-by-day transit and ephemeris timelines from the command line.
//! Results go to stdout as JSON; logs go to stderr (`RUST_LOG` controls
//! verbosity).

// Exclude from coverage - CLI binary tested via integration tests
#![cfg_attr(tarpaulin, ignore)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voyager_transits::core::{
    parse_day, Aspect, CalculationClient, CalculationOptions, DateWindow, EphemerisCache,
    EphemerisFetcher, EphemerisRequest, FetchOrchestrator, GenerationOutcome, MonthCache,
    ObservatoryConfig, RangeFetcher, ScoreBreakdown, TransitRequest,
};
use voyager_transits::AspectScorer;

/// 🔭 Voyager Transits: day-by-day skies over a slow oracle
#[derive(Parser, Debug)]
#[command(name = "vt")]
#[command(version = voyager_transits::VERSION)]
#[command(about = "🔭 Voyager Transits: day-by-day transit and ephemeris timelines")]
#[command(after_help = "EXAMPLES:
  # Transits to a natal chart for two weeks
  vt transits --subject here.json --natal ada.json --start 2025-01-15 --end 2025-01-31

  # Only the headline aspect of each day
  vt transits --subject here.json --natal ada.json --start 2025-01-01 --end 2025-03-31 --headlines

  # Raw-sky ephemeris
  vt ephemeris --start 2025-01-01 --end 2025-01-10

  # Rank aspects offline
  vt score --aspects aspects.json --mode synastry
")]
struct Cli {
    /// Config file path (default: ./.voyager_transits.json)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Bypass the on-disk cache
    #[arg(long = "no-cache", global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transits of a subject to a natal chart
    Transits {
        /// Transit subject JSON (location for the transiting sky)
        #[arg(long = "subject", value_name = "FILE")]
        subject: PathBuf,

        /// Natal (reference) subject JSON
        #[arg(long = "natal", value_name = "FILE")]
        natal: PathBuf,

        /// First day, YYYY-MM-DD
        #[arg(long = "start", value_name = "DATE")]
        start: String,

        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long = "end", value_name = "DATE")]
        end: String,

        /// Calculation options JSON
        #[arg(long = "options", value_name = "FILE")]
        options: Option<PathBuf>,

        /// Print each day's most significant aspect instead of full records
        #[arg(long = "headlines")]
        headlines: bool,
    },

    /// Raw-sky ephemeris for the configured observer
    Ephemeris {
        #[arg(long = "start", value_name = "DATE")]
        start: String,

        #[arg(long = "end", value_name = "DATE")]
        end: String,

        #[arg(long = "options", value_name = "FILE")]
        options: Option<PathBuf>,
    },

    /// Score and select aspects from a JSON file
    Score {
        /// JSON array of aspects
        #[arg(long = "aspects", value_name = "FILE")]
        aspects: PathBuf,

        #[arg(long = "mode", value_enum, default_value = "significance")]
        mode: ScoreMode,
    },

    /// Manage the on-disk cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Remove every cached month and ephemeris range
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ScoreMode {
    /// Rank by significance score
    Significance,
    /// Rank by absolute orb
    Orb,
    /// Pick the relationship key aspect
    Synastry,
}

#[derive(Serialize)]
struct ScoredAspect<'a> {
    #[serde(flatten)]
    aspect: &'a Aspect,
    #[serde(flatten)]
    breakdown: ScoreBreakdown,
}

#[derive(Serialize)]
struct Headline<'a> {
    date: String,
    aspect: Option<ScoredAspect<'a>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ObservatoryConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Command::Transits {
            subject,
            natal,
            start,
            end,
            options,
            headlines,
        } => {
            let window = DateWindow::new(parse_day(&start)?, parse_day(&end)?)?;
            let request = TransitRequest {
                subject: read_json(&subject)?,
                reference: read_json(&natal)?,
                window,
                options: read_options(options.as_deref())?,
            };
            run_transits(&config, cli.no_cache, request, headlines).await
        }
        Command::Ephemeris { start, end, options } => {
            let window = DateWindow::new(parse_day(&start)?, parse_day(&end)?)?;
            let request = EphemerisRequest {
                window,
                options: read_options(options.as_deref())?,
            };
            run_ephemeris(&config, cli.no_cache, request).await
        }
        Command::Score { aspects, mode } => {
            let aspects: Vec<Aspect> = read_json(&aspects)?;
            run_score(&aspects, mode)
        }
        Command::Cache {
            action: CacheAction::Clear,
        } => {
            let dir = config.resolved_cache_dir();
            let policy = config.cache.policy();
            MonthCache::on_disk(dir.clone(), policy).clear().await?;
            EphemerisCache::on_disk(dir.clone(), policy).clear().await?;
            println!("Cleared cache at {}", dir.display());
            Ok(())
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn read_options(path: Option<&Path>) -> anyhow::Result<CalculationOptions> {
    match path {
        Some(path) => read_json(path),
        None => Ok(CalculationOptions::default()),
    }
}

#[cfg(feature = "http")]
fn client(config: &ObservatoryConfig) -> anyhow::Result<Arc<dyn CalculationClient>> {
    Ok(Arc::new(voyager_transits::HttpCalculationClient::new(config)?))
}

#[cfg(not(feature = "http"))]
fn client(_config: &ObservatoryConfig) -> anyhow::Result<Arc<dyn CalculationClient>> {
    bail!("vt was built without the `http` feature; no calculation oracle available")
}

fn orchestrator(config: &ObservatoryConfig, no_cache: bool) -> anyhow::Result<FetchOrchestrator> {
    let client = client(config)?;
    let (months, ephemeris) = if no_cache {
        (MonthCache::disabled(), EphemerisCache::disabled())
    } else {
        let dir = config.resolved_cache_dir();
        let policy = config.cache.policy();
        (
            MonthCache::on_disk(dir.clone(), policy),
            EphemerisCache::on_disk(dir, policy),
        )
    };

    let range = RangeFetcher::new(client.clone(), months).with_pacing(config.pacing());
    let ephemeris = EphemerisFetcher::new(client, ephemeris, config.observer())
        .with_batching(config.ephemeris_batch_size, config.ephemeris_batch_delay());
    Ok(FetchOrchestrator::new(range, ephemeris))
}

/// Log progress until the orchestrator stops publishing.
fn watch_progress(orchestrator: &FetchOrchestrator) {
    let mut updates = orchestrator.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let progress = updates.borrow_and_update().progress;
            info!(loaded = progress.loaded, total = progress.total, "progress");
        }
    });
}

fn settle(outcome: GenerationOutcome) -> anyhow::Result<()> {
    match outcome {
        GenerationOutcome::Settled { days } => {
            info!(days, "timeline complete");
            Ok(())
        }
        GenerationOutcome::Failed { message } => bail!(message),
        GenerationOutcome::Superseded => bail!("request was superseded"),
    }
}

async fn run_transits(
    config: &ObservatoryConfig,
    no_cache: bool,
    request: TransitRequest,
    headlines: bool,
) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config, no_cache)?;
    watch_progress(&orchestrator);
    settle(orchestrator.request_transits(request).outcome().await)?;

    let state = orchestrator.state();
    if headlines {
        let scorer = AspectScorer::default();
        let lines: Vec<Headline> = state
            .transits
            .iter()
            .map(|day| Headline {
                date: day.day().to_string(),
                aspect: scorer.headline(day).map(|aspect| ScoredAspect {
                    aspect,
                    breakdown: scorer.explain(aspect),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&state.transits)?);
    }
    Ok(())
}

async fn run_ephemeris(
    config: &ObservatoryConfig,
    no_cache: bool,
    request: EphemerisRequest,
) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config, no_cache)?;
    watch_progress(&orchestrator);
    settle(orchestrator.request_ephemeris(request).outcome().await)?;
    println!("{}", serde_json::to_string_pretty(&orchestrator.state().ephemeris)?);
    Ok(())
}

fn run_score(aspects: &[Aspect], mode: ScoreMode) -> anyhow::Result<()> {
    let scorer = AspectScorer::default();
    let scored = |aspect| ScoredAspect {
        aspect,
        breakdown: scorer.explain(aspect),
    };

    let output = match mode {
        ScoreMode::Significance => serde_json::to_string_pretty(
            &scorer
                .rank_by_significance(aspects)
                .into_iter()
                .map(scored)
                .collect::<Vec<_>>(),
        )?,
        ScoreMode::Orb => serde_json::to_string_pretty(
            &voyager_transits::core::rank_by_orb(aspects)
                .into_iter()
                .map(scored)
                .collect::<Vec<_>>(),
        )?,
        ScoreMode::Synastry => {
            serde_json::to_string_pretty(&scorer.synastry_key_aspect(aspects).map(scored))?
        }
    };
    println!("{output}");
    Ok(())
}
