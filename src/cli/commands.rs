//! CLI command definitions for autopress.
//!
//! Each subcommand loads its YAML inputs, wires the pipeline from process
//! configuration and prints a summary (JSON with `--json`).

use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::campaign::{Campaign, SourceItem};
use crate::config::AppConfig;
use crate::hosting::{ArticleHost, MediaFetcher, ReqwestTransport, SiteRegistry, WordPressHost};
use crate::ledger::{Ledger, SqliteLedger};
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{ContentPipeline, ImageAcquirer, Publisher, RunFailure, RunOutcome};
use crate::providers::{FallbackInvoker, HandlerKind, OpenAiCompatibleHandler};
use crate::quality::score_content;
use crate::translation::{TranslationJob, TranslationPipeline};

/// Default site registry file.
const DEFAULT_SITES_FILE: &str = "sites.yaml";

/// Automated article production and publishing.
#[derive(Parser)]
#[command(name = "autopress")]
#[command(about = "Generate, score and publish articles to WordPress sites")]
#[command(version)]
#[command(
    long_about = "autopress turns campaign topics into researched, illustrated and scored articles and publishes them to WordPress sites.\n\nHandlers are configured through AUTOPRESS_* environment variables; sites through a YAML registry.\n\nExample usage:\n  autopress run --campaign campaign.yaml --topics topics.txt --sites sites.yaml"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Produce and publish articles for a list of topics.
    Run(RunArgs),

    /// Translate published posts according to a job file.
    Translate(TranslateArgs),

    /// Re-acquire and re-insert images for a published post.
    Repair(RepairArgs),

    /// Score an HTML or markdown file and print the result as JSON.
    Score(ScoreArgs),

    /// List translation history for a source post.
    History(HistoryArgs),
}

/// Arguments for `autopress run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Campaign YAML file.
    #[arg(short = 'c', long)]
    pub campaign: PathBuf,

    /// Topics file: YAML list of source items, or one topic per line.
    #[arg(short = 't', long)]
    pub topics: PathBuf,

    /// Site registry YAML file.
    #[arg(short = 's', long, default_value = DEFAULT_SITES_FILE)]
    pub sites: PathBuf,

    /// Concurrent work items (overrides AUTOPRESS_MAX_CONCURRENCY).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub print_metrics: bool,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `autopress translate`.
#[derive(Parser, Debug)]
pub struct TranslateArgs {
    /// Translation job YAML file.
    #[arg(long)]
    pub job: PathBuf,

    /// Site registry YAML file.
    #[arg(short = 's', long, default_value = DEFAULT_SITES_FILE)]
    pub sites: PathBuf,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `autopress repair`.
#[derive(Parser, Debug)]
pub struct RepairArgs {
    /// Campaign YAML file the post was published under.
    #[arg(short = 'c', long)]
    pub campaign: PathBuf,

    /// Id of the post to repair.
    #[arg(long)]
    pub post_id: u64,

    /// Site registry YAML file.
    #[arg(short = 's', long, default_value = DEFAULT_SITES_FILE)]
    pub sites: PathBuf,
}

/// Arguments for `autopress score`.
#[derive(Parser, Debug)]
pub struct ScoreArgs {
    /// HTML or markdown file to score.
    pub file: PathBuf,
}

/// Arguments for `autopress history`.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Source site id.
    #[arg(long)]
    pub site: String,

    /// Source post id.
    #[arg(long)]
    pub post_id: u64,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    if config.metrics_enabled {
        init_metrics().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {}", e))?;
    }

    match cli.command {
        Commands::Run(args) => run_articles_command(args, config).await?,
        Commands::Translate(args) => run_translate_command(args, config).await?,
        Commands::Repair(args) => run_repair_command(args, config).await?,
        Commands::Score(args) => run_score_command(args)?,
        Commands::History(args) => run_history_command(args, config).await?,
    }
    Ok(())
}

// ============================================================================
// Wiring
// ============================================================================

/// Registers a handler for every configured kind, in fallback order.
fn build_invoker(config: &AppConfig) -> anyhow::Result<FallbackInvoker> {
    let mut invoker = FallbackInvoker::new();
    for kind in HandlerKind::ALL {
        if let Some(settings) = config.handlers.get(&kind) {
            invoker.register(Arc::new(OpenAiCompatibleHandler::new(kind, settings)?));
        }
    }
    if invoker.registered().is_empty() {
        warn!("No handlers configured; set AUTOPRESS_<HANDLER>_API_KEY");
    }
    Ok(invoker)
}

async fn open_ledger(config: &AppConfig) -> anyhow::Result<Arc<dyn Ledger>> {
    let path = config.ledger_path.to_string_lossy();
    Ok(Arc::new(SqliteLedger::open(&path).await?))
}

fn build_host(sites: &Path) -> anyhow::Result<Arc<dyn ArticleHost>> {
    let registry = SiteRegistry::from_file(sites)?;
    Ok(Arc::new(WordPressHost::new(registry)?))
}

fn build_publisher(
    config: &AppConfig,
    host: Arc<dyn ArticleHost>,
    acquirer: Arc<ImageAcquirer>,
) -> anyhow::Result<Arc<Publisher>> {
    let transport = Arc::new(ReqwestTransport::new()?);
    let fetcher = Arc::new(MediaFetcher::from_config(transport, config));
    Ok(Arc::new(Publisher::new(host, fetcher, acquirer)))
}

/// Reads a topics file: a YAML list of source items, or plain lines.
///
/// Blank lines and lines starting with `#` are ignored in plain files.
fn load_topics(path: &Path) -> anyhow::Result<Vec<SourceItem>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read topics file {}: {}", path.display(), e))?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        return Ok(serde_yaml::from_str(&content)?);
    }

    Ok(parse_topic_lines(&content))
}

fn parse_topic_lines(content: &str) -> Vec<SourceItem> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(SourceItem::new)
        .collect()
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct RunEntry {
    topic: String,
    outcome: String,
    attempt: u32,
    post_id: Option<u64>,
    link: Option<String>,
    quality_score: Option<u32>,
    warnings: Vec<String>,
    error: Option<String>,
}

impl RunEntry {
    fn from_result(result: &Result<RunOutcome, RunFailure>) -> Self {
        match result {
            Ok(outcome) => {
                let ctx = outcome.context();
                Self {
                    topic: ctx.topic().to_string(),
                    outcome: outcome.as_str().to_string(),
                    attempt: ctx.attempt,
                    post_id: ctx.publish.as_ref().map(|p| p.post_id),
                    link: ctx.publish.as_ref().map(|p| p.link.clone()),
                    quality_score: ctx.quality.as_ref().map(|q| q.composite),
                    warnings: ctx.warnings.clone(),
                    error: match outcome {
                        RunOutcome::Skipped { reason, .. } => Some(reason.clone()),
                        _ => None,
                    },
                }
            }
            Err(failure) => Self {
                topic: failure.context.topic().to_string(),
                outcome: "failed".to_string(),
                attempt: failure.context.attempt,
                post_id: None,
                link: None,
                quality_score: failure.context.quality.as_ref().map(|q| q.composite),
                warnings: failure.context.warnings.clone(),
                error: Some(failure.error.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RunOutput {
    campaign: String,
    total: usize,
    published: u64,
    flagged: u64,
    skipped: u64,
    retry_requested: u64,
    failed: u64,
    average_duration_secs: f64,
    results: Vec<RunEntry>,
}

async fn run_articles_command(args: RunArgs, config: AppConfig) -> anyhow::Result<()> {
    let campaign = Campaign::from_file(&args.campaign)?;
    let items = load_topics(&args.topics)?;
    if items.is_empty() {
        return Err(anyhow::anyhow!(
            "Topics file {} has no topics",
            args.topics.display()
        ));
    }

    let invoker = Arc::new(build_invoker(&config)?);
    let ledger = open_ledger(&config).await?;
    let host = build_host(&args.sites)?;
    let acquirer = Arc::new(
        ImageAcquirer::new(Arc::clone(&invoker)).with_fanout_timeout(config.image_fanout_timeout),
    );
    campaign.check_image_sources(acquirer.has_stock_libraries())?;
    let publisher = build_publisher(&config, host, Arc::clone(&acquirer))?;

    let pipeline = ContentPipeline::new(&config, invoker, acquirer, publisher, ledger)
        .with_max_concurrency(args.concurrency.unwrap_or(config.max_concurrency));

    info!(
        campaign = %campaign.display_name(),
        topics = items.len(),
        "Starting campaign run"
    );

    let results = pipeline.run_batch(&campaign, items).await;
    let stats = pipeline.stats().await;

    let output = RunOutput {
        campaign: campaign.id.clone(),
        total: results.len(),
        published: stats.published,
        flagged: stats.flagged,
        skipped: stats.skipped,
        retry_requested: stats.retry_requested,
        failed: stats.failed,
        average_duration_secs: stats.average_duration.as_secs_f64(),
        results: results.iter().map(RunEntry::from_result).collect(),
    };

    if args.json {
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        for entry in &output.results {
            match (&entry.link, &entry.error) {
                (Some(link), _) => println!("[{}] {} -> {}", entry.outcome, entry.topic, link),
                (None, Some(error)) => println!("[{}] {}: {}", entry.outcome, entry.topic, error),
                (None, None) => println!("[{}] {}", entry.outcome, entry.topic),
            }
        }
        println!(
            "\n{} published ({} flagged), {} skipped, {} retry requested, {} failed",
            output.published, output.flagged, output.skipped, output.retry_requested, output.failed
        );
    }

    if args.print_metrics {
        println!("{}", export_metrics());
    }

    if output.failed > 0 {
        return Err(anyhow::anyhow!("{} of {} runs failed", output.failed, output.total));
    }
    Ok(())
}

async fn run_translate_command(args: TranslateArgs, config: AppConfig) -> anyhow::Result<()> {
    let job = TranslationJob::from_file(&args.job)?;
    let invoker = Arc::new(build_invoker(&config)?);
    let ledger = open_ledger(&config).await?;
    let host = build_host(&args.sites)?;

    let pipeline = TranslationPipeline::new(invoker, host, ledger)
        .with_max_tokens(config.generation_max_tokens);
    let report = pipeline.run_job(&job).await?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&report)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        println!(
            "Job {}: {} published, {} skipped, {} failed",
            report.job_id, report.published, report.skipped, report.failed
        );
    }

    if report.failed > 0 {
        return Err(anyhow::anyhow!(
            "{} translation(s) failed in job {}",
            report.failed,
            report.job_id
        ));
    }
    Ok(())
}

async fn run_repair_command(args: RepairArgs, config: AppConfig) -> anyhow::Result<()> {
    let campaign = Campaign::from_file(&args.campaign)?;
    let invoker = Arc::new(build_invoker(&config)?);
    let host = build_host(&args.sites)?;
    let acquirer = Arc::new(
        ImageAcquirer::new(invoker).with_fanout_timeout(config.image_fanout_timeout),
    );
    campaign.check_image_sources(acquirer.has_stock_libraries())?;
    let publisher = build_publisher(&config, host, acquirer)?;

    let report = publisher.repair_images(&campaign, args.post_id).await?;
    let json_output = serde_json::to_string_pretty(&report)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json_output);
    Ok(())
}

fn run_score_command(args: ScoreArgs) -> anyhow::Result<()> {
    let content = fs::read_to_string(&args.file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.file.display(), e))?;
    let result = score_content(&content);
    let json_output = serde_json::to_string_pretty(&result)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json_output);
    Ok(())
}

async fn run_history_command(args: HistoryArgs, config: AppConfig) -> anyhow::Result<()> {
    let ledger = open_ledger(&config).await?;
    let history = ledger.translation_history(&args.site, args.post_id).await?;
    let json_output = serde_json::to_string_pretty(&history)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json_output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        // Verify CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let args = vec!["autopress", "run", "-c", "campaign.yaml", "-t", "topics.txt"];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.campaign, PathBuf::from("campaign.yaml"));
                assert_eq!(args.sites, PathBuf::from(DEFAULT_SITES_FILE));
                assert!(args.concurrency.is_none());
                assert!(!args.json);
                assert!(!args.print_metrics);
            }
            _ => panic!("Expected Run command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_global_log_level_after_subcommand() {
        let args = vec!["autopress", "score", "post.html", "--log-level", "debug"];
        let cli = Cli::try_parse_from(args).expect("should parse");
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Score(_)));
    }

    #[test]
    fn test_repair_requires_post_id() {
        let args = vec!["autopress", "repair", "-c", "campaign.yaml"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_parse_topic_lines() {
        let items = parse_topic_lines("# weekly\nBudget travel\n\n  Home office setup  \n");
        let topics: Vec<&str> = items.iter().map(|i| i.topic.as_str()).collect();
        assert_eq!(topics, vec!["Budget travel", "Home office setup"]);
    }

    #[test]
    fn test_load_topics_yaml() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("topics.yaml");
        fs::write(
            &path,
            "- topic: Budget travel\n  keywords: [travel, budget]\n- topic: Home office\n",
        )
        .expect("write");

        let items = load_topics(&path).expect("load");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].keywords, vec!["travel", "budget"]);
    }
}
