use anyhow::{Context, Result};
use clap::Parser;
use planet::aggregate::{Aggregator, MIXED_LANGUAGE};
use planet::config::Config;
use planet::publish::{feed_file_name, rss, DirectoryPublisher, Publisher};
use planet::roster::{self, Author};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Get the config directory path (~/.config/planet/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("planet");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(
    name = "planet",
    about = "Aggregates community blogs into per-language RSS feeds"
)]
struct Args {
    /// Config file (default: ~/.config/planet/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Author roster JSON (overrides `authors_path`)
    #[arg(long, value_name = "FILE")]
    authors: Option<PathBuf>,

    /// Output directory for feed files (overrides `output_dir`)
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Only build this language's feed ("mixed" for all authors)
    #[arg(long, value_name = "CODE")]
    language: Option<String>,

    /// Maximum items per feed (overrides `max_items`)
    #[arg(long, value_name = "N")]
    max_items: Option<usize>,

    /// Run once and exit, even if a refresh interval is configured
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; RUST_LOG controls verbosity
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env_overrides(|var| std::env::var(var).ok());

    if let Some(authors) = args.authors {
        config.authors_path = authors;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if args.max_items.is_some() {
        config.max_items = args.max_items;
    }
    config.validate().context("Invalid configuration")?;

    let aggregator = Aggregator::from_config(&config)?;
    let publisher = DirectoryPublisher::new(&config.output_dir);

    if args.once || config.refresh_interval_minutes == 0 {
        return run_once(&aggregator, &publisher, &config, args.language.as_deref()).await;
    }

    let period = Duration::from_secs(config.refresh_interval_minutes * 60);
    tracing::info!(
        minutes = config.refresh_interval_minutes,
        "Refreshing feeds on an interval"
    );
    refresh_until(
        period,
        || run_once(&aggregator, &publisher, &config, args.language.as_deref()),
        shutdown_signal(),
    )
    .await;
    Ok(())
}

/// Completes on Ctrl-C. Never completes if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Calls `run` every `period`, starting immediately, until `shutdown`
/// completes. A run in progress is abandoned when `shutdown` fires; a failed
/// run is logged and the next tick proceeds.
async fn refresh_until<F, Fut>(period: Duration, mut run: F, shutdown: impl Future<Output = ()>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }
        tokio::select! {
            result = run() => {
                if let Err(e) = result {
                    tracing::error!(error = %format!("{e:#}"), "Refresh failed");
                }
            }
            _ = &mut shutdown => break,
        }
    }
    tracing::info!("Interrupted, shutting down");
}

/// Reloads the roster and publishes one feed per language.
///
/// Without `only_language`, every roster language plus `"mixed"` is built.
async fn run_once(
    aggregator: &Aggregator,
    publisher: &impl Publisher,
    config: &Config,
    only_language: Option<&str>,
) -> Result<()> {
    let authors: Vec<Author> = roster::load_authors(&config.authors_path)
        .await
        .with_context(|| {
            format!(
                "Failed to load authors from {}",
                config.authors_path.display()
            )
        })?;

    let languages = match only_language {
        Some(language) => vec![language.to_string()],
        None => roster::feed_languages(&authors),
    };
    tracing::info!(
        authors = authors.len(),
        feeds = languages.len(),
        "Starting aggregation run"
    );

    for language in &languages {
        let feed = aggregator
            .aggregate(&authors, language, config.max_items)
            .await;
        let xml = rss::to_rss_xml(&feed)
            .with_context(|| format!("Failed to serialize {language} feed"))?;
        let location = publisher
            .publish(&feed_file_name(language), xml.as_bytes())
            .with_context(|| format!("Failed to publish {language} feed"))?;

        let scope = if language == MIXED_LANGUAGE {
            "all languages"
        } else {
            language.as_str()
        };
        println!("{scope}: {} items -> {location}", feed.items.len());
    }

    Ok(())
}
