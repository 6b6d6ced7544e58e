mod batch;
mod config;
mod csv_sink;
mod db;
mod dedup;
mod extract;
mod harvest;
mod render;
mod target;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::batch::ReviewSink;
use crate::config::{DbConfig, HarvestConfig};
use crate::db::InsertMode;
use crate::dedup::SeenBodies;
use crate::render::Page;
use crate::target::TargetMode;

#[derive(Parser)]
#[command(name = "steam_review_scraper", about = "Incremental Steam review scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest reviews into PostgreSQL and CSV
    Run {
        /// Steam app id whose reviews to harvest
        #[arg(long, default_value_t = config::DEFAULT_APP_ID)]
        app_id: i32,
        /// Max new reviews to collect this run
        #[arg(short = 'n', long, default_value_t = config::DEFAULT_REVIEW_LIMIT, conflicts_with = "discover_target")]
        limit: usize,
        /// Derive the target from the store page review count instead of --limit
        #[arg(long)]
        discover_target: bool,
        /// Delay after each scroll, in seconds
        #[arg(long, default_value_t = config::DEFAULT_SCROLL_DELAY_SECS)]
        scroll_delay: f64,
        /// Accepted reviews per flush to the sinks
        #[arg(long, default_value_t = config::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Directory for CSV output and logs
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Consecutive no-progress scans before giving up (0 = keep scanning forever)
        #[arg(long, default_value_t = config::DEFAULT_STALL_LIMIT)]
        stall_limit: u32,
        /// Strict inserts that error on duplicates, for an initial bulk load
        #[arg(long)]
        strict_insert: bool,
    },
    /// Create the steam_reviews table if it does not exist
    InitDb,
    /// Row counts in the review store
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let t0 = Instant::now();
    let mut _log_guard: Option<WorkerGuard> = None;

    let result = match cli.command {
        Commands::Run {
            app_id,
            limit,
            discover_target,
            scroll_delay,
            batch_size,
            output_dir,
            stall_limit,
            strict_insert,
        } => {
            _log_guard = init_logging(Some(&output_dir))?;
            let cfg = HarvestConfig {
                app_id,
                target: if discover_target {
                    TargetMode::StorePage
                } else {
                    TargetMode::Fixed(limit)
                },
                scroll_delay: Duration::from_secs_f64(scroll_delay),
                batch_size,
                output_dir,
                stall_limit,
                insert_mode: if strict_insert {
                    InsertMode::Strict
                } else {
                    InsertMode::Incremental
                },
            };
            run_harvest(cfg).await
        }
        Commands::InitDb => {
            _log_guard = init_logging(None)?;
            db::ensure_table(&DbConfig::from_env()).await?;
            println!("Table steam_reviews is ready.");
            Ok(())
        }
        Commands::Stats => {
            _log_guard = init_logging(None)?;
            let stats = db::fetch_stats(&DbConfig::from_env()).await?;
            println!("Total reviews: {}", stats.total);
            for (app_id, count) in &stats.apps {
                println!("  app {:>8}: {}", app_id, count);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_harvest(cfg: HarvestConfig) -> Result<()> {
    let db_cfg = DbConfig::from_env();
    info!(app_id = cfg.app_id, "Scraping reviews for app");

    // A store outage here only costs this run the DB sink, not the scrape.
    if let Err(e) = db::ensure_table(&db_cfg).await {
        error!(error = %e, "Failed to create steam_reviews table");
    }

    let seen = match db::fetch_existing_bodies(&db_cfg, cfg.app_id).await {
        Ok(bodies) => {
            info!(existing = bodies.len(), "Seeded dedup set from store");
            SeenBodies::from_existing(bodies)
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch existing reviews, starting with empty dedup set");
            SeenBodies::new()
        }
    };

    let client = reqwest::Client::builder()
        .user_agent(config::USER_AGENT)
        .build()?;

    let harvest_target = target::resolve_target(&client, cfg.app_id, cfg.target).await?;

    let mut page = render::navigate(client, &config::review_listing_url(cfg.app_id)).await?;

    let csv = csv_sink::CsvSink::new(&cfg.output_dir, cfg.app_id);
    info!(path = %csv.path().display(), "Appending CSV output");
    let mut sinks: Vec<Box<dyn ReviewSink>> =
        vec![Box::new(db::DbSink::new(db_cfg, cfg.insert_mode)), Box::new(csv)];

    let result = harvest::run(&mut page, &cfg, seen, &mut sinks, harvest_target).await;
    page.close().await;
    let stats = result?;

    if stats.stalled {
        warn!(
            accepted = stats.accepted,
            target = stats.target,
            "Run ended early: listing stopped yielding new reviews"
        );
    } else {
        info!(accepted = stats.accepted, "Target reached");
    }
    println!(
        "Collected {} new reviews (target {}, {} scans{}).",
        stats.accepted,
        stats.target,
        stats.scans,
        if stats.stalled { ", stalled" } else { "" }
    );
    Ok(())
}

/// One fmt subscriber for the whole process; `run` adds a daily-rolling file
/// under `<output_dir>/logs/<year>/<year-month>/`. The returned guard keeps the
/// background file writer alive until main exits.
fn init_logging(log_root: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    match log_root {
        Some(root) => {
            let today = chrono::Local::now();
            let dir = root
                .join("logs")
                .join(today.format("%Y").to_string())
                .join(today.format("%Y-%m").to_string());
            std::fs::create_dir_all(&dir)?;
            let (file_writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "harvest.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_writer(file_writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
            Ok(None)
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
