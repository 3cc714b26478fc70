//! CLI entry point for the GTFS-RT decoder.
//!
//! Provides subcommands for decoding a single feed, snapshotting vehicle
//! positions across all configured feeds, polling on an interval, and
//! decoding encoded polylines.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gtfs_rt_decoder::{
    aggregate::{FeedFetcher, extract_all_vehicle_positions},
    catalog::default_catalog,
    feed::ParsedFeed,
    fetch::{BasicClient, auth::ApiKey, fetch_bytes},
    output::{append_records, print_json},
    parser::parse_feed,
    polyline,
};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_decoder")]
#[command(about = "Decode GTFS-RT feeds without generated protobuf code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a GTFS-RT feed from a file or URL and log a summary
    Decode {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Dump the full parsed feed as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Snapshot vehicle positions across all configured feeds
    Vehicles {
        /// CSV file to append position records to
        #[arg(short, long, default_value = "vehicles.csv")]
        output: String,
    },
    /// Poll all configured feeds on an interval
    Watch {
        /// Seconds between polls
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// Number of rounds to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        rounds: usize,

        /// CSV file to append position records to
        #[arg(short, long, default_value = "vehicles.csv")]
        output: String,
    },
    /// Decode an encoded polyline into coordinates
    Polyline {
        /// Encoded polyline string
        #[arg(value_name = "ENCODED")]
        encoded: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_rt_decoder.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_decoder.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { source, json } => {
            let bytes = fetcher(&source).await?;
            let feed = parse_feed(&bytes)?;
            log_feed_summary(&source, &feed);
            if json {
                print_json(&feed)?;
            }
        }
        Commands::Vehicles { output } => {
            let fetcher = feed_fetcher()?;
            snapshot_round(&fetcher, &output).await?;
        }
        Commands::Watch {
            interval,
            rounds,
            output,
        } => {
            watch(interval, rounds, &output).await?;
        }
        Commands::Polyline { encoded } => {
            let points = polyline::decode(&encoded)?;
            info!(point_count = points.len(), "Polyline decoded");
            print_json(&points.iter().map(|p| (p.latitude, p.longitude)).collect::<Vec<_>>())?;
        }
    }

    Ok(())
}

/// Loads feed data from a local file path or fetches it over HTTP with the
/// configured API key.
#[tracing::instrument(fields(source = %source))]
async fn fetcher(source: &String) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        let client = api_client()?;
        fetch_bytes(&client, source).await?
    } else {
        std::fs::read(source)?
    };
    Ok(bytes)
}

fn api_client() -> Result<ApiKey<BasicClient>> {
    let key = std::env::var("MTA_API_KEY").context("MTA_API_KEY must be set")?;
    Ok(ApiKey::x_api_key(BasicClient::new(), key))
}

fn feed_fetcher() -> Result<FeedFetcher<ApiKey<BasicClient>>> {
    Ok(FeedFetcher::new(api_client()?, default_catalog()))
}

fn log_feed_summary(source: &str, feed: &ParsedFeed) {
    let trip_updates = feed.entities.iter().filter(|e| e.trip_update.is_some()).count();
    let vehicles = feed.entities.iter().filter(|e| e.vehicle.is_some()).count();
    let alerts = feed.entities.iter().filter(|e| e.alert.is_some()).count();

    info!(
        source,
        version = %feed.header.gtfs_realtime_version,
        timestamp = feed.header.timestamp,
        entities = feed.entities.len(),
        trip_updates,
        vehicles,
        alerts,
        "Feed decoded"
    );
}

/// One fetch-extract-append round across all feeds.
async fn snapshot_round(
    fetcher: &FeedFetcher<ApiKey<BasicClient>>,
    output: &str,
) -> Result<()> {
    let feeds = fetcher.fetch_all().await?;
    let records = extract_all_vehicle_positions(&feeds);

    info!(
        feed_count = feeds.len(),
        vehicle_count = records.len(),
        output,
        "Snapshot complete"
    );
    append_records(output, &records)?;
    Ok(())
}

/// Polls all feeds every `interval` seconds. A failed round is logged and
/// the loop carries on with the previous snapshot effectively stale.
#[tracing::instrument(skip_all, fields(interval, rounds, output))]
async fn watch(interval: u64, rounds: usize, output: &str) -> Result<()> {
    let fetcher = feed_fetcher()?;

    if rounds == 0 {
        info!(interval, "Polling indefinitely. Press Ctrl+C to stop.");
    } else {
        info!(interval, rounds, "Starting poll loop");
    }

    let mut round = 0usize;
    loop {
        round += 1;
        if let Err(e) = snapshot_round(&fetcher, output).await {
            error!(round, error = %e, "Poll round failed");
        }

        if rounds > 0 && round >= rounds {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
    }

    info!(round, "Finished polling");
    Ok(())
}
