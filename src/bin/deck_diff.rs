//! Deck Diff Binary
//!
//! Compares one extraction type across deck artifacts stored in a directory
//! and prints the comparison response as JSON on stdout. Logs go to stderr.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DECK_ARTIFACT_DIR`: directory holding `<snapshot id>.json` artifacts (required)
//! - `EXTRACTION_TYPE`: extraction type to compare (required)
//! - `SNAPSHOTS`: comma-separated snapshot ids, in declared order (required)
//! - `DECK_PROFILES`: optional JSON file with additional extraction profiles
//! - `DECK_DIFF_*`: comparison policy and fetch settings
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! DECK_ARTIFACT_DIR=./decks EXTRACTION_TYPE=plant_capacity SNAPSHOTS=NW202401,NW202402 \
//!     cargo run --bin deck_diff
//! ```

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use deck_diff_kernel::{
    load_profiles, ComparatorRegistry, ComparisonPolicy, ComparisonRequest, ComparisonService,
    FetchConfig, FileSnapshotFetcher,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "deck_diff=info,deck_diff_kernel=info".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init();
    }
}

fn required_env(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("{} must be set", name).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    info!(version = version, "Starting deck diff");

    let artifact_dir = required_env("DECK_ARTIFACT_DIR")?;
    let extraction_type = required_env("EXTRACTION_TYPE")?;
    let snapshots = required_env("SNAPSHOTS")?;

    let registry = match std::env::var("DECK_PROFILES") {
        Ok(path) if !path.trim().is_empty() => {
            let profiles = load_profiles(path.trim()).map_err(|e| {
                error!(error = %e, "failed to load extraction profiles");
                e
            })?;
            info!(profiles = profiles.len(), "loaded extraction profiles");
            ComparatorRegistry::with_profiles(profiles)
        }
        _ => ComparatorRegistry::with_defaults(),
    };
    info!(
        comparators = registry.len(),
        fingerprint = registry.fingerprint(),
        "comparator registry ready"
    );

    let config = FetchConfig::from_env();
    let fetcher = FileSnapshotFetcher::new(&artifact_dir, config.cache_capacity);
    let service = ComparisonService::new(
        fetcher,
        Arc::new(registry),
        ComparisonPolicy::from_env(),
        config,
    );

    let request = ComparisonRequest::new(
        extraction_type,
        snapshots.split(',').map(str::trim).filter(|s| !s.is_empty()),
    )?;

    let response = service.compare(&request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    let stats = service.pool().fetcher().cache_stats();
    info!(
        cache_len = stats.len,
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        "deck diff finished"
    );

    Ok(())
}
