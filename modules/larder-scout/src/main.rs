use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use larder_common::{Config, Region};
use larder_scout::discovery::{Discoverer, DiscoveryConfig, WebSearchDiscovery};
use larder_scout::enrichment::{EnrichmentWorker, PlacesVerifier, WorkerConfig};
use larder_scout::suspicion;
use larder_store::{PgStore, ResourceStore, SearchCacheStore};
use places_client::PlacesClient;

#[derive(Parser)]
#[command(name = "larder-scout")]
#[command(about = "Food resource discovery and enrichment pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover resources for a region (one of --zip / --county)
    Discover {
        /// Narrow search: a single zip code, verified inline
        #[arg(long, conflicts_with = "county")]
        zip: Option<String>,

        /// Wide search: a county name, persisted pending enrichment
        #[arg(long, requires = "state")]
        county: Option<String>,

        /// Two-letter state for --county
        #[arg(long)]
        state: Option<String>,
    },

    /// Run the background enrichment worker until interrupted
    Worker,

    /// Show enrichment queue counts
    Status,

    /// List suspicious records in a region, highest score first
    Triage {
        /// Region key, e.g. "zip-55407" or "county-mn-washington"
        #[arg(long)]
        region: String,

        /// Only show records at or above this score
        #[arg(long, default_value_t = 50)]
        min_score: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("larder=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env();
    config.log_redacted();

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    match cli.command {
        Commands::Discover { zip, county, state } => {
            let region = match (zip, county, state) {
                (Some(zip), None, _) => Region::Zip(zip),
                (None, Some(name), Some(state)) => Region::County { name, state },
                _ => anyhow::bail!("Provide either --zip or --county with --state"),
            };
            discover(&config, store, &region).await
        }
        Commands::Worker => worker(&config, store).await,
        Commands::Status => status(&config, store).await,
        Commands::Triage { region, min_score } => triage(store, &region, min_score).await,
    }
}

async fn discover(config: &Config, store: PgStore, region: &Region) -> Result<()> {
    info!(region = %region.key(), wide = region.is_wide(), "Starting discovery");

    let store = Arc::new(store);
    let verifier = PlacesVerifier::new(PlacesClient::new(config.places_api_key.clone()));
    let discoverer = Discoverer::new(
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        store as Arc<dyn SearchCacheStore>,
        Arc::new(WebSearchDiscovery::new(config.search_api_key.clone())),
        Arc::new(verifier),
        DiscoveryConfig::from_config(config),
    );

    let outcome = discoverer.discover(region).await?;
    if outcome.cached {
        println!("Served from cache: {} resources", outcome.total());
    } else {
        println!("Discovery complete: {} resources ({})", outcome.total(), outcome.stats);
    }
    for (category, resources) in &outcome.resources {
        println!("  {category}: {}", resources.len());
    }
    Ok(())
}

async fn worker(config: &Config, store: PgStore) -> Result<()> {
    let verifier = PlacesVerifier::new(PlacesClient::new(config.places_api_key.clone()));
    let (worker, handle) = EnrichmentWorker::new(
        Arc::new(store),
        Arc::new(verifier),
        WorkerConfig::from_config(config),
    );
    let stats = worker.stats();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            handle.stop();
        }
    });

    worker.run().await;

    let (verified, retried, permanently_failed, config_errors) = stats.snapshot();
    println!(
        "Worker stopped: {verified} verified, {retried} retried, \
         {permanently_failed} permanently failed, {config_errors} config errors"
    );
    Ok(())
}

async fn status(config: &Config, store: PgStore) -> Result<()> {
    let counts = store.enrichment_counts(config.max_attempts).await?;
    println!("Enrichment queue:");
    println!("  pending first attempt: {}", counts.pending);
    println!("  retryable:             {}", counts.retryable);
    println!("  permanently failed:    {}", counts.permanently_failed);
    Ok(())
}

async fn triage(store: PgStore, region_key: &str, min_score: u8) -> Result<()> {
    let resources = store.for_region(region_key).await?;
    let mut scored: Vec<_> = resources
        .iter()
        .map(|r| (suspicion::score(r), r))
        .filter(|(report, _)| report.score >= min_score)
        .collect();
    scored.sort_by(|a, b| b.0.score.cmp(&a.0.score));

    if scored.is_empty() {
        println!("No records at or above score {min_score} in {region_key}");
        return Ok(());
    }

    println!("{} suspicious records in {region_key}:", scored.len());
    for (report, resource) in scored {
        println!(
            "  [{:>3}] {} ({}): {}",
            report.score,
            resource.name,
            report.category.as_str(),
            report.reasons.join("; ")
        );
    }
    Ok(())
}
