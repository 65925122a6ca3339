#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for the venue map viewport engine.
//!
//! ```text
//! venue_map fetch --bbox 45.43,-122.84,45.62,-122.47 [--machine-id 12]
//! venue_map regions
//! venue_map link "https://pinballmap.com/map?location_id=42"
//! venue_map simulate [--bbox ...] <url>...
//! ```
//!
//! Configuration comes from the embedded defaults, the file named by
//! `VENUE_MAP_CONFIG`, and `VENUE_MAP_API_URL`. Logging is controlled by
//! `RUST_LOG`.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use venue_map_api::{HttpLocationApi, LocationApi};
use venue_map_viewport::{
    AppConfig, DeepLinkResolver, HeadlessSurface, Navigator, ViewportSynchronizer,
};
use venue_map_viewport_models::{BoundingBox, Destination, Query, Region};

#[derive(Parser)]
#[command(name = "venue_map", about = "Venue map viewport engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the locations inside a bounding box
    Fetch {
        /// Bounds as `sw_lat,sw_lon,ne_lat,ne_lon`
        #[arg(long, value_parser = parse_bbox)]
        bbox: BoundingBox,
        /// Only locations holding this machine
        #[arg(long)]
        machine_id: Option<u64>,
        /// Only locations of this type
        #[arg(long)]
        location_type_id: Option<u64>,
        /// Only locations run by this operator
        #[arg(long)]
        operator_id: Option<u64>,
        /// Only locations with at least this many machines
        #[arg(long)]
        min_machines: Option<u32>,
    },
    /// List the known regions
    Regions,
    /// Resolve a deep link and print what it would do
    Link {
        /// Deep-link URL
        url: String,
    },
    /// Replay deep links against a headless map and print the final state
    Simulate {
        /// Bounds the map starts at
        #[arg(long, value_parser = parse_bbox)]
        bbox: Option<BoundingBox>,
        /// Deep-link URLs, applied in order
        urls: Vec<String>,
    },
}

/// Navigator that only logs where it was sent.
struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, destination: Destination) {
        log::info!("Navigate to {destination}: {destination:?}");
    }
}

fn parse_bbox(value: &str) -> Result<BoundingBox, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate in {value:?}: {e}"))?;

    let [sw_lat, sw_lon, ne_lat, ne_lon] = parts[..] else {
        return Err(format!(
            "expected 4 comma-separated values, got {}",
            parts.len()
        ));
    };

    BoundingBox::new(sw_lat, sw_lon, ne_lat, ne_lon).map_err(|e| e.to_string())
}

async fn load_regions(api: &dyn LocationApi) -> Vec<Region> {
    match api.regions().await {
        Ok(regions) => regions,
        Err(e) => {
            log::warn!("Could not load regions, region deep links will not resolve: {e}");
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    let api: Arc<dyn LocationApi> = Arc::new(HttpLocationApi::new(&config.api)?);

    match cli.command {
        Commands::Fetch {
            bbox,
            machine_id,
            location_type_id,
            operator_id,
            min_machines,
        } => {
            let query = Query {
                machine_id,
                location_type_id,
                operator_id,
                min_machine_count: min_machines,
                ..Query::default()
            };
            let outcome = api.locations_in_bounds(&bbox, &query).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Regions => {
            let regions = api.regions().await?;
            for region in &regions {
                println!("{:<24} {}", region.name, region.full_name);
            }
            println!("\n{} region(s)", regions.len());
        }
        Commands::Link { url } => {
            let regions = load_regions(api.as_ref()).await;
            let resolver = DeepLinkResolver::new(Arc::clone(&api), regions.into(), &config.sync);
            let resolution = resolver.resolve(&url).await;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
        Commands::Simulate { bbox, urls } => {
            let regions = load_regions(api.as_ref()).await;
            let (handle, task) = ViewportSynchronizer::spawn(
                config.sync,
                api,
                Arc::new(HeadlessSurface::new(bbox)),
                Arc::new(LogNavigator),
                bbox,
            );

            handle.set_regions(regions)?;
            if bbox.is_some() {
                handle.refresh_current_area()?;
            }
            for url in urls {
                handle.open_deep_link(url)?;
            }

            let snapshots = handle.subscribe();
            drop(handle);
            task.await?;

            let snapshot = snapshots.borrow().clone();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
