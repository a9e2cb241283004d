//! Command-line access to datacube datasets.
//!
//! - `get`: return a dataset over an extent and day range, updating the
//!   cache first for time-grid datasets
//! - `retrieve`: only bring a day range of a time-grid dataset into its cache
//! - `accumulate`: running rainfall totals over a day range, on a 500 m
//!   Web Mercator grid unless `--native` is given
//! - `restructure`: write the flood mosaic as a Zarr raster, or terrain as
//!   an int16 GeoTIFF, in the reference system of the extent
//!
//! Results are printed to stdout as a JSON summary; logs go to stderr.

mod commands;
mod provider;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use datacube::CubeConfig;
use geo_common::{parse_day, Extent};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cube-fetch")]
#[command(about = "Retrieve cached rainfall, soil moisture, flood and terrain data")]
struct Args {
    /// YAML configuration file (defaults come from the environment)
    #[arg(short, long, env = "CUBE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the grid stores
    #[arg(long, env = "CUBE_CACHE_ROOT")]
    cache_root: Option<PathBuf>,

    /// Root of the flood mosaic archive
    #[arg(long, env = "CUBE_FLOOD_ROOT")]
    flood_root: Option<PathBuf>,

    /// Root of the terrain tile archive
    #[arg(long, env = "CUBE_DEM_ROOT")]
    dem_root: Option<PathBuf>,

    /// Maximum days fetched concurrently
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Return a dataset over an extent and day range
    Get {
        /// Dataset identifier, e.g. copernicus/predicted_rainfall
        dataset: String,

        /// min_x,min_y,max_x,max_y[,CRS]; CRS defaults to EPSG:4326
        #[arg(long, value_parser = parse_extent, allow_hyphen_values = true)]
        extent: Extent,

        /// First day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,

        /// Last day, inclusive; defaults to the start day
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Fail instead of returning uncached days as no-data
        #[arg(long)]
        strict: bool,
    },

    /// Bring a day range of a time-grid dataset into its cache
    Retrieve {
        /// Dataset identifier, e.g. copernicus/soil_moisture
        dataset: String,

        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,

        #[arg(long, value_parser = parse_date)]
        end: NaiveDate,
    },

    /// Running rainfall totals (mm) over a day range
    Accumulate {
        #[arg(long, value_parser = parse_extent, allow_hyphen_values = true)]
        extent: Extent,

        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,

        #[arg(long, value_parser = parse_date)]
        end: NaiveDate,

        /// Pixel size of the output map in metres
        #[arg(long, default_value_t = datacube::ACCUMULATION_RESOLUTION_M)]
        resolution: f64,

        /// Keep the provider grid instead of reprojecting
        #[arg(long, conflicts_with = "resolution")]
        native: bool,
    },

    /// Write a product over an extent to disk
    Restructure {
        #[arg(value_enum)]
        product: Product,

        #[arg(long, value_parser = parse_extent, allow_hyphen_values = true)]
        extent: Extent,

        /// First day; required for floods, ignored for terrain
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Output Zarr store (flood) or GeoTIFF (dem)
        out: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Product {
    Flood,
    Dem,
}

fn parse_extent(s: &str) -> std::result::Result<Extent, String> {
    Extent::from_arg_str(s).map_err(|e| e.to_string())
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    parse_day(s).map_err(|e| e.to_string())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> Result<CubeConfig> {
    let mut config = match &args.config {
        Some(path) => CubeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CubeConfig::from_env(),
    };
    if let Some(root) = &args.cache_root {
        config.cache_root = root.clone();
    }
    if let Some(root) = &args.flood_root {
        config.flood_root = root.clone();
    }
    if let Some(root) = &args.dem_root {
        config.dem_root = root.clone();
    }
    if let Some(n) = args.max_concurrent {
        config.max_concurrent_days = n;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    let config = load_config(&args)?;
    info!(
        cache_root = %config.cache_root.display(),
        flood_root = %config.flood_root.display(),
        dem_root = %config.dem_root.display(),
        "Starting cube-fetch"
    );

    let output = match args.command {
        Command::Get {
            dataset,
            extent,
            start,
            end,
            strict,
        } => commands::get(config.with_strict(strict), &dataset, &extent, start, end).await?,
        Command::Retrieve {
            dataset,
            start,
            end,
        } => commands::retrieve(config, &dataset, start, end).await?,
        Command::Accumulate {
            extent,
            start,
            end,
            resolution,
            native,
        } => {
            let resolution = (!native).then_some(resolution);
            commands::accumulate(config, &extent, start, end, resolution).await?
        }
        Command::Restructure {
            product,
            extent,
            start,
            end,
            out,
        } => match product {
            Product::Flood => {
                let start = start.context("--start is required for flood products")?;
                commands::restructure_flood(config, &extent, start, end, &out).await?
            }
            Product::Dem => commands::restructure_dem(config, &extent, &out).await?,
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
