//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use datacube::{CubeConfig, DataSource, Discover, RainAccumulator};
use geo_common::{DayRange, Extent};
use serde_json::{json, Value};
use tracing::info;

use crate::provider::Provider;

const RAINFALL: &str = "copernicus/predicted_rainfall";

fn registry(config: &CubeConfig) -> Result<Discover> {
    Discover::from_config(config, Arc::new(Provider::from_env()))
        .context("Failed to set up datasets")
}

pub async fn get(
    config: CubeConfig,
    dataset: &str,
    extent: &Extent,
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> Result<Value> {
    let discover = registry(&config)?;

    // Time grids also report what the cache update did.
    if let Ok(source) = discover.time_grid(dataset) {
        let (array, report) = source
            .get_with_report(extent, start, end)
            .await
            .with_context(|| format!("Failed to get {dataset}"))?;
        return Ok(json!({ "array": array.summary(), "update": report }));
    }

    let array = discover
        .get(dataset, extent, start, end)
        .await
        .with_context(|| format!("Failed to get {dataset}"))?;
    Ok(json!({ "array": array.summary() }))
}

pub async fn retrieve(
    config: CubeConfig,
    dataset: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Value> {
    let discover = registry(&config)?;
    let source = discover.time_grid(dataset)?;
    let report = source
        .update(DayRange::new(start, end))
        .await
        .with_context(|| format!("Failed to update cache for {dataset}"))?;
    info!(
        dataset,
        committed = report.committed.len(),
        failed = report.failures.len(),
        "Retrieval finished"
    );
    Ok(json!({
        "dataset": dataset,
        "store": source.store_path(),
        "update": report,
    }))
}

/// Rainfall totals, warped onto a Web Mercator map at `resolution` metres
/// unless `resolution` is `None`.
pub async fn accumulate(
    config: CubeConfig,
    extent: &Extent,
    start: NaiveDate,
    end: NaiveDate,
    resolution: Option<f64>,
) -> Result<Value> {
    let discover = registry(&config)?;
    let rain = discover
        .source(RAINFALL)?
        .get(extent, start, Some(end))
        .await
        .context("Failed to get rainfall")?;
    let total = match resolution {
        Some(resolution) => {
            let warp = RainAccumulator::map_warp().resolution(resolution);
            tokio::task::spawn_blocking(move || RainAccumulator::accumulate_onto(&rain, &warp))
                .await??
        }
        None => RainAccumulator::accumulate(&rain)?,
    };
    Ok(json!({ "array": total.summary() }))
}

pub async fn restructure_flood(
    config: CubeConfig,
    extent: &Extent,
    start: NaiveDate,
    end: Option<NaiveDate>,
    out: &Path,
) -> Result<Value> {
    let discover = registry(&config)?;
    let flood = datacube::restructure_flood(&discover, extent, start, end, out, &config.store)
        .await
        .context("Failed to restructure flood mosaic")?;
    Ok(json!({ "array": flood.summary(), "store": out }))
}

pub async fn restructure_dem(config: CubeConfig, extent: &Extent, out: &Path) -> Result<Value> {
    let discover = registry(&config)?;
    let dem = datacube::restructure_dem(&discover, extent, out)
        .await
        .context("Failed to restructure terrain")?;
    Ok(json!({ "array": dem.summary(), "file": out }))
}
