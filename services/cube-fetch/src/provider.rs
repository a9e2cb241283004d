//! Remote provider wiring.

use async_trait::async_trait;
use chrono::NaiveDate;
use fetcher::{CdsConfig, CdsFetcher, FetchError, RawSlice, RemoteFetcher};
use geo_common::DatasetDescriptor;
use tracing::warn;

/// CDS fetcher whose credentials may be missing.
///
/// Mosaic requests never fetch, so a missing API key only fails the first
/// request that actually needs the provider.
pub struct Provider {
    inner: Result<CdsFetcher, String>,
}

impl Provider {
    pub fn from_env() -> Self {
        let inner = CdsConfig::load()
            .and_then(CdsFetcher::new)
            .map_err(|e| e.to_string());
        if let Err(e) = &inner {
            warn!(error = %e, "CDS fetcher unavailable");
        }
        Self { inner }
    }
}

#[async_trait]
impl RemoteFetcher for Provider {
    async fn fetch_day(&self, dataset: &DatasetDescriptor, day: NaiveDate) -> fetcher::Result<RawSlice> {
        match &self.inner {
            Ok(fetcher) => fetcher.fetch_day(dataset, day).await,
            Err(e) => Err(FetchError::config(e.clone())),
        }
    }
}
