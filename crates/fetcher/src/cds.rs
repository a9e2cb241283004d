//! Copernicus Climate Data Store client.
//!
//! A retrieval is a three-step job: submit the request to the process
//! execution endpoint, poll the job until it settles, then stream the
//! result asset into the staging directory. Staged files are reused, so a
//! day is only ever requested once per staging directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use geo_common::DatasetDescriptor;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::config::CdsConfig;
use crate::decode::decode_steps;
use crate::error::{FetchError, Result};
use crate::request::{staged_file_name, DayRequest, TimeStep};
use crate::{RawSlice, RemoteFetcher};

/// Lifecycle of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Accepted,
    Running,
    Successful,
    Failed,
    Rejected,
    Dismissed,
    #[serde(other)]
    Unknown,
}

impl JobState {
    fn is_pending(&self) -> bool {
        matches!(self, Self::Accepted | Self::Running | Self::Unknown)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct JobStatus {
    #[serde(rename = "jobID")]
    job_id: String,
    status: JobState,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: Asset,
}

#[derive(Debug, Deserialize)]
struct Asset {
    value: AssetValue,
}

#[derive(Debug, Deserialize)]
struct AssetValue {
    href: String,
}

/// Error document returned for failed jobs and rejected requests.
#[derive(Debug, Default, Deserialize)]
struct ProblemDetail {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl ProblemDetail {
    fn message(&self) -> String {
        match (&self.title, &self.detail) {
            (Some(title), Some(detail)) => format!("{title}: {detail}"),
            (Some(msg), None) | (None, Some(msg)) => msg.clone(),
            (None, None) => "no details".to_string(),
        }
    }
}

/// Whether a provider message says the data has not been published yet.
fn reports_unavailable(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("not available")
        || message.contains("none of the data you have requested")
        || message.contains("no data")
}

/// [`RemoteFetcher`] backed by the CDS retrieve API.
#[derive(Debug, Clone)]
pub struct CdsFetcher {
    client: Client,
    config: CdsConfig,
    time_step: TimeStep,
}

impl CdsFetcher {
    pub fn new(config: CdsConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            client,
            config,
            time_step: TimeStep::Hourly,
        })
    }

    /// Request a coarser sub-daily sampling than the hourly default.
    pub fn with_time_step(mut self, time_step: TimeStep) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn config(&self) -> &CdsConfig {
        &self.config
    }

    /// Where the provider file for `variable` on `day` is staged.
    pub fn staged_path(&self, variable: &str, day: NaiveDate) -> PathBuf {
        self.config.staging_dir.join(staged_file_name(variable, day))
    }

    /// Ensure the provider file for `day` is staged locally and return its path.
    ///
    /// An existing staged copy is returned without any network call.
    #[instrument(skip(self, dataset), fields(dataset = dataset.id, day = %day))]
    pub async fn stage_day(&self, dataset: &DatasetDescriptor, day: NaiveDate) -> Result<PathBuf> {
        let (product, variable) = provider_names(dataset)?;
        let final_path = self.staged_path(dataset.variable, day);

        if final_path.exists() {
            info!(path = %final_path.display(), "File already staged, skipping download");
            return Ok(final_path);
        }

        if day >= Utc::now().date_naive() {
            return Err(FetchError::Unavailable { day });
        }

        fs::create_dir_all(&self.config.staging_dir).await?;

        let request = DayRequest::new(variable, day, self.time_step);
        let job = self.submit(product, &request, day).await?;
        let href = self.wait_for_result(&job, day).await?;

        let temp_path = final_path.with_extension("grib.partial");
        self.download(&href, &temp_path).await?;

        if fs::rename(&temp_path, &final_path).await.is_err() {
            // rename failed (likely cross-device), fall back to copy+delete
            fs::copy(&temp_path, &final_path).await?;
            fs::remove_file(&temp_path).await?;
        }

        info!(path = %final_path.display(), "Staged provider file");
        Ok(final_path)
    }

    async fn submit(&self, product: &str, request: &DayRequest, day: NaiveDate) -> Result<JobStatus> {
        let url = format!(
            "{}/retrieve/v1/processes/{}/execution",
            self.config.url, product
        );
        debug!(url = %url, "Submitting retrieval job");

        let response = self
            .client
            .post(&url)
            .header("PRIVATE-TOKEN", &self.config.key)
            .json(&request.to_execution_body())
            .send()
            .await?;

        let response = check_status(response, day).await?;
        let job: JobStatus = response.json().await?;
        info!(job_id = %job.job_id, status = ?job.status, "Retrieval job submitted");
        Ok(job)
    }

    /// Poll until the job settles; returns the result asset href.
    async fn wait_for_result(&self, job: &JobStatus, day: NaiveDate) -> Result<String> {
        let job_url = format!("{}/retrieve/v1/jobs/{}", self.config.url, job.job_id);
        let mut state = job.status;
        let mut polls = 0;

        while state.is_pending() {
            polls += 1;
            if polls > self.config.max_polls {
                return Err(FetchError::remote(format!(
                    "job {} still {:?} after {} polls",
                    job.job_id, state, self.config.max_polls
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;

            let response = self
                .client
                .get(&job_url)
                .header("PRIVATE-TOKEN", &self.config.key)
                .send()
                .await?;
            let status: JobStatus = check_status(response, day).await?.json().await?;
            debug!(job_id = %job.job_id, status = ?status.status, polls, "Polled job");
            state = status.status;
        }

        let response = self
            .client
            .get(format!("{job_url}/results"))
            .header("PRIVATE-TOKEN", &self.config.key)
            .send()
            .await?;

        match state {
            JobState::Successful => {
                let results: JobResults = check_status(response, day).await?.json().await?;
                Ok(results.asset.value.href)
            }
            _ => {
                let problem: ProblemDetail = response.json().await.unwrap_or_default();
                let message = problem.message();
                if reports_unavailable(&message) {
                    warn!(job_id = %job.job_id, "Provider reports day as unavailable");
                    Err(FetchError::Unavailable { day })
                } else {
                    Err(FetchError::remote(format!(
                        "job {} {:?}: {message}",
                        job.job_id, state
                    )))
                }
            }
        }
    }

    /// Stream the result asset to `temp_path`.
    async fn download(&self, href: &str, temp_path: &Path) -> Result<()> {
        let response = self.client.get(href).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::remote(format!(
                "download of {href} failed: {}",
                response.status()
            )));
        }

        let mut file = File::create(temp_path).await?;
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        debug!(path = %temp_path.display(), bytes = bytes_written, "Download complete");
        Ok(())
    }
}

#[async_trait]
impl RemoteFetcher for CdsFetcher {
    #[instrument(skip(self, dataset), fields(dataset = dataset.id, day = %day))]
    async fn fetch_day(&self, dataset: &DatasetDescriptor, day: NaiveDate) -> Result<RawSlice> {
        let path = self.stage_day(dataset, day).await?;

        let decoded = tokio::task::spawn_blocking(move || decode_steps(&path))
            .await
            .map_err(|e| FetchError::decode(format!("decode task failed: {e}")))??;

        if let Some(expected) = dataset.native_grid {
            if expected != decoded.grid {
                warn!(?expected, actual = ?decoded.grid, "Provider grid differs from the dataset grid");
            }
        }

        info!(steps = decoded.steps.len(), "Fetched daily slice");
        Ok(RawSlice {
            day,
            variable: dataset.variable.to_string(),
            units: dataset.units.to_string(),
            grid: decoded.grid,
            steps: decoded.steps,
        })
    }
}

fn provider_names(dataset: &DatasetDescriptor) -> Result<(&'static str, &'static str)> {
    match (dataset.provider_product, dataset.provider_variable) {
        (Some(product), Some(variable)) => Ok((product, variable)),
        _ => Err(FetchError::config(format!(
            "dataset {} is not served by a remote provider",
            dataset.id
        ))),
    }
}

/// Map error statuses; 404 and "not available" problems become `Unavailable`.
async fn check_status(response: Response, day: NaiveDate) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let problem: ProblemDetail = response.json().await.unwrap_or_default();
    let message = problem.message();
    if status == StatusCode::NOT_FOUND || reports_unavailable(&message) {
        return Err(FetchError::Unavailable { day });
    }
    Err(FetchError::remote(format!("HTTP {status}: {message}")))
}
