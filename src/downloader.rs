use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use derive_builder::Builder;
use reqwest::{Client, Proxy, Url, header::HeaderMap};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use crate::{error::HubdlError, lister::Resource, progress::ProgressReporter};

mod fetch;
mod report;
mod state;

pub use report::{DownloadReport, ResourceOutcome, ResourceReport};
pub use state::{LocalFileState, STAGING_SUFFIX, final_path, inspect, staging_path};

/// Sequential, resumable downloader for a list of resources.
///
/// Each resource is processed to completion or reported failure before the
/// next one starts; a failing resource never aborts the rest of the run.
#[derive(Builder, Debug)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Downloader {
    /// Custom HTTP headers applied to every request.
    #[builder(default = None)]
    headers: Option<HeaderMap>,
    /// Proxy to route requests through, if any.
    #[builder(default = None)]
    proxy: Option<Proxy>,
    /// User agent for requests. Transport default when unset.
    #[builder(default = None)]
    user_agent: Option<String>,
    #[builder(default = false)]
    accept_invalid_certs: bool,
    #[builder(default = None)]
    connect_timeout: Option<Duration>,
    /// Write-buffer bound for staging files. Throughput/memory tradeoff
    /// only; never affects what ends up on disk.
    #[builder(default = fetch::DEFAULT_CHUNK_CAPACITY)]
    chunk_capacity: usize,
    /// Cooperative cancellation, checked between chunks and between
    /// resources. Whatever was flushed stays on disk and resumes later.
    #[builder(default = CancellationToken::new())]
    cancellation: CancellationToken,
}

impl Downloader {
    /// HTTP client configured per this downloader. The CLI shares it with
    /// the lister so both talk through the same proxy/agent settings.
    pub fn http_client(&self) -> Result<Client, HubdlError> {
        let mut builder = Client::builder();
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.clone());
        }
        if let Some(headers) = &self.headers {
            builder = builder.default_headers(headers.clone());
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder.build()?)
    }

    /// Processes every resource in order, one at a time. Fails up-front on
    /// destination-name collisions; after that, per-resource problems are
    /// confined to their report entry.
    pub async fn download_all<R>(
        &self,
        resources: &[Resource],
        dest_dir: &Path,
        reporter: &R,
    ) -> Result<DownloadReport, HubdlError>
    where
        R: ProgressReporter,
    {
        ensure_distinct_names(resources)?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let client = self.http_client()?;

        let mut report = DownloadReport::default();
        for resource in resources {
            if self.cancellation.is_cancelled() {
                tracing::info!("Cancelled; remaining resources left untouched");
                break;
            }
            let outcome = self
                .process_resource(&client, resource, dest_dir, reporter)
                .await;
            match &outcome {
                ResourceOutcome::FailedAttempt { reason } => {
                    tracing::error!(file = resource.display_name(), "Attempt failed: {reason}");
                }
                outcome => {
                    tracing::info!(file = resource.display_name(), "{outcome}");
                }
            }
            report.record(resource.display_name(), outcome);
        }
        Ok(report)
    }

    /// Runs the per-resource state machine. Errors are converted into
    /// `FailedAttempt` at this boundary so they never cross resources.
    async fn process_resource<R>(
        &self,
        client: &Client,
        resource: &Resource,
        dest_dir: &Path,
        reporter: &R,
    ) -> ResourceOutcome
    where
        R: ProgressReporter,
    {
        let local_state = match state::inspect(dest_dir, resource.display_name()).await {
            Ok(local_state) => local_state,
            Err(e) => {
                return ResourceOutcome::FailedAttempt {
                    reason: format!("inspecting local state: {e}"),
                };
            }
        };
        if local_state == LocalFileState::Complete {
            return ResourceOutcome::SkipExisting;
        }

        let span = info_span!("download", file = %resource.display_name());
        match fetch::fetch_resource(
            client,
            resource,
            dest_dir,
            local_state,
            self.chunk_capacity,
            &self.cancellation,
            reporter,
        )
        .instrument(span)
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => ResourceOutcome::FailedAttempt {
                reason: e.to_string(),
            },
        }
    }
}

impl DownloaderBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.chunk_capacity == Some(0) {
            return Err("chunk_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Rejects lists where two different locators map to one destination name;
/// their staging writes would interleave into one corrupted file. Repeated
/// identical links are fine, the repeat lands on `SkipExisting`.
fn ensure_distinct_names(resources: &[Resource]) -> Result<(), HubdlError> {
    let mut seen: HashMap<&str, &Url> = HashMap::new();
    for resource in resources {
        if let Some(existing) = seen.insert(resource.display_name(), resource.locator())
            && existing != resource.locator()
        {
            return Err(HubdlError::NamingCollision {
                filename: resource.display_name().to_string(),
            });
        }
    }
    Ok(())
}
