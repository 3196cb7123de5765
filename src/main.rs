use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hubdl::{
    Downloader, DownloaderBuilder, Lister,
    config::Config,
    downloader::{DownloadReport, ResourceOutcome},
    error::HubdlError,
    lister::DEFAULT_BASE_URL,
    progress::NoopProgress,
};
use reqwest::{Proxy, Url};
use tokio_util::sync::CancellationToken;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod args;
use args::Args;

fn init_tracing() {
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), HubdlError> {
    let args = Args::parse();
    init_tracing();

    let config = Config::load_from_dir(Config::default_dir())?;

    let base_url_str = args
        .base_url
        .or(config.base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let base_url = Url::parse(&base_url_str).map_err(|e| HubdlError::CliError {
        message: format!("Invalid base URL '{base_url_str}': {e}"),
    })?;

    let proxy = match args.proxy.or(config.proxy) {
        Some(proxy_str) => match Proxy::all(&proxy_str) {
            Ok(p) => Some(p),
            Err(e) => {
                return Err(HubdlError::CliError {
                    message: format!("Failed to parse proxy '{}': {}", proxy_str, e),
                });
            }
        },
        None => None,
    };

    let cancellation = CancellationToken::new();
    {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received; saving progress before stopping");
                cancellation.cancel();
            }
        });
    }

    let mut builder = DownloaderBuilder::default();
    builder
        .user_agent(args.user_agent.or(config.user_agent))
        .proxy(proxy)
        .accept_invalid_certs(
            args.accept_invalid_certs || config.accept_invalid_certs.unwrap_or(false),
        )
        .connect_timeout(
            args.connect_timeout
                .or(config.connect_timeout_secs)
                .map(Duration::from_secs_f64),
        )
        .cancellation(cancellation.clone());

    if !args.headers.is_empty() {
        builder.headers(Some(parse_headers(&args.headers)?));
    }

    let downloader: Downloader = builder.build()?;

    let collection = args.collection.trim_end_matches('/').to_string();
    let lister = Lister::new(downloader.http_client()?, base_url);
    let resources = lister.list(&collection).await?;
    if resources.is_empty() {
        return Err(HubdlError::CliError {
            message: format!("No downloadable files found for '{collection}'"),
        });
    }
    tracing::info!("Found {} file(s) in {}", resources.len(), collection);

    let dest_dir = args
        .output
        .or(config.output_dir)
        .unwrap_or_else(|| default_dest_dir(&collection));

    let report = downloader
        .download_all(&resources, &dest_dir, &NoopProgress)
        .await?;

    summarize(&report);
    if cancellation.is_cancelled() {
        tracing::info!("Interrupted; staging files keep their progress, run again to resume");
    }
    if report.entries().len() != resources.len() || !report.fully_satisfied() {
        std::process::exit(1);
    }
    Ok(())
}

/// Downloads land under the collection's namespace segment by default, as a
/// relative directory.
fn default_dest_dir(collection: &str) -> PathBuf {
    let namespace = collection.split('/').next().unwrap_or(collection);
    PathBuf::from(namespace)
}

fn parse_headers(raw: &[String]) -> Result<reqwest::header::HeaderMap, HubdlError> {
    let mut headers_map = reqwest::header::HeaderMap::new();
    for header in raw {
        let Some((key, value)) = header.split_once(':') else {
            return Err(HubdlError::CliError {
                message: format!("Header must be in KEY:VALUE format: '{}'", header),
            });
        };
        let key = key.trim();
        let value = value.trim();
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            HubdlError::CliError {
                message: format!("Invalid header name: '{}'", key),
            }
        })?;
        let header_value =
            reqwest::header::HeaderValue::from_str(value).map_err(|_| HubdlError::CliError {
                message: format!("Invalid header value for '{}': '{}'", key, value),
            })?;
        headers_map.insert(header_name, header_value);
    }
    Ok(headers_map)
}

fn summarize(report: &DownloadReport) {
    let mut completed = 0usize;
    let mut skipped = 0usize;
    let mut incomplete = 0usize;
    let mut failed = 0usize;
    for entry in report.entries() {
        match &entry.outcome {
            ResourceOutcome::Completed => completed += 1,
            ResourceOutcome::SkipExisting => skipped += 1,
            ResourceOutcome::Incomplete { .. } => incomplete += 1,
            ResourceOutcome::FailedAttempt { .. } => failed += 1,
        }
    }
    tracing::info!(
        "{completed} completed, {skipped} already present, {incomplete} incomplete, {failed} failed"
    );
    if incomplete > 0 || failed > 0 {
        tracing::info!("Partial files keep their .part progress; run again to resume");
    }
}
