use std::path::Path;

use reqwest::{
    Client,
    header::{HeaderValue, RANGE},
};
use tokio::{
    fs::OpenOptions,
    io::{AsyncWriteExt, BufWriter},
};
use tokio_util::sync::CancellationToken;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::{
    downloader::report::ResourceOutcome,
    downloader::state::{self, LocalFileState},
    error::HubdlError,
    lister::Resource,
    progress::ProgressReporter,
    response_info::ResponseInfo,
};

/// Write-buffer bound for the staging file. A throughput/memory tradeoff
/// only; correctness must never depend on it.
pub(crate) const DEFAULT_CHUNK_CAPACITY: usize = 1024 * 1024; // 1 MiB

/// State of a single fetch attempt. The staging file handle is released when
/// this is dropped, whichever way the attempt ends.
struct TransferSession {
    declared_total: Option<u64>,
    received: u64,
    writer: BufWriter<tokio::fs::File>,
}

impl TransferSession {
    async fn append(&mut self, chunk: &[u8]) -> Result<(), HubdlError> {
        self.writer.write_all(chunk).await?;
        self.received += chunk.len() as u64;
        Ok(())
    }
}

/// Runs one fetch attempt for a resource: opens the staging file according
/// to the observed local state, requests the missing byte range, streams the
/// body into the staging file and decides between promotion and leaving the
/// staging file for a later run.
///
/// Transport errors bubble up with everything received so far flushed to the
/// staging file; the caller converts them into a `FailedAttempt` for this
/// resource only.
pub(crate) async fn fetch_resource<R>(
    client: &Client,
    resource: &Resource,
    dest_dir: &Path,
    local_state: LocalFileState,
    chunk_capacity: usize,
    cancellation: &CancellationToken,
    reporter: &R,
) -> Result<ResourceOutcome, HubdlError>
where
    R: ProgressReporter,
{
    let staging = state::staging_path(dest_dir, resource.display_name());

    let resume_from = match local_state {
        LocalFileState::Complete => return Ok(ResourceOutcome::SkipExisting),
        LocalFileState::Partial(len) => len,
        LocalFileState::Absent => 0,
    };

    let mut req = client.get(resource.locator().clone());
    if matches!(local_state, LocalFileState::Partial(_)) {
        // Resume exactly where the staging file ends. Servers that ignore
        // the range reply 200 with the full body; the appended result then
        // fails the size check below and stays Incomplete.
        let range = format!("bytes={resume_from}-");
        req = req.header(
            RANGE,
            HeaderValue::from_str(&range).map_err(|e| HubdlError::Other {
                message: "Internal error: invalid range header".to_string(),
                origin: Box::new(e),
            })?,
        );
    }

    let mut resp = req.send().await?;
    let info = ResponseInfo::from_response(&resp);
    if !info.is_successful() {
        return Err(HubdlError::ResponseStatusNotSuccess {
            status_code: resp.status().to_string(),
        });
    }
    let declared_total = info.declared_total(resume_from);

    // Staging only opens once the server has answered; a refused request
    // leaves the on-disk state untouched.
    let file = match local_state {
        LocalFileState::Partial(_) => OpenOptions::new().append(true).open(&staging).await?,
        _ => {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&staging)
                .await?
        }
    };

    let span = Span::current();
    if let Some(total) = declared_total {
        span.pb_set_length(total);
        span.pb_set_position(resume_from);
    }
    reporter.transfer_started(resource.display_name(), declared_total);

    let mut session = TransferSession {
        declared_total,
        received: resume_from,
        writer: BufWriter::with_capacity(chunk_capacity, file),
    };

    loop {
        let maybe_chunk = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                session.writer.flush().await?;
                reporter.transfer_finished(resource.display_name());
                return Ok(ResourceOutcome::Incomplete {
                    received: session.received,
                    expected: session.declared_total,
                });
            }
            chunk = resp.chunk() => match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Preserve whatever made it to disk; the staging file
                    // stays resumable.
                    session.writer.flush().await?;
                    reporter.transfer_finished(resource.display_name());
                    return Err(HubdlError::from(e));
                }
            },
        };
        let Some(chunk) = maybe_chunk else { break };
        session.append(&chunk).await?;
        span.pb_inc(chunk.len() as u64);
        reporter.bytes_transferred(resource.display_name(), chunk.len() as u64);
    }

    session.writer.flush().await?;
    reporter.transfer_finished(resource.display_name());

    match session.declared_total {
        Some(total) if total > 0 && session.received == total => {
            // Same-directory rename; the final name only ever holds a
            // complete file.
            tokio::fs::rename(&staging, state::final_path(dest_dir, resource.display_name()))
                .await?;
            Ok(ResourceOutcome::Completed)
        }
        expected => Ok(ResourceOutcome::Incomplete {
            received: session.received,
            expected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use mockito::{Matcher, Server};
    use reqwest::Url;
    use tempfile::tempdir;
    use tokio::fs;

    use super::*;
    use crate::progress::NoopProgress;

    fn resource_at(base: &str, path: &str) -> Resource {
        Resource::new(Url::parse(&format!("{base}{path}")).unwrap())
    }

    fn test_content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[derive(Default)]
    struct RecordingProgress {
        started: Mutex<Vec<(String, Option<u64>)>>,
        deltas: Mutex<Vec<(String, u64)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn transfer_started(&self, display_name: &str, declared_total: Option<u64>) {
            self.started
                .lock()
                .unwrap()
                .push((display_name.to_string(), declared_total));
        }

        fn bytes_transferred(&self, display_name: &str, delta: u64) {
            self.deltas
                .lock()
                .unwrap()
                .push((display_name.to_string(), delta));
        }

        fn transfer_finished(&self, _display_name: &str) {}
    }

    #[tokio::test]
    async fn test_full_download_promotes_staging_file() -> Result<(), Box<dyn std::error::Error>> {
        let content = test_content(512);
        let mut server = Server::new_async().await;
        let get_mock = server
            .mock("GET", "/config.json")
            .match_header("range", Matcher::Missing)
            .with_status(200)
            .with_body(&content)
            .create_async()
            .await;

        let dir = tempdir()?;
        let resource = resource_at(&server.url(), "/config.json");
        let reporter = RecordingProgress::default();

        let outcome = fetch_resource(
            &Client::new(),
            &resource,
            dir.path(),
            LocalFileState::Absent,
            DEFAULT_CHUNK_CAPACITY,
            &CancellationToken::new(),
            &reporter,
        )
        .await?;

        assert_eq!(outcome, ResourceOutcome::Completed);
        assert_eq!(fs::read(dir.path().join("config.json")).await?, content);
        assert!(!fs::try_exists(dir.path().join("config.json.part")).await?);

        let started = reporter.started.lock().unwrap();
        assert_eq!(started.as_slice(), &[("config.json".to_string(), Some(512))]);
        let total: u64 = reporter.deltas.lock().unwrap().iter().map(|(_, d)| d).sum();
        assert_eq!(total, 512);
        get_mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_requests_only_missing_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let content = test_content(2000);
        let mut server = Server::new_async().await;
        let get_mock = server
            .mock("GET", "/weights.bin")
            .match_header("range", Matcher::Exact("bytes=800-".into()))
            .with_status(206)
            .with_header("content-range", "bytes 800-1999/2000")
            .with_body(&content[800..])
            .create_async()
            .await;

        let dir = tempdir()?;
        fs::write(dir.path().join("weights.bin.part"), &content[..800]).await?;
        let resource = resource_at(&server.url(), "/weights.bin");

        let local_state = state::inspect(dir.path(), "weights.bin").await?;
        assert_eq!(local_state, LocalFileState::Partial(800));

        let outcome = fetch_resource(
            &Client::new(),
            &resource,
            dir.path(),
            local_state,
            DEFAULT_CHUNK_CAPACITY,
            &CancellationToken::new(),
            &NoopProgress,
        )
        .await?;

        assert_eq!(outcome, ResourceOutcome::Completed);
        assert_eq!(fs::read(dir.path().join("weights.bin")).await?, content);
        assert!(!fs::try_exists(dir.path().join("weights.bin.part")).await?);
        get_mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_total_derived_from_content_length()
    -> Result<(), Box<dyn std::error::Error>> {
        // No Content-Range in the reply; the declared total is the remaining
        // length plus the resume offset.
        let content = test_content(1000);
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/weights.bin")
            .match_header("range", Matcher::Exact("bytes=400-".into()))
            .with_status(206)
            .with_body(&content[400..])
            .create_async()
            .await;

        let dir = tempdir()?;
        fs::write(dir.path().join("weights.bin.part"), &content[..400]).await?;
        let resource = resource_at(&server.url(), "/weights.bin");

        let outcome = fetch_resource(
            &Client::new(),
            &resource,
            dir.path(),
            LocalFileState::Partial(400),
            DEFAULT_CHUNK_CAPACITY,
            &CancellationToken::new(),
            &NoopProgress,
        )
        .await?;

        assert_eq!(outcome, ResourceOutcome::Completed);
        assert_eq!(fs::read(dir.path().join("weights.bin")).await?, content);
        Ok(())
    }

    #[tokio::test]
    async fn test_short_body_leaves_staging_file() -> Result<(), Box<dyn std::error::Error>> {
        // Server declares 2000 bytes total but the stream ends after 800.
        let content = test_content(800);
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/weights.bin")
            .with_status(206)
            .with_header("content-range", "bytes 0-799/2000")
            .with_body(&content)
            .create_async()
            .await;

        let dir = tempdir()?;
        let resource = resource_at(&server.url(), "/weights.bin");

        let outcome = fetch_resource(
            &Client::new(),
            &resource,
            dir.path(),
            LocalFileState::Absent,
            DEFAULT_CHUNK_CAPACITY,
            &CancellationToken::new(),
            &NoopProgress,
        )
        .await?;

        assert_eq!(
            outcome,
            ResourceOutcome::Incomplete {
                received: 800,
                expected: Some(2000),
            }
        );
        assert_eq!(
            fs::read(dir.path().join("weights.bin.part")).await?,
            content
        );
        assert!(!fs::try_exists(dir.path().join("weights.bin")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_size_stays_incomplete() -> Result<(), Box<dyn std::error::Error>> {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/stream.bin")
            .with_status(200)
            .with_chunked_body(|w| w.write_all(b"payload"))
            .create_async()
            .await;

        let dir = tempdir()?;
        let resource = resource_at(&server.url(), "/stream.bin");

        let outcome = fetch_resource(
            &Client::new(),
            &resource,
            dir.path(),
            LocalFileState::Absent,
            DEFAULT_CHUNK_CAPACITY,
            &CancellationToken::new(),
            &NoopProgress,
        )
        .await?;

        // A clean EOF without a declared size cannot be verified, so the
        // bytes stay in staging even though the transfer finished.
        assert_eq!(
            outcome,
            ResourceOutcome::Incomplete {
                received: 7,
                expected: None,
            }
        );
        assert_eq!(
            fs::read(dir.path().join("stream.bin.part")).await?,
            b"payload"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_error_status_preserves_staging_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/weights.bin")
            .with_status(416)
            .create_async()
            .await;

        let dir = tempdir()?;
        fs::write(dir.path().join("weights.bin.part"), b"progress").await?;
        let resource = resource_at(&server.url(), "/weights.bin");

        let result = fetch_resource(
            &Client::new(),
            &resource,
            dir.path(),
            LocalFileState::Partial(8),
            DEFAULT_CHUNK_CAPACITY,
            &CancellationToken::new(),
            &NoopProgress,
        )
        .await;

        assert!(matches!(
            result,
            Err(HubdlError::ResponseStatusNotSuccess { .. })
        ));
        assert_eq!(
            fs::read(dir.path().join("weights.bin.part")).await?,
            b"progress"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let content = test_content(512);
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/weights.bin")
            .with_status(200)
            .with_body(&content)
            .create_async()
            .await;

        let dir = tempdir()?;
        let resource = resource_at(&server.url(), "/weights.bin");
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let outcome = fetch_resource(
            &Client::new(),
            &resource,
            dir.path(),
            LocalFileState::Absent,
            DEFAULT_CHUNK_CAPACITY,
            &cancellation,
            &NoopProgress,
        )
        .await?;

        assert_eq!(
            outcome,
            ResourceOutcome::Incomplete {
                received: 0,
                expected: Some(512),
            }
        );
        assert!(!fs::try_exists(dir.path().join("weights.bin")).await?);
        Ok(())
    }
}
