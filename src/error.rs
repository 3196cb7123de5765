use std::error::Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubdlError {
    #[error("Collection identifier is empty")]
    EmptyCollection,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connection timeout")]
    ConnectionTimeout,
    #[error("Response body error")]
    ResponseBodyError,
    #[error("Response status not success: {status_code:?}")]
    ResponseStatusNotSuccess { status_code: String },
    #[error("Invalid URL: {message:?}")]
    InvalidUrl { message: String },
    #[error("Failed to retrieve index document at {url}: {source}")]
    Retrieval {
        url: String,
        source: Box<HubdlError>,
    },
    /// Two resources in one collection resolve to the same destination file
    /// name while pointing at different locations. Their staging files would
    /// collide, so the whole run is refused before any fetch begins.
    #[error("Resources with different locations map to the same file name: {filename:?}")]
    NamingCollision { filename: String },
    #[error("Standard I/O error: {e}")]
    StdIoError { e: std::io::Error },
    #[error("CLI argument error: {message:?}")]
    CliError { message: String },
    #[error("Other error: {message:?}")]
    Other {
        message: String,
        origin: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<reqwest::Error> for HubdlError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if !status.is_success() => {
                return Self::ResponseStatusNotSuccess {
                    status_code: status.to_string(),
                };
            }
            _ => {}
        }

        match e.source().and_then(|s| s.downcast_ref::<std::io::Error>()) {
            Some(io_err) if io_err.kind() == std::io::ErrorKind::TimedOut => {
                return Self::ConnectionTimeout;
            }
            _ => {}
        }

        match e.is_timeout() {
            true => Self::ConnectionTimeout,
            false if e.is_body() => Self::ResponseBodyError,
            false if e.is_connect() => Self::ConnectionClosed,
            _ => Self::Other {
                message: e.to_string(),
                origin: Box::new(e),
            },
        }
    }
}

impl From<std::io::Error> for HubdlError {
    fn from(e: std::io::Error) -> Self {
        Self::StdIoError { e }
    }
}

impl From<crate::downloader::DownloaderBuilderError> for HubdlError {
    fn from(e: crate::downloader::DownloaderBuilderError) -> Self {
        Self::Other {
            message: e.to_string(),
            origin: Box::new(e),
        }
    }
}
