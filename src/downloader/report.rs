use std::fmt;

/// Terminal state of one resource within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    /// Staging length matched the declared size; the file was promoted to
    /// its final name.
    Completed,
    /// The final file already existed; no request was made.
    SkipExisting,
    /// The stream ended but the byte count could not be verified against a
    /// declared size. The staging file is left in place and a later run
    /// resumes from it.
    Incomplete {
        received: u64,
        expected: Option<u64>,
    },
    /// A transport-level failure aborted the attempt. Bytes flushed before
    /// the failure remain in the staging file.
    FailedAttempt { reason: String },
}

impl ResourceOutcome {
    /// Whether the resource needs no further work.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Completed | Self::SkipExisting)
    }
}

impl fmt::Display for ResourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::SkipExisting => write!(f, "already exists, skipped"),
            Self::Incomplete {
                received,
                expected: Some(expected),
            } => write!(f, "incomplete ({received} of {expected} bytes), run again to resume"),
            Self::Incomplete {
                received,
                expected: None,
            } => write!(f, "incomplete ({received} bytes, total size unknown)"),
            Self::FailedAttempt { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReport {
    pub display_name: String,
    pub outcome: ResourceOutcome,
}

/// Result of one `download_all` run, one entry per processed resource in
/// processing order.
#[derive(Debug, Default)]
pub struct DownloadReport {
    entries: Vec<ResourceReport>,
}

impl DownloadReport {
    pub(crate) fn record(&mut self, display_name: &str, outcome: ResourceOutcome) {
        self.entries.push(ResourceReport {
            display_name: display_name.to_string(),
            outcome,
        });
    }

    pub fn entries(&self) -> &[ResourceReport] {
        &self.entries
    }

    /// True when every processed resource ended `Completed` or
    /// `SkipExisting`.
    pub fn fully_satisfied(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_satisfied())
    }
}
