/// Observes per-resource transfer progress. Purely observational; nothing the
/// reporter does influences control flow.
pub trait ProgressReporter: Send + Sync {
    /// A fetch attempt began. `declared_total` is the size the server
    /// declared for the whole resource, when known.
    fn transfer_started(&self, display_name: &str, declared_total: Option<u64>);

    /// `delta` more bytes were appended to the resource's staging file.
    fn bytes_transferred(&self, display_name: &str, delta: u64);

    /// The attempt ended, successfully or not.
    fn transfer_finished(&self, display_name: &str);
}

/// Reporter that discards every event.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn transfer_started(&self, _display_name: &str, _declared_total: Option<u64>) {}

    fn bytes_transferred(&self, _display_name: &str, _delta: u64) {}

    fn transfer_finished(&self, _display_name: &str) {}
}
