use std::io;
use std::path::{Path, PathBuf};

/// Extension marking a file as a not-yet-complete download. Staging files
/// live next to their final file as `<name>.part`; this naming convention is
/// the cross-run resumption protocol and must stay stable.
pub const STAGING_SUFFIX: &str = "part";

/// On-disk status of a resource's destination, derived once per resource
/// before its fetch. The final file and the staging artifact are mutually
/// exclusive by construction (promotion renames one onto the other), so the
/// final file wins if a stray staging file is also present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFileState {
    /// Neither the final file nor a staging artifact exists.
    Absent,
    /// A staging artifact with this many bytes exists.
    Partial(u64),
    /// The final file exists.
    Complete,
}

pub fn final_path(dest_dir: &Path, display_name: &str) -> PathBuf {
    dest_dir.join(display_name)
}

pub fn staging_path(dest_dir: &Path, display_name: &str) -> PathBuf {
    dest_dir.join(format!("{display_name}.{STAGING_SUFFIX}"))
}

pub async fn inspect(dest_dir: &Path, display_name: &str) -> io::Result<LocalFileState> {
    if tokio::fs::try_exists(final_path(dest_dir, display_name)).await? {
        return Ok(LocalFileState::Complete);
    }
    match tokio::fs::metadata(staging_path(dest_dir, display_name)).await {
        Ok(meta) => Ok(LocalFileState::Partial(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LocalFileState::Absent),
        Err(e) => Err(e),
    }
}
