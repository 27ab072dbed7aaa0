//! On-disk image persistence.
//!
//! Images land at `{root}/{source name}/{sanitized marker}.jpg`.  The marker
//! text doubles as the filename, so identical markers overwrite each other
//! rather than accumulating numbered copies.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

/// Extension given to every saved snapshot.
const IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
    #[error("source name '{0}' is not a single directory name")]
    InvalidSourceName(String),
}

/// Whether `name` can be used as a directory directly under the output root.
///
/// Rejects separators, `.`/`..`, absolute paths and the empty string.
pub fn is_valid_source_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Replace every character outside `[A-Za-z0-9]` with `_`.
///
/// Works per `char`, so a multi-byte character becomes a single underscore.
pub fn sanitize_marker(marker: &str) -> String {
    marker
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Filename a snapshot with the given marker is saved under.
pub fn image_file_name(marker: &str) -> String {
    format!("{}.{IMAGE_EXTENSION}", sanitize_marker(marker))
}

/// Writes snapshots beneath a fixed output root.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every snapshot of `source_name`.
    pub fn source_dir(&self, source_name: &str) -> PathBuf {
        self.root.join(source_name)
    }

    /// Final path for a snapshot of `source_name` carrying `marker`.
    pub fn image_path(&self, source_name: &str, marker: &str) -> PathBuf {
        self.source_dir(source_name).join(image_file_name(marker))
    }

    /// Persist `bytes` for `source_name`, creating its directory if needed.
    ///
    /// Returns the path written.  An existing file with the same name is
    /// overwritten.
    pub async fn save(
        &self,
        source_name: &str,
        marker: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StoreError> {
        if !is_valid_source_name(source_name) {
            return Err(StoreError::InvalidSourceName(source_name.to_string()));
        }

        let dir = self.source_dir(source_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::CreateDir(dir.display().to_string(), e))?;

        let path = self.image_path(source_name, marker);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::Write(path.display().to_string(), e))?;

        debug!(path = %path.display(), bytes = bytes.len(), "wrote image");
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
