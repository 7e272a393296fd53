//! Output side: serializing combined feeds and handing the bytes off.
//!
//! - [`rss`] - RSS 2.0 serialization using `quick-xml`
//! - [`Publisher`] - Destination for serialized feeds, keyed by file name
//! - [`DirectoryPublisher`] - Writes feeds into a local directory atomically

pub mod rss;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    /// The file name would escape the publishing root.
    #[error("Invalid feed file name: {0}")]
    InvalidName(String),

    #[error("Failed to write feed file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File name a language's feed is published under: `feed.<language>.rss`.
pub fn feed_file_name(language: &str) -> String {
    format!("feed.{language}.rss")
}

/// Destination for serialized feeds.
///
/// Implementations overwrite an existing file of the same name and decide
/// on their own access policy.
pub trait Publisher {
    /// Stores `bytes` under `file_name` and returns where it ended up.
    fn publish(&self, file_name: &str, bytes: &[u8]) -> Result<String, PublishError>;
}

/// Publishes feeds as files in a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Publisher for DirectoryPublisher {
    fn publish(&self, file_name: &str, bytes: &[u8]) -> Result<String, PublishError> {
        if file_name.is_empty()
            || file_name.starts_with('.')
            || file_name.contains(['/', '\\'])
            || file_name.contains("..")
        {
            return Err(PublishError::InvalidName(file_name.to_string()));
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| PublishError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(file_name);
        write_atomically(&path, bytes)?;

        tracing::info!(file = %file_name, path = %path.display(), "Published feed");
        Ok(path.display().to_string())
    }
}

/// Writes to a temporary sibling, syncs, then renames over `path`, so
/// readers never see a partially written feed.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PublishError> {
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    // SEC-009: Randomized temp filename to prevent TOCTOU race conditions
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));
    let io_err = |source| PublishError::Io {
        path: temp_path.clone(),
        source,
    };

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(io_err)?;

    let written = file.write_all(bytes).and_then(|()| file.sync_all());
    drop(file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_err(e));
    }

    // On Windows, rename fails if destination exists, so remove it first
    #[cfg(windows)]
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(io_err(e));
        }
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(PublishError::Io {
            path: path.to_path_buf(),
            source: e,
        });
    }

    Ok(())
}
