use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

pub const STAGING_PREFIX: &str = "discord-upload";

const MAX_NAME_LEN: usize = 96;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("File exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("failed to stage file: {0}")]
    Io(#[from] io::Error),
}

/// Scratch directory that hands out collision-free file paths.
#[derive(Debug, Clone)]
pub struct TempStaging {
    scratch_dir: PathBuf,
}

impl TempStaging {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Creates an empty staged file and returns the guard together with a
    /// write handle to it.
    pub async fn allocate(&self, filename: &str) -> io::Result<(StagedFile, File)> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let name = format!(
            "{STAGING_PREFIX}-{}-{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::now_v7().simple(),
            sanitize_filename(filename)
        );
        let path = self.scratch_dir.join(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        debug!(path = %path.display(), "staged file allocated");
        Ok((StagedFile::new(path), file))
    }

    /// Copies `reader` into a new staged file, rejecting sources larger than
    /// `max_bytes`. Nothing is left on disk when staging fails.
    pub async fn stage<R>(
        &self,
        filename: &str,
        reader: R,
        max_bytes: u64,
    ) -> Result<StagedFile, StagingError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let (staged, mut file) = self.allocate(filename).await?;
        let mut limited = reader.take(max_bytes.saturating_add(1));

        let copied = tokio::io::copy(&mut limited, &mut file).await;
        let flushed = match copied {
            Ok(written) if written > max_bytes => Err(StagingError::TooLarge { limit: max_bytes }),
            Ok(_) => file.flush().await.map_err(StagingError::from),
            Err(error) => Err(error.into()),
        };
        drop(file);

        match flushed {
            Ok(()) => Ok(staged),
            Err(error) => {
                staged.release().await;
                Err(error)
            }
        }
    }
}

/// A file in the scratch directory that is removed exactly once: by
/// [`StagedFile::release`], or on drop if release was never reached.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort removal. Failures are logged and swallowed.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "staged file released"),
            Err(error) => {
                debug!(path = %self.path.display(), error = %error, "staged file already gone")
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}
