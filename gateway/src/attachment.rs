//! Downloads transport media to a local staging area with TTL-based cleanup (§4.F).

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;

const DEFAULT_TTL_HOURS: u64 = 24;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const CONTAINER_PREFIX: &str = "/a0/tmp/uploads";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttachmentError {
    #[error("create staging dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("write staged file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Owns the staging directory attachments are downloaded/saved into, and a periodic cleanup
/// task that evicts files past their TTL.
pub struct AttachmentHandler {
    staging_dir: PathBuf,
    client: reqwest::Client,
    cleanup_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AttachmentHandler {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Result<Self, AttachmentError> {
        let staging_dir = staging_dir.into();
        std::fs::create_dir_all(&staging_dir).map_err(|source| AttachmentError::CreateDir {
            path: staging_dir.clone(),
            source,
        })?;
        Ok(Self {
            staging_dir,
            client: reqwest::Client::new(),
            cleanup_task: tokio::sync::Mutex::new(None),
        })
    }

    /// Filesystem path the file was written to, translated to the container-internal path when
    /// `DOCKER_CONTAINER=1` is set in the environment (§4.F).
    fn external_path(&self, filename: &str) -> String {
        if std::env::var("DOCKER_CONTAINER").as_deref() == Ok("1") {
            format!("{CONTAINER_PREFIX}/{filename}")
        } else {
            self.staging_dir.join(filename).to_string_lossy().into_owned()
        }
    }

    fn extension_for(original_filename: Option<&str>, url: Option<&str>) -> String {
        let from_name = original_filename.and_then(|n| Path::new(n).extension());
        let from_url = url.and_then(|u| {
            let path = u.split(['?', '#']).next().unwrap_or(u);
            Path::new(path).extension()
        });
        from_name
            .or(from_url)
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_else(|| ".bin".to_string())
    }

    async fn write_atomic(&self, filename: &str, bytes: &[u8]) -> Result<String, AttachmentError> {
        let final_path = self.staging_dir.join(filename);
        let part_path = self.staging_dir.join(format!("{filename}.part"));
        let mut file = tokio::fs::File::create(&part_path)
            .await
            .map_err(|source| AttachmentError::Write {
                path: part_path.clone(),
                source,
            })?;
        file.write_all(bytes)
            .await
            .map_err(|source| AttachmentError::Write {
                path: part_path.clone(),
                source,
            })?;
        file.flush().await.map_err(|source| AttachmentError::Write {
            path: part_path.clone(),
            source,
        })?;
        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|source| AttachmentError::Write {
                path: final_path.clone(),
                source,
            })?;
        Ok(self.external_path(filename))
    }

    /// Downloads `url` with the given timeout and stages it under a fresh `<uuid><ext>` name.
    /// Returns the local (or container-internal) path.
    pub async fn download_from_url(
        &self,
        url: &str,
        original_filename: Option<&str>,
        timeout_secs: u64,
    ) -> Result<String, AttachmentError> {
        let ext = Self::extension_for(original_filename, Some(url));
        let filename = format!("{}{}", uuid::Uuid::new_v4(), ext);

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| AttachmentError::Download {
                url: url.to_string(),
                source,
            })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| AttachmentError::Download {
                url: url.to_string(),
                source,
            })?;

        self.write_atomic(&filename, &bytes).await
    }

    /// Stages raw bytes without a network round-trip.
    pub async fn save_from_bytes(&self, bytes: &[u8], filename: &str) -> Result<String, AttachmentError> {
        let ext = Self::extension_for(Some(filename), None);
        let staged_name = format!("{}{}", uuid::Uuid::new_v4(), ext);
        let _ = filename;
        self.write_atomic(&staged_name, bytes).await
    }

    /// Best-effort unlink; failures are logged and swallowed.
    pub async fn cleanup_file(&self, path: &str) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            tracing::debug!(path, error = %err, "attachment cleanup: file already gone or unremovable");
        }
    }

    /// Spawns the hourly sweep that unlinks staged files older than `ttl_hours`. Idempotent:
    /// calling it again replaces the previous task.
    pub async fn start_cleanup_task(self: &std::sync::Arc<Self>, ttl_hours: Option<u64>) {
        let ttl = Duration::from_secs(ttl_hours.unwrap_or(DEFAULT_TTL_HOURS) * 3600);
        let dir = self.staging_dir.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                sweep_expired(&dir, ttl).await;
            }
        });
        *self.cleanup_task.lock().await = Some(handle);
    }

    pub async fn stop_cleanup_task(&self) {
        if let Some(handle) = self.cleanup_task.lock().await.take() {
            handle.abort();
        }
    }
}

async fn sweep_expired(dir: &Path, ttl: Duration) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "attachment sweep: cannot read staging dir");
            return;
        }
    };
    let now = std::time::SystemTime::now();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if now.duration_since(modified).unwrap_or_default() > ttl {
            let _ = tokio::fs::remove_file(entry.path()).await;
        }
    }
}
