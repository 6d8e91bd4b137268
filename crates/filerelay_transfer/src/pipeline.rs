use std::path::Path;
use std::sync::Arc;

use filerelay_contract::{
    local_source_reference, resolve_upload_filename, resolve_url_filename, UploadStatus,
};
use filerelay_storage::{NewUpload, UploadRecord, UploadStorage};
use filerelay_transport::{RelayTransport, TransportError, WebhookUpload};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use url::Url;

use crate::staging::{StagedFile, TempStaging};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to stage file: {0}")]
    Staging(#[source] std::io::Error),
    #[error("relay task did not complete: {0}")]
    Interrupted(#[source] JoinError),
}

impl RelayError {
    pub fn is_source_failure(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_source_failure(),
            Self::Staging(_) | Self::Interrupted(_) => false,
        }
    }
}

/// How the relay was requested. Only affects the caption posted alongside
/// the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayRoute {
    CallerWebhook,
    ConfiguredWebhook,
    DirectUpload,
}

impl RelayRoute {
    pub fn caption(self, filename: &str) -> String {
        match self {
            Self::CallerWebhook => format!("Uploaded file: {filename}"),
            Self::ConfiguredWebhook => format!("Uploaded file: {filename} (via API)"),
            Self::DirectUpload => format!("Uploaded file: {filename} (direct upload)"),
        }
    }
}

#[derive(Debug)]
pub enum RelaySource {
    RemoteUrl(Url),
    /// Bytes already staged by the inbound transport.
    Staged {
        file: StagedFile,
        declared_name: Option<String>,
    },
}

impl RelaySource {
    fn filename(&self) -> String {
        match self {
            Self::RemoteUrl(url) => resolve_url_filename(url.as_str()),
            Self::Staged {
                file,
                declared_name,
            } => resolve_upload_filename(declared_name.as_deref(), file.path()),
        }
    }

    fn reference(&self, filename: &str) -> String {
        match self {
            Self::RemoteUrl(url) => url.to_string(),
            Self::Staged { .. } => local_source_reference(filename),
        }
    }
}

#[derive(Debug)]
pub struct RelayRequest {
    pub source: RelaySource,
    pub webhook: Url,
    pub route: RelayRoute,
}

#[derive(Debug, Clone)]
pub struct RelaySummary {
    pub filename: String,
    /// `None` only when the history store itself failed.
    pub record: Option<UploadRecord>,
}

#[derive(Clone)]
pub struct RelayPipeline {
    transport: Arc<dyn RelayTransport>,
    storage: Arc<dyn UploadStorage>,
    staging: TempStaging,
    max_file_size: u64,
}

impl RelayPipeline {
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        storage: Arc<dyn UploadStorage>,
        staging: TempStaging,
        max_file_size: u64,
    ) -> Self {
        Self {
            transport,
            storage,
            staging,
            max_file_size,
        }
    }

    pub fn staging(&self) -> &TempStaging {
        &self.staging
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Moves one file to the webhook. Every call appends exactly one history
    /// record and leaves no staged file behind, whatever the outcome.
    ///
    /// The transfer runs on its own task, so dropping the returned future
    /// (a client disconnect, a timeout) does not abandon it half way.
    pub async fn relay(&self, request: RelayRequest) -> Result<RelaySummary, RelayError> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run(request).await })
            .await
            .map_err(RelayError::Interrupted)?
    }

    async fn run(&self, request: RelayRequest) -> Result<RelaySummary, RelayError> {
        let RelayRequest {
            source,
            webhook,
            route,
        } = request;
        let filename = source.filename();
        let source_reference = source.reference(&filename);

        let result = match source {
            RelaySource::RemoteUrl(url) => self.relay_remote(&url, &filename, &webhook, route).await,
            RelaySource::Staged { file, .. } => {
                let delivered = self.deliver(file.path(), &filename, &webhook, route).await;
                file.release().await;
                delivered
            }
        };

        let status = if result.is_ok() {
            UploadStatus::Success
        } else {
            UploadStatus::Failed
        };
        let record = self
            .record_attempt(NewUpload {
                source_reference: source_reference.clone(),
                filename: filename.clone(),
                webhook_target: webhook.to_string(),
                status,
            })
            .await;

        match result {
            Ok(()) => {
                info!(source = %source_reference, filename = %filename, "relay completed");
                Ok(RelaySummary { filename, record })
            }
            Err(error) => {
                warn!(source = %source_reference, filename = %filename, error = %error, "relay failed");
                Err(error)
            }
        }
    }

    async fn relay_remote(
        &self,
        url: &Url,
        filename: &str,
        webhook: &Url,
        route: RelayRoute,
    ) -> Result<(), RelayError> {
        let (staged, mut handle) = self
            .staging
            .allocate(filename)
            .await
            .map_err(RelayError::Staging)?;

        let fetched = self
            .transport
            .fetch(url, &mut handle, self.max_file_size)
            .await;
        drop(handle);

        let result = match fetched {
            Ok(_) => self.deliver(staged.path(), filename, webhook, route).await,
            Err(error) => Err(error.into()),
        };
        staged.release().await;
        result
    }

    async fn deliver(
        &self,
        path: &Path,
        filename: &str,
        webhook: &Url,
        route: RelayRoute,
    ) -> Result<(), RelayError> {
        let caption = route.caption(filename);
        self.transport
            .deliver(
                webhook,
                WebhookUpload {
                    path,
                    filename,
                    caption: &caption,
                },
            )
            .await?;
        Ok(())
    }

    async fn record_attempt(&self, entry: NewUpload) -> Option<UploadRecord> {
        match self.storage.record(entry).await {
            Ok(record) => Some(record),
            Err(error) => {
                error!(error = %error, "failed to record upload attempt");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filerelay_storage::MemoryUploadStorage;
    use filerelay_transport::InMemoryRelayTransport;
    use std::time::Duration;
    use tempfile::TempDir;

    const WEBHOOK: &str = "https://discord.com/api/webhooks/123/abc";

    struct Harness {
        _dir: TempDir,
        scratch: std::path::PathBuf,
        transport: InMemoryRelayTransport,
        storage: Arc<MemoryUploadStorage>,
        pipeline: RelayPipeline,
    }

    fn harness(transport: InMemoryRelayTransport, max_file_size: u64) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let scratch = dir.path().join("scratch");
        let storage = Arc::new(MemoryUploadStorage::default());
        let pipeline = RelayPipeline::new(
            Arc::new(transport.clone()),
            storage.clone(),
            TempStaging::new(&scratch),
            max_file_size,
        );
        Harness {
            _dir: dir,
            scratch,
            transport,
            storage,
            pipeline,
        }
    }

    fn remote(url: &str, route: RelayRoute) -> RelayRequest {
        RelayRequest {
            source: RelaySource::RemoteUrl(Url::parse(url).expect("url")),
            webhook: Url::parse(WEBHOOK).expect("webhook"),
            route,
        }
    }

    fn scratch_is_empty(harness: &Harness) -> bool {
        std::fs::read_dir(&harness.scratch)
            .map(|mut it| it.next().is_none())
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn remote_success_delivers_and_records() {
        let h = harness(
            InMemoryRelayTransport::new().with_source("https://example.com/a.png", b"png-bytes".to_vec()),
            1024,
        );

        let summary = h
            .pipeline
            .relay(remote("https://example.com/a.png", RelayRoute::CallerWebhook))
            .await
            .expect("relay");
        assert_eq!(summary.filename, "a.png");

        let deliveries = h.transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].bytes, b"png-bytes".to_vec());
        assert_eq!(deliveries[0].caption, "Uploaded file: a.png");
        assert_eq!(deliveries[0].webhook, WEBHOOK);
        assert!(!deliveries[0].staged_path.exists());

        let records = h.storage.recent(10).await.expect("recent");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UploadStatus::Success);
        assert_eq!(records[0].filename, "a.png");
        assert_eq!(records[0].source_reference, "https://example.com/a.png");
        assert_eq!(records[0].webhook_target, WEBHOOK);
        assert!(scratch_is_empty(&h));
    }

    #[tokio::test]
    async fn source_failure_records_one_failed_attempt() {
        let h = harness(
            InMemoryRelayTransport::new().with_source_status("https://example.com/gone.png", 404),
            1024,
        );

        let err = h
            .pipeline
            .relay(remote("https://example.com/gone.png", RelayRoute::ConfiguredWebhook))
            .await
            .expect_err("404");
        assert!(err.is_source_failure());
        assert!(h.transport.deliveries().is_empty());

        let records = h.storage.recent(10).await.expect("recent");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UploadStatus::Failed);
        assert!(scratch_is_empty(&h));
    }

    #[tokio::test]
    async fn webhook_rejection_is_not_a_source_failure() {
        let h = harness(
            InMemoryRelayTransport::new()
                .with_source("https://example.com/a.png", b"x".to_vec())
                .rejecting_webhook(400, "Unknown Webhook"),
            1024,
        );

        let err = h
            .pipeline
            .relay(remote("https://example.com/a.png", RelayRoute::CallerWebhook))
            .await
            .expect_err("rejected");
        assert!(!err.is_source_failure());
        assert_eq!(err.to_string(), "Discord webhook error: Unknown Webhook");

        let records = h.storage.recent(10).await.expect("recent");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UploadStatus::Failed);
        assert!(scratch_is_empty(&h));
    }

    #[tokio::test]
    async fn oversized_source_fails_and_cleans_up() {
        let h = harness(
            InMemoryRelayTransport::new().with_source("https://example.com/big.bin", vec![0u8; 64]),
            16,
        );

        let err = h
            .pipeline
            .relay(remote("https://example.com/big.bin", RelayRoute::CallerWebhook))
            .await
            .expect_err("too large");
        assert!(err.is_source_failure());
        assert_eq!(h.storage.recent(10).await.expect("recent").len(), 1);
        assert!(scratch_is_empty(&h));
    }

    #[tokio::test]
    async fn staged_upload_uses_local_reference() {
        let h = harness(InMemoryRelayTransport::new(), 1024);
        let staged = h
            .pipeline
            .staging()
            .stage("report.pdf", &b"%PDF"[..], 1024)
            .await
            .expect("stage");
        let staged_path = staged.path().to_path_buf();

        let summary = h
            .pipeline
            .relay(RelayRequest {
                source: RelaySource::Staged {
                    file: staged,
                    declared_name: Some("report.pdf".to_string()),
                },
                webhook: Url::parse(WEBHOOK).expect("webhook"),
                route: RelayRoute::DirectUpload,
            })
            .await
            .expect("relay");

        assert_eq!(summary.filename, "report.pdf");
        let record = summary.record.expect("record");
        assert_eq!(record.source_reference, "local:report.pdf");
        assert_eq!(
            h.transport.deliveries()[0].caption,
            "Uploaded file: report.pdf (direct upload)"
        );
        assert!(!staged_path.exists());
    }

    #[tokio::test]
    async fn rejected_staged_upload_is_removed_and_recorded() {
        let h = harness(
            InMemoryRelayTransport::new().rejecting_webhook(404, "Unknown Webhook"),
            1024,
        );
        let staged = h
            .pipeline
            .staging()
            .stage("notes.txt", &b"hello"[..], 1024)
            .await
            .expect("stage");
        let staged_path = staged.path().to_path_buf();
        assert!(staged_path.exists());

        let err = h
            .pipeline
            .relay(RelayRequest {
                source: RelaySource::Staged {
                    file: staged,
                    declared_name: Some("notes.txt".to_string()),
                },
                webhook: Url::parse(WEBHOOK).expect("webhook"),
                route: RelayRoute::DirectUpload,
            })
            .await
            .expect_err("rejected");
        assert!(!err.is_source_failure());
        assert!(!staged_path.exists());

        let records = h.storage.recent(10).await.expect("recent");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UploadStatus::Failed);
        assert_eq!(records[0].source_reference, "local:notes.txt");
        assert!(scratch_is_empty(&h));
    }

    #[tokio::test]
    async fn dropped_caller_does_not_abandon_relay() {
        let h = harness(
            InMemoryRelayTransport::new()
                .with_source("https://example.com/slow.bin", b"slow".to_vec())
                .with_delivery_delay(Duration::from_millis(200)),
            1024,
        );

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            h.pipeline
                .relay(remote("https://example.com/slow.bin", RelayRoute::CallerWebhook)),
        )
        .await;
        assert!(outcome.is_err(), "relay should still be in flight");
        assert!(h.storage.is_empty().await);

        let mut records = Vec::new();
        for _ in 0..100 {
            records = h.storage.recent(10).await.expect("recent");
            if !records.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, UploadStatus::Success);
        assert_eq!(h.transport.deliveries().len(), 1);
        assert!(scratch_is_empty(&h));
    }

    #[tokio::test]
    async fn each_relay_appends_exactly_one_record() {
        let h = harness(
            InMemoryRelayTransport::new().with_source("https://example.com/ok.txt", b"ok".to_vec()),
            1024,
        );

        for url in [
            "https://example.com/ok.txt",
            "https://example.com/missing.txt",
            "https://example.com/ok.txt",
        ] {
            let _ = h.pipeline.relay(remote(url, RelayRoute::ConfiguredWebhook)).await;
        }

        let records = h.storage.recent(10).await.expect("recent");
        let statuses: Vec<UploadStatus> = records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![UploadStatus::Success, UploadStatus::Failed, UploadStatus::Success]
        );
    }

    #[test]
    fn captions_name_the_route() {
        assert_eq!(RelayRoute::CallerWebhook.caption("a.png"), "Uploaded file: a.png");
        assert_eq!(
            RelayRoute::ConfiguredWebhook.caption("a.png"),
            "Uploaded file: a.png (via API)"
        );
    }
}
