use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(120);

const FILE_FIELD: &str = "file";
const CAPTION_FIELD: &str = "content";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to fetch file: {0}")]
    SourceUnreachable(#[source] reqwest::Error),
    #[error("Failed to fetch file: {reason}")]
    SourceStatus { status: u16, reason: String },
    #[error("File exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("I/O error during transfer: {0}")]
    Io(#[from] std::io::Error),
    #[error("Discord webhook unreachable: {0}")]
    WebhookUnreachable(#[source] reqwest::Error),
    #[error("Discord webhook error: {detail}")]
    WebhookRejected { status: u16, detail: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl TransportError {
    /// Errors caused by the file source rather than the relay or the
    /// destination.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            Self::SourceUnreachable(_) | Self::SourceStatus { .. } | Self::TooLarge { .. }
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WebhookUpload<'a> {
    pub path: &'a Path,
    pub filename: &'a str,
    pub caption: &'a str,
}

#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Streams the body at `url` into `sink`, returning the byte count.
    async fn fetch(
        &self,
        url: &Url,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        max_bytes: u64,
    ) -> Result<u64, TransportError>;

    /// Posts the staged file and caption to the webhook as a multipart form.
    async fn deliver(&self, webhook: &Url, upload: WebhookUpload<'_>) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub fetch_timeout: Duration,
    pub webhook_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRelayTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpRelayTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("filerelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl RelayTransport for HttpRelayTransport {
    async fn fetch(
        &self,
        url: &Url,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        max_bytes: u64,
    ) -> Result<u64, TransportError> {
        info!(file_url = %url, "fetching source file");
        let response = self
            .client
            .get(url.clone())
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .map_err(TransportError::SourceUnreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::SourceStatus {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .map(str::to_owned)
                    .unwrap_or_else(|| status.as_str().to_owned()),
            });
        }

        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(TransportError::TooLarge { limit: max_bytes });
        }

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(TransportError::SourceUnreachable)?;
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(TransportError::TooLarge { limit: max_bytes });
            }
            sink.write_all(&chunk).await?;
        }
        sink.flush().await?;

        debug!(file_url = %url, bytes = written, "source file streamed");
        Ok(written)
    }

    async fn deliver(&self, webhook: &Url, upload: WebhookUpload<'_>) -> Result<(), TransportError> {
        let file = tokio::fs::File::open(upload.path).await?;
        let length = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length).file_name(upload.filename.to_owned());
        let form = Form::new()
            .part(FILE_FIELD, part)
            .text(CAPTION_FIELD, upload.caption.to_owned());

        info!(filename = %upload.filename, bytes = length, "sending file to Discord webhook");
        let response = self
            .client
            .post(webhook.clone())
            .timeout(self.config.webhook_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::WebhookUnreachable)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let detail = if text.trim().is_empty() {
            status.to_string()
        } else {
            text
        };
        Err(TransportError::WebhookRejected {
            status: status.as_u16(),
            detail,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredFile {
    pub webhook: String,
    pub filename: String,
    pub caption: String,
    pub bytes: Vec<u8>,
    pub staged_path: PathBuf,
}

#[derive(Debug, Clone)]
enum CannedSource {
    Body(Vec<u8>),
    Status(u16),
}

/// Serves canned source bodies and captures deliveries without touching the
/// network.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRelayTransport {
    sources: HashMap<String, CannedSource>,
    webhook_rejection: Option<(u16, String)>,
    delivery_delay: Option<Duration>,
    deliveries: Arc<Mutex<Vec<DeliveredFile>>>,
}

impl InMemoryRelayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.sources
            .insert(url.to_owned(), CannedSource::Body(body.into()));
        self
    }

    pub fn with_source_status(mut self, url: &str, status: u16) -> Self {
        self.sources
            .insert(url.to_owned(), CannedSource::Status(status));
        self
    }

    pub fn rejecting_webhook(mut self, status: u16, detail: &str) -> Self {
        self.webhook_rejection = Some((status, detail.to_owned()));
        self
    }

    /// Holds every delivery for `delay` before it completes.
    pub fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = Some(delay);
        self
    }

    pub fn deliveries(&self) -> Vec<DeliveredFile> {
        self.deliveries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelayTransport for InMemoryRelayTransport {
    async fn fetch(
        &self,
        url: &Url,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        max_bytes: u64,
    ) -> Result<u64, TransportError> {
        match self.sources.get(url.as_str()) {
            Some(CannedSource::Body(body)) => {
                if body.len() as u64 > max_bytes {
                    return Err(TransportError::TooLarge { limit: max_bytes });
                }
                sink.write_all(body).await?;
                sink.flush().await?;
                Ok(body.len() as u64)
            }
            Some(CannedSource::Status(status)) => Err(TransportError::SourceStatus {
                status: *status,
                reason: format!("status {status}"),
            }),
            None => Err(TransportError::SourceStatus {
                status: 404,
                reason: "Not Found".to_owned(),
            }),
        }
    }

    async fn deliver(&self, webhook: &Url, upload: WebhookUpload<'_>) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(upload.path).await?;
        if let Some(delay) = self.delivery_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, detail)) = &self.webhook_rejection {
            return Err(TransportError::WebhookRejected {
                status: *status,
                detail: detail.clone(),
            });
        }

        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.push(DeliveredFile {
                webhook: webhook.to_string(),
                filename: upload.filename.to_owned(),
                caption: upload.caption.to_owned(),
                bytes,
                staged_path: upload.path.to_path_buf(),
            });
        }
        Ok(())
    }
}
