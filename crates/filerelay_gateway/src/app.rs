use std::io;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::JsonRejection, DefaultBodyLimit, FromRequest, Multipart, Query, Request, State,
    },
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use filerelay_contract::{
    validate_file_url, validate_webhook_url, ApiResponse, ApiUploadRequest, UploadHistoryItem,
    UploadRequest, ValidationError, DISCORD_WEBHOOK_PREFIX, FALLBACK_FILENAME,
};
use filerelay_storage::{UploadStorage, DEFAULT_RECENT_LIMIT};
use filerelay_transfer::{RelayPipeline, RelayRequest, RelayRoute, RelaySource, DEFAULT_MAX_FILE_SIZE};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::StreamReader;
use tracing::info;
use url::Url;

use crate::error::GatewayError;

pub const API_KEY_HEADER: &str = "x-api-key";

const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub discord_webhook_url: Option<String>,
    pub api_key: Option<String>,
    pub webhook_prefix: String,
    pub max_file_size: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: None,
            api_key: None,
            webhook_prefix: DISCORD_WEBHOOK_PREFIX.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub pipeline: Arc<RelayPipeline>,
    pub storage: Arc<dyn UploadStorage>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        pipeline: RelayPipeline,
        storage: Arc<dyn UploadStorage>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            storage,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health/live", get(health_live))
        .route("/api/upload", post(post_upload))
        .route("/api/webhook/upload", post(post_webhook_upload))
        .route("/api/uploads/recent", get(get_recent_uploads))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn post_upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, GatewayError> {
    let Json(payload) = payload.map_err(|rejection| GatewayError::InvalidInput(rejection.body_text()))?;

    let file_url = payload
        .file_url
        .as_deref()
        .ok_or(ValidationError::Missing { field: "fileUrl" })?;
    let file_url = validate_file_url(file_url)?;
    let webhook = payload
        .webhook_url
        .as_deref()
        .ok_or(ValidationError::Missing {
            field: "webhookUrl",
        })?;
    let webhook = validate_webhook_url(webhook, &state.config.webhook_prefix)?;

    info!(file_url = %file_url, "relaying file to caller-supplied webhook");
    state
        .pipeline
        .relay(RelayRequest {
            source: RelaySource::RemoteUrl(file_url),
            webhook,
            route: RelayRoute::CallerWebhook,
        })
        .await?;

    Ok(Json(ApiResponse::ok("File uploaded successfully")))
}

async fn post_webhook_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
) -> Result<Json<ApiResponse>, GatewayError> {
    authorize(&state.config, &headers)?;
    let webhook = configured_webhook(&state.config)?;

    let (source, route) = if is_multipart(&headers) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|rejection| GatewayError::InvalidInput(rejection.body_text()))?;
        read_multipart(&state, multipart).await?
    } else {
        let Json(payload) = Json::<ApiUploadRequest>::from_request(request, &state)
            .await
            .map_err(|rejection| GatewayError::InvalidInput(rejection.body_text()))?;
        let raw = payload.file_url.ok_or_else(missing_source)?;
        (
            RelaySource::RemoteUrl(validate_file_url(&raw)?),
            RelayRoute::ConfiguredWebhook,
        )
    };

    info!(route = ?route, "relaying file to configured webhook");
    state
        .pipeline
        .relay(RelayRequest {
            source,
            webhook,
            route,
        })
        .await?;

    Ok(Json(ApiResponse::ok("File uploaded successfully to Discord")))
}

/// Streams the `file` field into staging; a `fileUrl` text field is the
/// fallback when no file is attached.
async fn read_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(RelaySource, RelayRoute), GatewayError> {
    let mut file_url: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| GatewayError::InvalidInput(error.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let declared_name = field
                    .file_name()
                    .map(str::to_owned)
                    .filter(|name| !name.trim().is_empty());
                let hint = declared_name
                    .clone()
                    .unwrap_or_else(|| FALLBACK_FILENAME.to_string());

                let body = field.map_err(io::Error::other);
                let reader = StreamReader::new(Box::pin(body));
                let file = state
                    .pipeline
                    .staging()
                    .stage(&hint, reader, state.pipeline.max_file_size())
                    .await?;

                return Ok((
                    RelaySource::Staged {
                        file,
                        declared_name,
                    },
                    RelayRoute::DirectUpload,
                ));
            }
            Some("fileUrl") => {
                let text = field
                    .text()
                    .await
                    .map_err(|error| GatewayError::InvalidInput(error.body_text()))?;
                file_url = Some(text);
            }
            _ => {}
        }
    }

    let raw = file_url.ok_or_else(missing_source)?;
    Ok((
        RelaySource::RemoteUrl(validate_file_url(&raw)?),
        RelayRoute::ConfiguredWebhook,
    ))
}

async fn get_recent_uploads(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<UploadHistoryItem>>, GatewayError> {
    let limit = query
        .limit
        .as_deref()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_RECENT_LIMIT);

    let records = state
        .storage
        .recent(limit)
        .await
        .map_err(GatewayError::History)?;
    Ok(Json(
        records.iter().map(|record| record.to_history_item()).collect(),
    ))
}

fn authorize(config: &GatewayConfig, headers: &HeaderMap) -> Result<(), GatewayError> {
    let Some(expected) = config.api_key.as_deref().filter(|key| !key.is_empty()) else {
        return Ok(());
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized)
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn configured_webhook(config: &GatewayConfig) -> Result<Url, GatewayError> {
    let raw = config
        .discord_webhook_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .ok_or(GatewayError::ServerConfig)?;
    validate_webhook_url(raw, &config.webhook_prefix).map_err(|_| GatewayError::ServerConfig)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

fn missing_source() -> GatewayError {
    GatewayError::InvalidInput("Either fileUrl or a file upload is required".to_string())
}
