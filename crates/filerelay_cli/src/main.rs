mod config;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use filerelay_contract::{ApiUploadRequest, UploadHistoryItem};
use filerelay_gateway::{build_router, AppState, API_KEY_HEADER};
use filerelay_storage::{MemoryUploadStorage, UploadStorage};
use filerelay_transfer::{RelayPipeline, TempStaging};
use filerelay_transport::HttpRelayTransport;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::RuntimeConfig;

const DEFAULT_API_BASE: &str = "http://localhost:5000";

#[derive(Debug, Parser)]
#[command(author, version, about = "Relays files to Discord webhooks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP relay service.
    Serve {
        #[arg(long, default_value = "config/relay.toml")]
        config: PathBuf,
    },
    /// Ask a running service to relay a file URL to its configured webhook.
    Push {
        file_url: String,
        #[arg(long, default_value = "http://localhost:5000/api/webhook/upload")]
        api: String,
        #[arg(long, env = "FILERELAY_API_KEY")]
        api_key: Option<String>,
    },
    /// Print the most recent relay attempts of a running service.
    History {
        #[arg(long, default_value = DEFAULT_API_BASE)]
        api: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn,reqwest=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::Push {
            file_url,
            api,
            api_key,
        } => push(&file_url, &api, api_key.as_deref()).await,
        Command::History { api, limit } => history(&api, limit).await,
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let mut config = RuntimeConfig::load(&config_path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());

    let gateway = config.gateway_config();
    if gateway.discord_webhook_url.is_none() {
        warn!("no server webhook configured: /api/webhook/upload will reject every call");
    }
    if is_exposed(&config.http.bind) && gateway.api_key.is_none() {
        warn!(bind = %config.http.bind, "non-loopback bind without an API key");
    }

    let storage: Arc<dyn UploadStorage> =
        Arc::new(MemoryUploadStorage::new(&config.storage_config()));
    let transport = HttpRelayTransport::new(config.transport_config())
        .context("failed to build outbound HTTP client")?;
    let staging = TempStaging::new(config.scratch_dir());
    info!(scratch_dir = %staging.scratch_dir().display(), "staging directory ready");

    let pipeline = RelayPipeline::new(
        Arc::new(transport),
        storage.clone(),
        staging,
        gateway.max_file_size,
    );
    let app = build_router(AppState::new(gateway, pipeline, storage));

    let socket: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid socket address {}", config.http.bind))?;
    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;

    info!(bind = %config.http.bind, "filerelayd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn push(file_url: &str, api: &str, api_key: Option<&str>) -> Result<()> {
    let client = reqwest::Client::new();
    let mut request = client.post(api).json(&ApiUploadRequest {
        file_url: Some(file_url.to_string()),
    });
    if let Some(key) = api_key {
        request = request.header(API_KEY_HEADER, key);
    }

    println!("Uploading file from {file_url} to Discord...");
    let response = request
        .send()
        .await
        .with_context(|| format!("request to {api} failed"))?;
    let status = response.status();
    let text = response.text().await.context("failed to read response body")?;
    let body: Value = serde_json::from_str(&text)
        .unwrap_or_else(|_| serde_json::json!({ "success": false, "message": text }));
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        bail!("upload failed with status {status}");
    }
    println!("Success! File uploaded to Discord.");
    Ok(())
}

async fn history(api: &str, limit: usize) -> Result<()> {
    let url = format!("{}/api/uploads/recent", api.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .get(&url)
        .query(&[("limit", limit)])
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("history request failed with status {status}");
    }
    let items: Vec<UploadHistoryItem> = response
        .json()
        .await
        .context("invalid history response")?;

    if items.is_empty() {
        println!("no uploads recorded");
    }
    for item in items {
        println!(
            "#{:<5} {:<7} {} {} ({})",
            item.id,
            item.status.as_str(),
            item.timestamp.to_rfc3339(),
            item.filename,
            item.file_url
        );
    }
    Ok(())
}

fn is_exposed(bind: &str) -> bool {
    match bind.parse::<SocketAddr>() {
        Ok(addr) => !addr.ip().is_loopback(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_binds_are_not_exposed() {
        assert!(!is_exposed("127.0.0.1:5000"));
        assert!(!is_exposed("[::1]:5000"));
        assert!(is_exposed("0.0.0.0:5000"));
        assert!(is_exposed("not-an-address"));
    }

    #[test]
    fn serve_reads_shipped_config_by_default() {
        let cli = Cli::try_parse_from(["filerelayd", "serve"]).expect("parse");
        match cli.command {
            Command::Serve { config } => assert_eq!(config, PathBuf::from("config/relay.toml")),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["filerelayd", "serve", "--config", "/etc/relay.toml"])
            .expect("parse");
        match cli.command {
            Command::Serve { config } => assert_eq!(config, PathBuf::from("/etc/relay.toml")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parses_push_defaults() {
        let cli = Cli::try_parse_from(["filerelayd", "push", "https://example.com/a.png"])
            .expect("parse");
        match cli.command {
            Command::Push { file_url, api, .. } => {
                assert_eq!(file_url, "https://example.com/a.png");
                assert_eq!(api, "http://localhost:5000/api/webhook/upload");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
