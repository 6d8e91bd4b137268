use thiserror::Error;
use url::Url;

pub const DISCORD_WEBHOOK_PREFIX: &str = "https://discord.com/api/webhooks/";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("Please provide a valid URL")]
    InvalidFileUrl,
    #[error("Please provide a valid webhook URL")]
    InvalidWebhookUrl,
    #[error("Please provide a valid Discord webhook URL")]
    NotDiscordWebhook,
}

pub fn validate_file_url(raw: &str) -> Result<Url, ValidationError> {
    parse_http_url(raw).ok_or(ValidationError::InvalidFileUrl)
}

/// Accepts only URLs that begin with `prefix`, compared against the raw
/// input so that normalisation cannot smuggle a different host through.
pub fn validate_webhook_url(raw: &str, prefix: &str) -> Result<Url, ValidationError> {
    let url = parse_http_url(raw).ok_or(ValidationError::InvalidWebhookUrl)?;
    if !raw.trim().starts_with(prefix) {
        return Err(ValidationError::NotDiscordWebhook);
    }
    Ok(url)
}

fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Some(url),
        _ => None,
    }
}
