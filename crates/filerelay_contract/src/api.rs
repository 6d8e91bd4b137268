use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LOCAL_SOURCE_PREFIX: &str = "local:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Body of `POST /api/upload`. Fields are optional so that missing values
/// surface as validation messages instead of deserializer errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_url: Option<String>,
    pub webhook_url: Option<String>,
}

/// JSON body of `POST /api/webhook/upload`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUploadRequest {
    pub file_url: Option<String>,
}

/// Envelope returned by every upload endpoint, on success and on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Public view of one relay attempt. The webhook target is deliberately
/// absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadHistoryItem {
    pub id: u64,
    pub file_url: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub status: UploadStatus,
}

pub fn local_source_reference(filename: &str) -> String {
    format!("{LOCAL_SOURCE_PREFIX}{filename}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upload_request_reads_camel_case_fields() {
        let request: UploadRequest = serde_json::from_value(json!({
            "fileUrl": "https://example.com/a.png",
            "webhookUrl": "https://discord.com/api/webhooks/1/x"
        }))
        .expect("deserialize");

        assert_eq!(request.file_url.as_deref(), Some("https://example.com/a.png"));
        assert_eq!(
            request.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/x")
        );
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let request: ApiUploadRequest = serde_json::from_value(json!({})).expect("deserialize");
        assert!(request.file_url.is_none());
    }

    #[test]
    fn history_item_uses_wire_names() {
        let item = UploadHistoryItem {
            id: 7,
            file_url: "local:report.pdf".to_string(),
            filename: "report.pdf".to_string(),
            timestamp: Utc::now(),
            status: UploadStatus::Failed,
        };

        let value = serde_json::to_value(&item).expect("serialize");
        assert_eq!(value["fileUrl"], "local:report.pdf");
        assert_eq!(value["status"], "failed");
        assert!(value.get("webhookUrl").is_none());
    }

    #[test]
    fn local_reference_carries_filename() {
        assert_eq!(local_source_reference("cat.gif"), "local:cat.gif");
    }
}
