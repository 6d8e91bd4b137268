pub mod api;
pub mod filename;
pub mod validate;

pub use api::{
    local_source_reference, ApiResponse, ApiUploadRequest, UploadHistoryItem, UploadRequest,
    UploadStatus, LOCAL_SOURCE_PREFIX,
};
pub use filename::{resolve_upload_filename, resolve_url_filename, FALLBACK_FILENAME};
pub use validate::{
    validate_file_url, validate_webhook_url, ValidationError, DISCORD_WEBHOOK_PREFIX,
};
