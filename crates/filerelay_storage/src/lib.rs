pub mod repository;

pub use repository::{
    MemoryUploadStorage, NewUpload, StorageConfig, UploadRecord, UploadStorage,
    DEFAULT_HISTORY_CAPACITY, DEFAULT_RECENT_LIMIT,
};
