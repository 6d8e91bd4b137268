use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filerelay_contract::{UploadHistoryItem, UploadStatus};
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Maximum number of records retained; the oldest is evicted first.
    pub history_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// A relay attempt as handed to the store. Id and timestamp are assigned on
/// insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpload {
    pub source_reference: String,
    pub filename: String,
    pub webhook_target: String,
    pub status: UploadStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub id: u64,
    pub source_reference: String,
    pub filename: String,
    pub webhook_target: String,
    pub status: UploadStatus,
    pub occurred_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn to_history_item(&self) -> UploadHistoryItem {
        UploadHistoryItem {
            id: self.id,
            file_url: self.source_reference.clone(),
            filename: self.filename.clone(),
            timestamp: self.occurred_at,
            status: self.status,
        }
    }
}

#[async_trait]
pub trait UploadStorage: Send + Sync {
    async fn record(&self, entry: NewUpload) -> Result<UploadRecord>;

    /// Up to `limit` records, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<UploadRecord>>;
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: u64,
    records: VecDeque<UploadRecord>,
}

#[derive(Debug, Clone)]
pub struct MemoryUploadStorage {
    capacity: usize,
    ledger: Arc<RwLock<Ledger>>,
}

impl MemoryUploadStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            capacity: config.history_capacity.max(1),
            ledger: Arc::new(RwLock::new(Ledger {
                next_id: 1,
                records: VecDeque::new(),
            })),
        }
    }

    pub async fn len(&self) -> usize {
        self.ledger.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ledger.read().await.records.is_empty()
    }
}

impl Default for MemoryUploadStorage {
    fn default() -> Self {
        Self::new(&StorageConfig::default())
    }
}

#[async_trait]
impl UploadStorage for MemoryUploadStorage {
    async fn record(&self, entry: NewUpload) -> Result<UploadRecord> {
        let mut ledger = self.ledger.write().await;

        let id = ledger.next_id;
        ledger.next_id += 1;

        let record = UploadRecord {
            id,
            source_reference: entry.source_reference,
            filename: entry.filename,
            webhook_target: entry.webhook_target,
            status: entry.status,
            occurred_at: Utc::now(),
        };

        ledger.records.push_back(record.clone());
        while ledger.records.len() > self.capacity {
            if let Some(evicted) = ledger.records.pop_front() {
                debug!(id = evicted.id, "evicted oldest upload record");
            }
        }

        Ok(record)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<UploadRecord>> {
        let ledger = self.ledger.read().await;
        let mut items: Vec<UploadRecord> = ledger.records.iter().cloned().collect();
        drop(ledger);

        items.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        items.truncate(limit);
        Ok(items)
    }
}
