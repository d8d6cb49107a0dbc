use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::ddb::model::OrchestrationRecord;

#[derive(Debug, thiserror::Error)]
pub enum InstanceStoreError {
    #[error("Instance not found: {0}")]
    NotFound(String),
    #[error("Instance already exists: {0}")]
    AlreadyExists(String),
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serde JSON error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Persistence for orchestration records, keyed by instance id.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn create(&self, record: &OrchestrationRecord) -> Result<(), InstanceStoreError>;
    async fn update(&self, record: &OrchestrationRecord) -> Result<(), InstanceStoreError>;
    async fn get(&self, id: &str) -> Result<Option<OrchestrationRecord>, InstanceStoreError>;
}

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// In-process record store. Completed and failed records are dropped once they have been
/// terminal for longer than `retention`; the sweep runs on every `create`.
pub struct MemoryInstanceStore {
    records: RwLock<HashMap<String, OrchestrationRecord>>,
    retention: Duration,
}

impl Default for MemoryInstanceStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn is_expired(record: &OrchestrationRecord, cutoff: DateTime<Utc>) -> bool {
        if !record.status.is_terminal() {
            return false;
        }
        match DateTime::parse_from_rfc3339(&record.updated_at) {
            Ok(updated_at) => updated_at.with_timezone(&Utc) < cutoff,
            Err(_) => false,
        }
    }

    fn evict_expired(&self, records: &mut HashMap<String, OrchestrationRecord>) {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return;
        };
        let cutoff = Utc::now() - retention;
        let before = records.len();
        records.retain(|_, record| !Self::is_expired(record, cutoff));
        let evicted = before - records.len();
        if evicted > 0 {
            log::debug!("Evicted {} finished orchestration records", evicted);
        }
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn create(&self, record: &OrchestrationRecord) -> Result<(), InstanceStoreError> {
        let mut records = self.records.write().await;
        self.evict_expired(&mut records);
        if records.contains_key(&record.id) {
            return Err(InstanceStoreError::AlreadyExists(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &OrchestrationRecord) -> Result<(), InstanceStoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(InstanceStoreError::NotFound(record.id.clone())),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<OrchestrationRecord>, InstanceStoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }
}
