//! In-memory stores (for tests and local experiments).
//!
//! Thread-safe via `RwLock`. Not persistent — data lost on drop. Every call
//! is counted and individual operations can be made to fail, which is how
//! the partial-failure paths of the file service are exercised.

use super::{BlobStore, MetadataStore, StoreError, StoreResult, ensure_key_safe};
use crate::models::record::{MetadataRecord, RecordFilter};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

/// Per-store call counters and failure switches.
#[derive(Debug, Default)]
pub struct CallLog {
    puts: AtomicUsize,
    gets: AtomicUsize,
    deletes: AtomicUsize,
    other: AtomicUsize,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl CallLog {
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Total number of calls of any kind.
    pub fn total(&self) -> usize {
        self.puts() + self.gets() + self.deletes() + self.other.load(Ordering::SeqCst)
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn record_put(&self) -> StoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected put failure".into()));
        }
        Ok(())
    }

    fn record_delete(&self) -> StoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected delete failure".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<Uuid, MetadataRecord>>,
    pub calls: CallLog,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn put(&self, record: &MetadataRecord) -> StoreResult<()> {
        self.calls.record_put()?;
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&record.id()) {
            return Err(StoreError::Unavailable(format!(
                "record `{}` already exists",
                record.id()
            )));
        }
        records.insert(record.id(), record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<MetadataRecord>> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.calls.record_delete()?;
        self.records.write().map_err(poisoned)?.remove(&id);
        Ok(())
    }

    async fn scan(&self, filter: &RecordFilter) -> StoreResult<Vec<MetadataRecord>> {
        self.calls.other.fetch_add(1, Ordering::SeqCst);
        let mut matched: Vec<MetadataRecord> = self
            .records
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        matched.sort_by_key(|record| std::cmp::Reverse(record.created_at()));
        Ok(matched)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.calls.other.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, (Bytes, String)>>,
    pub calls: CallLog,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .read()
            .map(|b| b.contains_key(key))
            .unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<(Bytes, String)> {
        self.blobs.read().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        self.calls.record_put()?;
        ensure_key_safe(key)?;
        self.blobs
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.calls.record_delete()?;
        self.blobs.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        self.calls.other.fetch_add(1, Ordering::SeqCst);
        Ok(format!("memory://{key}?ttl={}", ttl.as_secs()))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.calls.other.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
