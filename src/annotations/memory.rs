//! In-memory [`AnnotationStore`] for tests and local runs.
//!
//! Counts creates and updates so callers can assert how many writes an
//! operation performed, and can be switched into a failing state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;

use super::{AnnotationRecord, AnnotationStore};

pub struct InMemoryAnnotationStore {
    records: RwLock<HashMap<String, AnnotationRecord>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryAnnotationStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn record(&self, name: &str) -> Option<AnnotationRecord> {
        self.records.read().unwrap().get(name).cloned()
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.create_count() + self.update_count()
    }

    /// Makes every subsequent call fail with [`StoreError::Transport`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("store unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryAnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnnotationStore for InMemoryAnnotationStore {
    async fn get(&self, name: &str) -> Result<AnnotationRecord, StoreError> {
        self.check()?;
        self.record(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn create(&self, record: &AnnotationRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.records.write().unwrap();
        if records.contains_key(&record.name) {
            return Err(StoreError::Http {
                status: 409,
                body: format!("record {} already exists", record.name),
            });
        }
        let mut stored = record.clone();
        stored.resource_version = Some("1".to_string());
        records.insert(record.name.clone(), stored);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, record: &AnnotationRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.records.write().unwrap();
        let Some(existing) = records.get_mut(&record.name) else {
            return Err(StoreError::NotFound(record.name.clone()));
        };
        let next_version = existing
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        *existing = record.clone();
        existing.resource_version = Some(next_version.to_string());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
