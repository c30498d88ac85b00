//! Annotation overlay: BuildConfig metadata that the CI job format cannot
//! hold, persisted in a side store keyed by BuildConfig name.
//!
//! [`AnnotationStore`] abstracts the record store (Kubernetes ConfigMaps in
//! production, see [`configmap`]; an in-memory map in tests, see
//! [`memory`]). [`AnnotationOverlay`] implements the merge-on-write and
//! overlay-on-read rules on top of it.
//!
//! Writes are not serialized here. Two requests merging into the same record
//! race, and the store's own write semantics decide the result.

pub mod configmap;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

/// Provenance labels stamped on every record this service creates.
pub const PROVENANCE_LABELS: [(&str, &str); 2] = [("project", "fabric8"), ("owner", "jenkinshift")];

/// A stored set of annotations for one BuildConfig.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub name: String,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Store-assigned version of the record, echoed back on update.
    pub resource_version: Option<String>,
    /// The store's native object as last fetched, for stores whose update
    /// replaces the whole object. Fields outside the ones above are written
    /// back unchanged.
    pub stored: Option<serde_json::Value>,
}

impl AnnotationRecord {
    /// A record that has never been stored: provenance labels, no annotations.
    pub fn fresh(name: &str) -> Self {
        Self {
            name: name.to_string(),
            annotations: BTreeMap::new(),
            labels: PROVENANCE_LABELS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            resource_version: None,
            stored: None,
        }
    }
}

/// Record storage scoped to one fixed collection.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Fetches a record. Returns [`StoreError::NotFound`] when absent.
    async fn get(&self, name: &str) -> Result<AnnotationRecord, StoreError>;

    async fn create(&self, record: &AnnotationRecord) -> Result<(), StoreError>;

    async fn update(&self, record: &AnnotationRecord) -> Result<(), StoreError>;
}

/// What [`AnnotationOverlay::merge`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Unchanged,
    Created,
    Updated,
}

#[derive(Clone)]
pub struct AnnotationOverlay {
    store: Arc<dyn AnnotationStore>,
}

impl AnnotationOverlay {
    pub fn new(store: Arc<dyn AnnotationStore>) -> Self {
        Self { store }
    }

    /// Persists `annotations` into the record for `name`.
    ///
    /// Writes only when some key is new or has a different value: a create
    /// when no record exists yet, an update otherwise. An empty mapping
    /// never touches the store.
    pub async fn merge(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<MergeOutcome, StoreError> {
        if annotations.is_empty() {
            return Ok(MergeOutcome::Unchanged);
        }

        let (mut record, exists) = match self.store.get(name).await {
            Ok(record) => (record, true),
            Err(StoreError::NotFound(_)) => (AnnotationRecord::fresh(name), false),
            Err(e) => return Err(e),
        };

        let mut dirty = false;
        for (key, value) in annotations {
            if record.annotations.get(key) != Some(value) {
                record.annotations.insert(key.clone(), value.clone());
                dirty = true;
            }
        }

        match (dirty, exists) {
            (false, _) => Ok(MergeOutcome::Unchanged),
            (true, false) => {
                self.store.create(&record).await?;
                Ok(MergeOutcome::Created)
            }
            (true, true) => {
                self.store.update(&record).await?;
                Ok(MergeOutcome::Updated)
            }
        }
    }

    /// Checks that the store answers, by fetching the record `name`.
    ///
    /// Returns whether the record exists. A missing record still proves the
    /// store is reachable.
    pub async fn probe(&self, name: &str) -> Result<bool, StoreError> {
        match self.store.get(name).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fills keys missing from `annotations` with stored values for `name`.
    ///
    /// Keys already present win over stored ones. A missing record, or a
    /// store failure, leaves the mapping unchanged.
    pub async fn load(&self, name: &str, annotations: &mut BTreeMap<String, String>) {
        match self.store.get(name).await {
            Ok(record) => {
                for (key, value) in record.annotations {
                    annotations.entry(key).or_insert(value);
                }
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                tracing::debug!(name, error = %e, "could not load stored annotations");
            }
        }
    }
}
