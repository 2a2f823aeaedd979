//! In-process storage
//!
//! Collections of features held in memory, with optional latency and
//! failure injection so slow or broken layers can be reproduced.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;

use crate::view::{
    FeatureId, FeatureRow, LayerQuery, LayerSession, ReadFilter, SessionError, SessionFactory,
    SessionFuture,
    ViewLayer, ViewOperation,
};

type Collections = HashMap<String, BTreeMap<FeatureId, FeatureRow>>;

#[derive(Debug, Clone, Default)]
struct Faults {
    latency: Duration,
    failure: Option<String>,
}

/// Feature storage held in memory
#[derive(Debug)]
pub struct MemoryStorage {
    name: String,
    collections: RwLock<Collections>,
    faults: RwLock<Faults>,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
            faults: RwLock::new(Faults::default()),
        }
    }

    /// Build a storage from collection name -> features
    pub fn from_collections(
        name: impl Into<String>,
        collections: BTreeMap<String, Vec<FeatureRow>>,
    ) -> Self {
        let storage = Self::new(name);
        {
            let mut data = storage.collections.write().unwrap_or_else(|e| e.into_inner());
            for (collection, rows) in collections {
                let entry = data.entry(collection).or_default();
                for row in rows {
                    entry.insert(row.id.clone(), row);
                }
            }
        }
        storage
    }

    /// Add rows to `collection`, creating it when absent
    pub fn with_features(
        self,
        collection: &str,
        rows: impl IntoIterator<Item = FeatureRow>,
    ) -> Self {
        {
            let mut data = self.collections.write().unwrap_or_else(|e| e.into_inner());
            let entry = data.entry(collection.to_string()).or_default();
            for row in rows {
                entry.insert(row.id.clone(), row);
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of features in a collection, if it exists
    pub fn count(&self, collection: &str) -> Option<usize> {
        let data = self.collections.read().ok()?;
        data.get(collection).map(|c| c.len())
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<FeatureRow> {
        let data = self.collections.read().ok()?;
        data.get(collection).and_then(|c| c.get(id)).cloned()
    }

    /// Copy of every collection, rows in id order
    pub fn to_collections(&self) -> BTreeMap<String, Vec<FeatureRow>> {
        let data = self.collections.read().unwrap_or_else(|e| e.into_inner());
        data.iter()
            .map(|(name, rows)| (name.clone(), rows.values().cloned().collect()))
            .collect()
    }

    /// Delay every subsequent statement by `latency`
    pub fn inject_latency(&self, latency: Duration) {
        let mut faults = self.faults.write().unwrap_or_else(|e| e.into_inner());
        faults.latency = latency;
    }

    /// Fail every subsequent statement with `message`; `None` clears it
    pub fn inject_failure(&self, message: Option<&str>) {
        let mut faults = self.faults.write().unwrap_or_else(|e| e.into_inner());
        faults.failure = message.map(str::to_string);
    }

    fn faults(&self) -> Faults {
        self.faults.read().map(|f| f.clone()).unwrap_or_default()
    }

    fn apply(&self, query: &LayerQuery) -> Result<Vec<FeatureRow>, SessionError> {
        match &query.operation {
            ViewOperation::Read(filter) => self.read(&query.collection, filter),
            ViewOperation::Write { features } => self.write(&query.collection, features),
        }
    }

    fn read(&self, collection: &str, filter: &ReadFilter) -> Result<Vec<FeatureRow>, SessionError> {
        let data = self.collections.read().map_err(|e| SessionError::storage(e.to_string()))?;
        let rows = data
            .get(collection)
            .ok_or_else(|| SessionError::CollectionNotFound(collection.to_string()))?;

        let selected = rows.values().filter(|row| filter.accepts(row)).cloned();
        Ok(match filter.limit {
            Some(limit) => selected.take(limit).collect(),
            None => selected.collect(),
        })
    }

    fn write(
        &self,
        collection: &str,
        features: &[FeatureRow],
    ) -> Result<Vec<FeatureRow>, SessionError> {
        let mut data = self.collections.write().map_err(|e| SessionError::storage(e.to_string()))?;
        let rows = data
            .get_mut(collection)
            .ok_or_else(|| SessionError::CollectionNotFound(collection.to_string()))?;

        let now = Utc::now();
        let written: Vec<FeatureRow> = features
            .iter()
            .map(|feature| {
                let mut row = feature.clone();
                row.updated_at.get_or_insert(now);
                row
            })
            .collect();

        for row in &written {
            rows.insert(row.id.clone(), row.clone());
        }
        Ok(written)
    }
}

/// Session over a [`MemoryStorage`]
#[derive(Debug, Clone)]
pub struct MemorySession {
    storage: Arc<MemoryStorage>,
    statement_timeout: Duration,
}

impl MemorySession {
    pub fn new(storage: Arc<MemoryStorage>, statement_timeout: Duration) -> Self {
        Self {
            storage,
            statement_timeout,
        }
    }
}

impl LayerSession for MemorySession {
    fn execute<'a>(&'a self, query: &'a LayerQuery) -> SessionFuture<'a> {
        Box::pin(async move {
            let faults = self.storage.faults();
            if !faults.latency.is_zero() {
                tokio::time::sleep(faults.latency).await;
            }
            if let Some(message) = faults.failure {
                return Err(SessionError::Storage(message));
            }
            self.storage.apply(query)
        })
    }

    fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }
}

/// Opens [`MemorySession`]s by the layer's storage reference
#[derive(Debug, Default)]
pub struct MemorySessionFactory {
    storages: HashMap<String, (Arc<MemoryStorage>, Duration)>,
}

impl MemorySessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a storage under its own name
    pub fn with_storage(
        mut self,
        storage: Arc<MemoryStorage>,
        statement_timeout: Duration,
    ) -> Self {
        self.storages
            .insert(storage.name().to_string(), (storage, statement_timeout));
        self
    }

    pub fn storage(&self, name: &str) -> Option<&Arc<MemoryStorage>> {
        self.storages.get(name).map(|(storage, _)| storage)
    }
}

impl SessionFactory for MemorySessionFactory {
    fn open(&self, layer: &ViewLayer) -> Result<Arc<dyn LayerSession>, SessionError> {
        let (storage, timeout) = self
            .storages
            .get(layer.storage())
            .ok_or_else(|| {
                SessionError::storage(format!("unknown storage '{}'", layer.storage()))
            })?;
        Ok(Arc::new(MemorySession::new(Arc::clone(storage), *timeout)))
    }
}
