//! Features and per-layer results
//!
//! A feature is one logical record identified by a stable id. The same id
//! may exist in several layers; each copy returned by a layer is wrapped in
//! a [`LayerResult`] that remembers which layer produced it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::layer::ViewLayer;

/// Stable feature identifier
pub type FeatureId = String;

/// One feature row as stored by a layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub id: FeatureId,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FeatureRow {
    /// Create a feature with no properties
    pub fn new(id: impl Into<FeatureId>) -> Self {
        Self {
            id: id.into(),
            properties: Map::new(),
            updated_at: None,
        }
    }

    /// Set a property
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Set the modification timestamp
    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Check whether every entry of `filter` is present with an equal value
    pub fn matches(&self, filter: &Map<String, Value>) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.properties.get(k).map_or(false, |actual| actual == v))
    }
}

/// A feature row tagged with the layer that produced it.
///
/// The priority is captured when the row is tagged so that later
/// comparisons never depend on the layer's current configuration.
#[derive(Debug, Clone)]
pub struct LayerResult {
    feature: FeatureRow,
    layer: Arc<ViewLayer>,
    priority: i32,
}

impl LayerResult {
    /// Tag a row with its layer, capturing the layer's priority now
    pub fn new(feature: FeatureRow, layer: Arc<ViewLayer>) -> Self {
        let priority = layer.priority();
        Self {
            feature,
            layer,
            priority,
        }
    }

    /// Tag a row with a priority captured earlier
    pub(crate) fn tagged(feature: FeatureRow, layer: Arc<ViewLayer>, priority: i32) -> Self {
        Self {
            feature,
            layer,
            priority,
        }
    }

    pub fn feature(&self) -> &FeatureRow {
        &self.feature
    }

    pub fn feature_id(&self) -> &str {
        &self.feature.id
    }

    pub fn layer(&self) -> &Arc<ViewLayer> {
        &self.layer
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn into_feature(self) -> FeatureRow {
        self.feature
    }
}

/// Per-round grouping of layer results by feature id.
///
/// Within a group, results appear in the order their layer tasks completed.
/// Groups are never empty.
pub type FeatureGroups = BTreeMap<FeatureId, Vec<LayerResult>>;

/// Merged output: one winning result per feature id
pub type MergedFeatures = BTreeMap<FeatureId, LayerResult>;

/// Append results to their groups, keeping arrival order
pub(crate) fn group_into(
    groups: &mut FeatureGroups,
    results: impl IntoIterator<Item = LayerResult>,
) {
    for result in results {
        groups
            .entry(result.feature_id().to_string())
            .or_default()
            .push(result);
    }
}
