//! View configuration
//!
//! Loaded once (typically from a JSON file), validated, and then frozen
//! into the view. Example:
//!
//! ```json
//! {
//!   "layers": [
//!     { "storage": "edits", "collection": "roads", "priority": 0 },
//!     { "storage": "base",  "collection": "roads", "priority": 1 }
//!   ],
//!   "obligatory": [ { "storage": "base", "collection": "roads" } ],
//!   "merge": "priority",
//!   "fanout": { "max_concurrency": 8 }
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fanout::FanoutConfig;
use crate::merge::MergePolicy;

use super::errors::{ViewError, ViewResult};
use super::layer::{LayerId, ViewLayer};

/// One configured layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub storage: String,
    pub collection: String,
    pub priority: i32,
}

impl LayerConfig {
    pub fn new(storage: impl Into<String>, collection: impl Into<String>, priority: i32) -> Self {
        Self {
            storage: storage.into(),
            collection: collection.into(),
            priority,
        }
    }

    pub fn id(&self) -> LayerId {
        LayerId::new(self.storage.clone(), self.collection.clone())
    }
}

impl From<&LayerConfig> for ViewLayer {
    fn from(config: &LayerConfig) -> Self {
        ViewLayer::new(config.storage.clone(), config.collection.clone(), config.priority)
    }
}

/// Complete configuration of a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Layers in declaration order
    pub layers: Vec<LayerConfig>,
    /// Layers every feature must be checked against
    #[serde(default)]
    pub obligatory: Vec<LayerId>,
    /// Target of write requests; defaults to the highest-precedence layer
    #[serde(default)]
    pub write_layer: Option<LayerId>,
    #[serde(default)]
    pub merge: MergePolicy,
    #[serde(default)]
    pub fanout: FanoutConfig,
}

impl ViewConfig {
    pub fn new(layers: Vec<LayerConfig>) -> Self {
        Self {
            layers,
            obligatory: Vec::new(),
            write_layer: None,
            merge: MergePolicy::default(),
            fanout: FanoutConfig::default(),
        }
    }

    pub fn with_obligatory(mut self, id: LayerId) -> Self {
        self.obligatory.push(id);
        self
    }

    pub fn with_write_layer(mut self, id: LayerId) -> Self {
        self.write_layer = Some(id);
        self
    }

    pub fn with_merge(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_fanout(mut self, fanout: FanoutConfig) -> Self {
        self.fanout = fanout;
        self
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> ViewResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ViewError::configuration(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(content: &str) -> ViewResult<Self> {
        let config: ViewConfig = serde_json::from_str(content)
            .map_err(|e| ViewError::configuration(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural consistency
    pub fn validate(&self) -> ViewResult<()> {
        if self.layers.is_empty() {
            return Err(ViewError::configuration("a view needs at least one layer"));
        }

        let mut ids = HashSet::new();
        for layer in &self.layers {
            if layer.storage.is_empty() || layer.collection.is_empty() {
                return Err(ViewError::configuration(
                    "layer storage and collection must be non-empty",
                ));
            }
            if !ids.insert(layer.id()) {
                return Err(ViewError::configuration(format!(
                    "duplicate layer {}",
                    layer.id()
                )));
            }
        }

        for id in &self.obligatory {
            if !ids.contains(id) {
                return Err(ViewError::configuration(format!(
                    "obligatory layer {} is not part of the view",
                    id
                )));
            }
        }

        if let Some(id) = &self.write_layer {
            if !ids.contains(id) {
                return Err(ViewError::configuration(format!(
                    "write layer {} is not part of the view",
                    id
                )));
            }
        }

        self.fanout.validate().map_err(ViewError::Configuration)
    }

    /// Instantiate the layers, sorted by precedence
    ///
    /// Equal priorities keep declaration order.
    pub(crate) fn build_layers(&self) -> Vec<Arc<ViewLayer>> {
        let mut layers: Vec<Arc<ViewLayer>> =
            self.layers.iter().map(|l| Arc::new(ViewLayer::from(l))).collect();
        layers.sort_by_key(|l| l.priority());
        layers
    }
}
