//! View and layer requests
//!
//! A [`ViewRequest`] is the storage-agnostic request a caller issues against
//! the whole view. The orchestrator narrows it into one [`LayerRequest`] per
//! participating layer; every layer request addresses exactly one collection.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::feature::{FeatureId, FeatureRow};
use super::layer::ViewLayer;
use super::session::LayerSession;

/// Read selection applied by each layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadFilter {
    /// Restrict to these feature ids; empty selects every feature
    #[serde(default)]
    pub ids: Vec<FeatureId>,
    /// Property equality constraints
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ReadFilter {
    /// Select every feature
    pub fn all() -> Self {
        Self::default()
    }

    /// Select the given ids
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FeatureId>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check whether a row satisfies the id and property constraints
    pub fn accepts(&self, row: &FeatureRow) -> bool {
        let id_matches = self.ids.is_empty() || self.ids.iter().any(|id| *id == row.id);
        id_matches && row.matches(&self.properties)
    }
}

/// Operation carried by a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ViewOperation {
    Read(ReadFilter),
    Write { features: Vec<FeatureRow> },
}

impl ViewOperation {
    /// Operation name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Write { .. } => "write",
        }
    }
}

/// A logical request against the view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRequest {
    /// Collections addressed; empty addresses every layer of the view
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(flatten)]
    pub operation: ViewOperation,
}

impl ViewRequest {
    /// Read request across the given collections
    pub fn read<I, S>(collections: I, filter: ReadFilter) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
            operation: ViewOperation::Read(filter),
        }
    }

    /// Write request carrying features
    pub fn write(features: Vec<FeatureRow>) -> Self {
        Self {
            collections: Vec::new(),
            operation: ViewOperation::Write { features },
        }
    }

    /// Check whether this request addresses the layer's collection
    pub fn targets(&self, layer: &ViewLayer) -> bool {
        self.collections.is_empty() || self.collections.iter().any(|c| c == layer.collection())
    }
}

/// A request narrowed to a single collection
#[derive(Debug, Clone, PartialEq)]
pub struct LayerQuery {
    pub collection: String,
    pub operation: ViewOperation,
}

impl LayerQuery {
    /// Fetch a single feature by id
    pub fn by_id(collection: impl Into<String>, id: impl Into<FeatureId>) -> Self {
        Self {
            collection: collection.into(),
            operation: ViewOperation::Read(ReadFilter::ids([id.into()])),
        }
    }
}

/// One unit of fan-out work: a layer, its open session and its query.
///
/// The query is always scoped to the layer's own collection.
#[derive(Clone)]
pub struct LayerRequest {
    layer: Arc<ViewLayer>,
    session: Arc<dyn LayerSession>,
    query: LayerQuery,
}

impl LayerRequest {
    /// Build a request for `layer`, narrowing `operation` to its collection
    pub fn new(
        layer: Arc<ViewLayer>,
        session: Arc<dyn LayerSession>,
        operation: ViewOperation,
    ) -> Self {
        let query = LayerQuery {
            collection: layer.collection().to_string(),
            operation,
        };
        Self {
            layer,
            session,
            query,
        }
    }

    /// Build a request fetching a single feature from `layer`
    pub fn by_id(
        layer: Arc<ViewLayer>,
        session: Arc<dyn LayerSession>,
        id: impl Into<FeatureId>,
    ) -> Self {
        let query = LayerQuery::by_id(layer.collection(), id);
        Self {
            layer,
            session,
            query,
        }
    }

    pub fn layer(&self) -> &Arc<ViewLayer> {
        &self.layer
    }

    pub fn session(&self) -> &Arc<dyn LayerSession> {
        &self.session
    }

    pub fn query(&self) -> &LayerQuery {
        &self.query
    }
}

impl fmt::Debug for LayerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerRequest")
            .field("layer", &self.layer.id())
            .field("query", &self.query)
            .finish()
    }
}
