//! # Missing Layer Resolution
//!
//! Decides, for one feature group, which obligatory layers did not
//! contribute a row. The resolver never performs I/O; the orchestrator turns
//! its answer into backfill requests.
//!
//! "Nothing missing" is always an empty `Vec`, never an error or an
//! absent value.

use std::collections::HashSet;
use std::sync::Arc;

use crate::view::{FeatureId, LayerId, LayerResult, ViewError, ViewLayer, ViewResult};

/// An obligatory layer that has no row for a feature
#[derive(Debug, Clone)]
pub struct MissingLayer {
    pub layer: Arc<ViewLayer>,
    pub feature_id: FeatureId,
}

impl MissingLayer {
    /// Deduplication key
    pub fn key(&self) -> (LayerId, FeatureId) {
        (self.layer.id().clone(), self.feature_id.clone())
    }
}

/// Computes the obligatory layers absent from a group
pub trait MissingResolver: Send + Sync {
    /// Resolve a non-empty group.
    ///
    /// Fails with `EmptyInput` when the group has no rows, since no feature
    /// id can be derived from it.
    fn resolve(&self, group: &[LayerResult]) -> ViewResult<Vec<MissingLayer>>;

    /// Layers this resolver checks groups against
    fn layers(&self) -> &[Arc<ViewLayer>];

    /// Resolve a group that may be absent; `None` fails with `NullInput`
    fn resolve_optional(&self, group: Option<&[LayerResult]>) -> ViewResult<Vec<MissingLayer>> {
        match group {
            Some(group) => self.resolve(group),
            None => Err(ViewError::null_input("missing-layer resolution invoked without a group")),
        }
    }
}

/// Pick the resolver for a view's obligatory layers.
///
/// No obligatory layers means no completeness check at all.
pub fn resolver_for(layers: Vec<Arc<ViewLayer>>) -> Option<Arc<dyn MissingResolver>> {
    let mut resolver = ObligatoryLayers::new(layers);
    match resolver.layers.len() {
        0 => None,
        1 => resolver
            .layers
            .pop()
            .map(|layer| Arc::new(ObligatoryLayer::new(layer)) as Arc<dyn MissingResolver>),
        _ => Some(Arc::new(resolver)),
    }
}

fn feature_id_of(group: &[LayerResult]) -> ViewResult<&str> {
    group
        .first()
        .map(|r| r.feature_id())
        .ok_or_else(|| ViewError::empty_input("missing-layer resolution invoked on an empty group"))
}

/// Resolver for a view with exactly one obligatory layer
#[derive(Debug, Clone)]
pub struct ObligatoryLayer {
    layer: Arc<ViewLayer>,
}

impl ObligatoryLayer {
    pub fn new(layer: Arc<ViewLayer>) -> Self {
        Self { layer }
    }
}

impl MissingResolver for ObligatoryLayer {
    fn resolve(&self, group: &[LayerResult]) -> ViewResult<Vec<MissingLayer>> {
        let feature_id = feature_id_of(group)?;
        if group.iter().any(|r| r.layer().id() == self.layer.id()) {
            return Ok(Vec::new());
        }
        Ok(vec![MissingLayer {
            layer: Arc::clone(&self.layer),
            feature_id: feature_id.to_string(),
        }])
    }

    fn layers(&self) -> &[Arc<ViewLayer>] {
        std::slice::from_ref(&self.layer)
    }
}

/// Resolver backed by a set of obligatory layers.
///
/// Reports missing layers in the order they were configured.
#[derive(Debug, Clone, Default)]
pub struct ObligatoryLayers {
    layers: Vec<Arc<ViewLayer>>,
}

impl ObligatoryLayers {
    /// Build from a set of layers; duplicates by id are dropped
    pub fn new(layers: impl IntoIterator<Item = Arc<ViewLayer>>) -> Self {
        let mut seen = HashSet::new();
        let layers = layers
            .into_iter()
            .filter(|layer| seen.insert(layer.id().clone()))
            .collect();
        Self { layers }
    }
}

impl MissingResolver for ObligatoryLayers {
    fn resolve(&self, group: &[LayerResult]) -> ViewResult<Vec<MissingLayer>> {
        let feature_id = feature_id_of(group)?;
        let present: HashSet<&LayerId> = group.iter().map(|r| r.layer().id()).collect();

        Ok(self
            .layers
            .iter()
            .filter(|layer| !present.contains(layer.id()))
            .map(|layer| MissingLayer {
                layer: Arc::clone(layer),
                feature_id: feature_id.to_string(),
            })
            .collect())
    }

    fn layers(&self) -> &[Arc<ViewLayer>] {
        &self.layers
    }
}
