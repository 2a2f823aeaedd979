//! View layers
//!
//! A layer binds one storage and one of its collections into a view with a
//! precedence rank. Layers are created once when the view is configured and
//! never change afterwards; they are shared as `Arc<ViewLayer>`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a layer: the (storage, collection) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId {
    /// Reference to the backing storage
    pub storage: String,
    /// Collection within that storage
    pub collection: String,
}

impl LayerId {
    pub fn new(storage: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.storage, self.collection)
    }
}

/// One physical storage collection bound into a view.
///
/// Lower `priority` values take precedence in merges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewLayer {
    id: LayerId,
    priority: i32,
}

impl ViewLayer {
    /// Create a new layer
    pub fn new(storage: impl Into<String>, collection: impl Into<String>, priority: i32) -> Self {
        Self {
            id: LayerId::new(storage, collection),
            priority,
        }
    }

    pub fn id(&self) -> &LayerId {
        &self.id
    }

    pub fn storage(&self) -> &str {
        &self.id.storage
    }

    pub fn collection(&self) -> &str {
        &self.id.collection
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Display for ViewLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (priority {})", self.id, self.priority)
    }
}
