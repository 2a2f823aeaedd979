//! Storage session boundary
//!
//! Backing storages are external collaborators. The view only needs a
//! session that can execute a single-collection query and report its
//! statement timeout, plus a factory that opens such sessions per layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::feature::FeatureRow;
use super::layer::ViewLayer;
use super::request::LayerQuery;

/// Future returned by [`LayerSession::execute`]
pub type SessionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<FeatureRow>, SessionError>> + Send + 'a>>;

/// Failures reported by a backing storage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Task aborted: {0}")]
    Aborted(String),
}

impl SessionError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// An open session against one storage
pub trait LayerSession: Send + Sync {
    /// Execute a query scoped to a single collection
    fn execute<'a>(&'a self, query: &'a LayerQuery) -> SessionFuture<'a>;

    /// Per-statement timeout; zero means unset
    fn statement_timeout(&self) -> Duration;
}

/// Opens sessions for the layers of a view
pub trait SessionFactory: Send + Sync {
    fn open(&self, layer: &ViewLayer) -> Result<Arc<dyn LayerSession>, SessionError>;
}
