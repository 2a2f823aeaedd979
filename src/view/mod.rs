//! # View
//!
//! The federated view: layer identities, feature rows, requests, the
//! session seam towards storages, configuration, and the orchestrator that
//! drives a request from planning to its final merged result.

mod config;
mod errors;
mod feature;
mod federated;
mod layer;
mod orchestrator;
mod request;
mod session;
mod state;

pub use config::{LayerConfig, ViewConfig};
pub use errors::{ViewError, ViewResult};
pub use feature::{FeatureGroups, FeatureId, FeatureRow, LayerResult, MergedFeatures};
pub use federated::View;
pub use layer::{LayerId, ViewLayer};
pub use orchestrator::{ViewOrchestrator, ViewOutcome};
pub use request::{LayerQuery, LayerRequest, ReadFilter, ViewOperation, ViewRequest};
pub use session::{LayerSession, SessionError, SessionFactory, SessionFuture};
pub use state::ViewState;

pub(crate) use feature::group_into;
