//! View Errors

use thiserror::Error;

use super::layer::LayerId;
use super::session::SessionError;
use super::state::ViewState;

/// Result type for view operations
pub type ViewResult<T> = Result<T, ViewError>;

/// View errors
#[derive(Debug, Clone, Error)]
pub enum ViewError {
    /// View used before it was configured, or configured twice
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Merge or resolve invoked on an absent group
    #[error("Null input: {0}")]
    NullInput(String),

    /// Merge or resolve invoked on an empty group
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Round deadline elapsed before every layer answered
    #[error("Round deadline of {deadline_ms}ms exceeded with {pending} layer(s) pending")]
    Timeout { deadline_ms: u64, pending: usize },

    /// A layer's storage failed
    #[error("Layer {layer} failed: {source}")]
    Execution {
        layer: LayerId,
        #[source]
        source: SessionError,
    },

    /// Any of the above, surfaced at the request boundary
    #[error("View request failed in state {stage}: {source}")]
    Aggregate {
        stage: ViewState,
        #[source]
        source: Box<ViewError>,
    },
}

impl ViewError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn null_input(msg: impl Into<String>) -> Self {
        Self::NullInput(msg.into())
    }

    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }

    pub fn execution(layer: LayerId, source: SessionError) -> Self {
        Self::Execution { layer, source }
    }

    /// Wrap into an aggregate failure recorded at `stage`.
    ///
    /// An error that is already aggregate is returned unchanged.
    pub fn into_aggregate(self, stage: ViewState) -> Self {
        match self {
            Self::Aggregate { .. } => self,
            other => Self::Aggregate {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Innermost non-aggregate error
    pub fn root_cause(&self) -> &ViewError {
        match self {
            Self::Aggregate { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "LAYERVIEW_CONFIGURATION",
            Self::NullInput(_) => "LAYERVIEW_NULL_INPUT",
            Self::EmptyInput(_) => "LAYERVIEW_EMPTY_INPUT",
            Self::Timeout { .. } => "LAYERVIEW_TIMEOUT",
            Self::Execution { .. } => "LAYERVIEW_EXECUTION",
            Self::Aggregate { .. } => "LAYERVIEW_AGGREGATE_FAILURE",
        }
    }
}
