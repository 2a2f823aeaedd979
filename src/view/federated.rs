//! View handle
//!
//! The public entry point. A [`View`] is created empty, initialized exactly
//! once from a [`ViewConfig`], and then serves any number of concurrent
//! requests against its frozen configuration.

use std::sync::{Arc, OnceLock};

use tokio::runtime::Handle;

use crate::fanout::FanoutExecutor;
use crate::observability::{log_event, Event, LayerTelemetry, NoOpTelemetry};

use super::config::ViewConfig;
use super::errors::{ViewError, ViewResult};
use super::feature::{FeatureRow, MergedFeatures};
use super::layer::ViewLayer;
use super::orchestrator::{ViewOrchestrator, ViewOutcome};
use super::request::{LayerRequest, ReadFilter, ViewRequest};
use super::session::SessionFactory;

/// A federated view over several layers
pub struct View {
    runtime: Handle,
    telemetry: Arc<dyn LayerTelemetry>,
    orchestrator: OnceLock<ViewOrchestrator>,
}

impl View {
    /// Create an uninitialized view whose fan-out tasks run on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            telemetry: Arc::new(NoOpTelemetry),
            orchestrator: OnceLock::new(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn LayerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Freeze `config` into the view.
    ///
    /// Only the first successful call takes effect; later calls fail with a
    /// configuration error and leave the view untouched.
    pub fn initialize(
        &self,
        config: ViewConfig,
        sessions: Arc<dyn SessionFactory>,
    ) -> ViewResult<()> {
        if self.is_initialized() {
            return Err(ViewError::configuration("view already initialized"));
        }
        config.validate()?;

        let executor = FanoutExecutor::new(self.runtime.clone(), config.fanout.clone())
            .with_telemetry(Arc::clone(&self.telemetry));
        let orchestrator = ViewOrchestrator::new(
            config.build_layers(),
            &config.obligatory,
            config.write_layer.as_ref(),
            config.merge.strategy(),
            sessions,
            executor,
        )?;

        let layers = orchestrator.layers().len().to_string();
        let obligatory = orchestrator.obligatory().len().to_string();
        let write_layer = orchestrator.write_layer().id().to_string();

        self.orchestrator
            .set(orchestrator)
            .map_err(|_| ViewError::configuration("view already initialized"))?;

        log_event(
            Event::ViewInitialized,
            &[
                ("layers", &layers),
                ("obligatory", &obligatory),
                ("write_layer", &write_layer),
                ("merge", config.merge.strategy().name()),
            ],
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.orchestrator.get().is_some()
    }

    /// Configured layers in precedence order; empty before initialization
    pub fn layers(&self) -> &[Arc<ViewLayer>] {
        self.orchestrator.get().map(|o| o.layers()).unwrap_or_default()
    }

    /// Serve one request
    pub async fn execute(&self, request: &ViewRequest) -> ViewResult<ViewOutcome> {
        self.orchestrator()?.execute(request).await
    }

    /// Read from the given collections (all collections when empty)
    pub async fn read<I, S>(
        &self,
        collections: I,
        filter: ReadFilter,
    ) -> ViewResult<Vec<FeatureRow>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let outcome = self.execute(&ViewRequest::read(collections, filter)).await?;
        Ok(outcome.into_rows())
    }

    /// Write to the view's write layer and return the merged result
    pub async fn write(&self, features: Vec<FeatureRow>) -> ViewResult<Vec<FeatureRow>> {
        let outcome = self.execute(&ViewRequest::write(features)).await?;
        Ok(outcome.into_rows())
    }

    /// Fan out caller-built layer requests and merge the result
    pub async fn query_in_parallel(
        &self,
        requests: Vec<LayerRequest>,
    ) -> ViewResult<MergedFeatures> {
        self.orchestrator()?.query_in_parallel(requests).await
    }

    fn orchestrator(&self) -> ViewResult<&ViewOrchestrator> {
        self.orchestrator
            .get()
            .ok_or_else(|| ViewError::configuration("view used before initialization"))
    }
}
