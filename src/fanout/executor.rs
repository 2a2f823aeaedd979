//! Fan-out Executor
//!
//! Runs one task per [`LayerRequest`] on an injected tokio runtime and joins
//! them under a single round deadline. A round either yields every layer's
//! rows grouped by feature id, or fails as a whole:
//!
//! - the first task failure aborts the round
//! - a deadline expiry aborts the round
//! - outstanding tasks are aborted without waiting for them to stop
//!
//! Tasks share nothing while running; each returns its own outcome and all
//! grouping happens on the joining task after the last one finished.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::observability::{
    log_event, Event, LayerReport, LayerStatus, LayerTelemetry, NoOpTelemetry, RoundKind, Timer,
};
use crate::view::{
    group_into, FeatureGroups, FeatureRow, LayerRequest, LayerResult, SessionError, ViewError,
    ViewLayer, ViewResult,
    ViewState,
};

use super::config::{round_deadline, FanoutConfig};

/// Rows produced by one task
struct UnitOutcome {
    slot: usize,
    rows: Vec<FeatureRow>,
    elapsed: Duration,
}

/// Failure reported by one task
struct UnitFailure {
    slot: usize,
    error: SessionError,
    elapsed: Duration,
}

/// Concurrent fan-out over layer requests
pub struct FanoutExecutor {
    runtime: Handle,
    permits: Arc<Semaphore>,
    config: FanoutConfig,
    telemetry: Arc<dyn LayerTelemetry>,
}

impl FanoutExecutor {
    /// Create an executor spawning its tasks on `runtime`
    pub fn new(runtime: Handle, config: FanoutConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            runtime,
            permits,
            config,
            telemetry: Arc::new(NoOpTelemetry),
        }
    }

    /// Send per-layer reports to `telemetry`
    pub fn with_telemetry(mut self, telemetry: Arc<dyn LayerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    /// Deadline a round over `requests` would run under
    pub fn deadline_for(&self, requests: &[LayerRequest]) -> Duration {
        round_deadline(
            requests.iter().map(|r| r.session().statement_timeout()),
            self.config.default_deadline(),
        )
    }

    /// Run one primary round
    pub async fn run(&self, requests: Vec<LayerRequest>) -> ViewResult<FeatureGroups> {
        self.run_round(requests, RoundKind::Primary).await
    }

    /// Run one round; failures are reported as aggregate errors
    pub(crate) async fn run_round(
        &self,
        requests: Vec<LayerRequest>,
        round: RoundKind,
    ) -> ViewResult<FeatureGroups> {
        let stage = match round {
            RoundKind::Primary => ViewState::FannedOut,
            RoundKind::Backfill => ViewState::Backfilled,
        };
        let result = self.join_round(requests, round).await;
        self.telemetry.record_round(round, result.is_ok());
        result.map_err(|e| e.into_aggregate(stage))
    }

    async fn join_round(
        &self,
        requests: Vec<LayerRequest>,
        round: RoundKind,
    ) -> ViewResult<FeatureGroups> {
        if requests.is_empty() {
            return Ok(FeatureGroups::new());
        }

        let deadline = self.deadline_for(&requests);
        let deadline_ms = deadline.as_millis().to_string();
        let layer_count = requests.len().to_string();
        log_event(
            Event::RoundStart,
            &[
                ("round", round.as_str()),
                ("layers", &layer_count),
                ("deadline_ms", &deadline_ms),
            ],
        );
        let round_timer = Timer::new();

        // Captured before spawning so tagging never reads live configuration
        let layers: Vec<(Arc<ViewLayer>, i32)> = requests
            .iter()
            .map(|r| (Arc::clone(r.layer()), r.layer().priority()))
            .collect();

        let mut units = JoinSet::new();
        let mut slots = HashMap::new();
        let mut pending: BTreeSet<usize> = (0..requests.len()).collect();

        for (slot, request) in requests.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let handle = units.spawn_on(
                async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return Err(UnitFailure {
                                slot,
                                error: SessionError::Aborted(e.to_string()),
                                elapsed: Duration::ZERO,
                            })
                        }
                    };

                    let timer = Timer::new();
                    match request.session().execute(request.query()).await {
                        Ok(rows) => Ok(UnitOutcome {
                            slot,
                            rows,
                            elapsed: timer.elapsed(),
                        }),
                        Err(error) => Err(UnitFailure {
                            slot,
                            error,
                            elapsed: timer.elapsed(),
                        }),
                    }
                },
                &self.runtime,
            );
            slots.insert(handle.id(), slot);
        }

        let expiry = tokio::time::sleep(deadline);
        tokio::pin!(expiry);

        let mut completed: Vec<UnitOutcome> = Vec::with_capacity(layers.len());

        loop {
            tokio::select! {
                biased;

                joined = units.join_next_with_id() => match joined {
                    None => break,
                    Some(Ok((_, Ok(outcome)))) => {
                        pending.remove(&outcome.slot);
                        self.report(
                            &layers[outcome.slot].0,
                            round,
                            outcome.elapsed,
                            outcome.rows.len(),
                            LayerStatus::Succeeded,
                        );
                        completed.push(outcome);
                    }
                    Some(Ok((_, Err(failure)))) => {
                        units.abort_all();
                        let layer = &layers[failure.slot].0;
                        self.report(layer, round, failure.elapsed, 0, LayerStatus::Failed);
                        return Err(self.fail_round(
                            round,
                            &round_timer,
                            ViewError::execution(layer.id().clone(), failure.error),
                        ));
                    }
                    Some(Err(join_error)) => {
                        units.abort_all();
                        let error = SessionError::Aborted(join_error.to_string());
                        let slot = slots
                            .get(&join_error.id())
                            .copied()
                            .or_else(|| pending.iter().next().copied())
                            .unwrap_or_default();
                        let layer = &layers[slot].0;
                        self.report(layer, round, round_timer.elapsed(), 0, LayerStatus::Failed);
                        return Err(self.fail_round(
                            round,
                            &round_timer,
                            ViewError::execution(layer.id().clone(), error),
                        ));
                    }
                },

                _ = &mut expiry => {
                    units.abort_all();
                    for slot in &pending {
                        self.report(&layers[*slot].0, round, deadline, 0, LayerStatus::TimedOut);
                    }
                    let timeout = ViewError::Timeout {
                        deadline_ms: deadline.as_millis() as u64,
                        pending: pending.len(),
                    };
                    return Err(self.fail_round(round, &round_timer, timeout));
                }
            }
        }

        let mut groups = FeatureGroups::new();
        let mut rows = 0usize;
        for outcome in completed {
            let (layer, priority) = &layers[outcome.slot];
            rows += outcome.rows.len();
            group_into(
                &mut groups,
                outcome
                    .rows
                    .into_iter()
                    .map(|row| LayerResult::tagged(row, Arc::clone(layer), *priority)),
            );
        }

        let row_count = rows.to_string();
        let feature_count = groups.len().to_string();
        let elapsed = round_timer.elapsed_ms();
        log_event(
            Event::RoundComplete,
            &[
                ("round", round.as_str()),
                ("rows", &row_count),
                ("features", &feature_count),
                ("elapsed_ms", &elapsed),
            ],
        );

        Ok(groups)
    }

    fn report(
        &self,
        layer: &ViewLayer,
        round: RoundKind,
        elapsed: Duration,
        rows: usize,
        status: LayerStatus,
    ) {
        let report = LayerReport {
            layer: layer.id().clone(),
            round,
            elapsed,
            rows,
            status,
        };

        let layer_name = layer.id().to_string();
        let elapsed_ms = elapsed.as_millis().to_string();
        let row_count = rows.to_string();
        let event = match status {
            LayerStatus::Succeeded => Event::LayerComplete,
            LayerStatus::Failed | LayerStatus::TimedOut => Event::LayerFailed,
        };
        log_event(
            event,
            &[
                ("layer", &layer_name),
                ("round", round.as_str()),
                ("status", status.as_str()),
                ("rows", &row_count),
                ("elapsed_ms", &elapsed_ms),
            ],
        );

        self.telemetry.record_layer(&report);
    }

    fn fail_round(&self, round: RoundKind, timer: &Timer, error: ViewError) -> ViewError {
        let reason = error.to_string();
        let elapsed = timer.elapsed_ms();
        log_event(
            Event::RoundFailed,
            &[("round", round.as_str()), ("reason", &reason), ("elapsed_ms", &elapsed)],
        );
        error
    }
}
