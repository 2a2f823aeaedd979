//! View Orchestrator
//!
//! Sequences one view request through the state machine in
//! [`super::state`]:
//!
//! 1. PLANNED: one layer request per participating layer
//! 2. FANNED_OUT: primary fan-out round
//! 3. GROUPED: rows grouped by feature id
//! 4. MERGED: one candidate per feature
//! 5. COMPLETION_CHECKED: obligatory layers missing per feature
//! 6. BACKFILLED: one by-id round for every missing (layer, feature) pair,
//!    then the affected groups are merged again
//! 7. FINAL
//!
//! At most one backfill round runs per request. Any failure discards every
//! partial result and surfaces as one aggregate error.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use uuid::Uuid;

use crate::fanout::FanoutExecutor;
use crate::merge::{merge_groups, MergeStrategy};
use crate::missing::{resolver_for, MissingLayer, MissingResolver};
use crate::observability::{log_event, Event, ObservationScope, RoundKind};

use super::errors::{ViewError, ViewResult};
use super::feature::{FeatureGroups, FeatureId, FeatureRow, MergedFeatures};
use super::layer::{LayerId, ViewLayer};
use super::request::{LayerRequest, ViewOperation, ViewRequest};
use super::session::{LayerSession, SessionFactory};
use super::state::ViewState;

/// Result of one view request
#[derive(Debug, Clone)]
pub struct ViewOutcome {
    pub request_id: Uuid,
    /// Winning row per feature id
    pub features: MergedFeatures,
    /// Fan-out rounds executed (1 or 2)
    pub rounds: u8,
    /// (layer, feature) pairs requested in the backfill round
    pub backfilled: usize,
}

impl ViewOutcome {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FeatureRow> {
        self.features.get(id).map(|r| r.feature())
    }

    /// Winning rows in feature id order
    pub fn into_rows(self) -> Vec<FeatureRow> {
        self.features.into_values().map(|r| r.into_feature()).collect()
    }
}

/// Tracks and logs the request's progress through [`ViewState`]
struct Progress {
    request_id: String,
    state: ViewState,
}

impl Progress {
    fn new(request_id: &Uuid) -> Self {
        Self {
            request_id: request_id.to_string(),
            state: ViewState::Planned,
        }
    }

    fn advance(&mut self, next: ViewState) {
        debug_assert!(self.state.can_transition_to(next), "{} -> {}", self.state, next);
        log_event(
            Event::StateTransition,
            &[
                ("request_id", &self.request_id),
                ("from", self.state.as_str()),
                ("to", next.as_str()),
            ],
        );
        self.state = next;
    }
}

/// Frozen view configuration plus the engine that serves requests
pub struct ViewOrchestrator {
    layers: Vec<Arc<ViewLayer>>,
    write_layer: Arc<ViewLayer>,
    resolver: Option<Arc<dyn MissingResolver>>,
    merge: Arc<dyn MergeStrategy>,
    sessions: Arc<dyn SessionFactory>,
    executor: FanoutExecutor,
}

impl ViewOrchestrator {
    /// Assemble an orchestrator.
    ///
    /// `layers` must be non-empty; `obligatory` and `write_layer` must refer
    /// to members of `layers`.
    pub fn new(
        layers: Vec<Arc<ViewLayer>>,
        obligatory: &[LayerId],
        write_layer: Option<&LayerId>,
        merge: Arc<dyn MergeStrategy>,
        sessions: Arc<dyn SessionFactory>,
        executor: FanoutExecutor,
    ) -> ViewResult<Self> {
        let find = |id: &LayerId| {
            layers
                .iter()
                .find(|l| l.id() == id)
                .cloned()
                .ok_or_else(|| {
                    ViewError::configuration(format!("layer {} is not part of the view", id))
                })
        };

        let resolver = resolver_for(obligatory.iter().map(find).collect::<ViewResult<Vec<_>>>()?);

        let write_layer = match write_layer {
            Some(id) => find(id)?,
            None => layers
                .iter()
                .min_by_key(|l| l.priority())
                .cloned()
                .ok_or_else(|| ViewError::configuration("a view needs at least one layer"))?,
        };

        Ok(Self {
            layers,
            write_layer,
            resolver,
            merge,
            sessions,
            executor,
        })
    }

    pub fn layers(&self) -> &[Arc<ViewLayer>] {
        &self.layers
    }

    pub fn write_layer(&self) -> &Arc<ViewLayer> {
        &self.write_layer
    }

    /// Replace the completeness check derived from the obligatory layers
    pub fn with_resolver(mut self, resolver: Arc<dyn MissingResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Obligatory layers; empty when no completeness check runs
    pub fn obligatory(&self) -> &[Arc<ViewLayer>] {
        self.resolver.as_ref().map(|r| r.layers()).unwrap_or_default()
    }

    pub fn merge_strategy(&self) -> &dyn MergeStrategy {
        self.merge.as_ref()
    }

    pub fn executor(&self) -> &FanoutExecutor {
        &self.executor
    }

    /// Serve one view request end to end
    pub async fn execute(&self, request: &ViewRequest) -> ViewResult<ViewOutcome> {
        let request_id = Uuid::new_v4();
        let rid = request_id.to_string();
        let scope = ObservationScope::with_fields(
            "VIEW_REQUEST",
            &[("request_id", &rid), ("op", request.operation.name())],
        );
        let mut progress = Progress::new(&request_id);

        match self.drive(request, request_id, &mut progress).await {
            Ok(outcome) => {
                let features = outcome.len().to_string();
                let rounds = outcome.rounds.to_string();
                scope.complete_with_fields(&[("features", &features), ("rounds", &rounds)]);
                Ok(outcome)
            }
            Err(error) => {
                progress.advance(ViewState::Failed);
                scope.fail(&error.to_string());
                Err(error)
            }
        }
    }

    /// Fan out caller-built requests and merge, without completeness checks
    pub async fn query_in_parallel(
        &self,
        requests: Vec<LayerRequest>,
    ) -> ViewResult<MergedFeatures> {
        let groups = self.executor.run(requests).await?;
        merge_groups(self.merge.as_ref(), &groups).map_err(|e| e.into_aggregate(ViewState::Merged))
    }

    async fn drive(
        &self,
        request: &ViewRequest,
        request_id: Uuid,
        progress: &mut Progress,
    ) -> ViewResult<ViewOutcome> {
        let requests = self.plan(request).map_err(|e| e.into_aggregate(ViewState::Planned))?;

        let mut groups = self.executor.run_round(requests, RoundKind::Primary).await?;
        progress.advance(ViewState::FannedOut);
        progress.advance(ViewState::Grouped);

        let mut features = merge_groups(self.merge.as_ref(), &groups)
            .map_err(|e| e.into_aggregate(ViewState::Merged))?;
        progress.advance(ViewState::Merged);

        let missing = self
            .resolve_missing(request, &groups)
            .map_err(|e| e.into_aggregate(ViewState::CompletionChecked))?;
        progress.advance(ViewState::CompletionChecked);

        let mut rounds = 1;
        let backfilled = missing.len();
        if !missing.is_empty() {
            let affected = self.backfill(&mut groups, missing).await?;
            for id in affected {
                let group = groups.get(&id).map(Vec::as_slice);
                let winner = self
                    .merge
                    .merge_optional(group)
                    .map_err(|e| e.into_aggregate(ViewState::Backfilled))?;
                features.insert(id, winner);
            }
            rounds = 2;
            progress.advance(ViewState::Backfilled);
        }

        progress.advance(ViewState::Final);
        Ok(ViewOutcome {
            request_id,
            features,
            rounds,
            backfilled,
        })
    }

    /// Split the request into one layer request per participating layer
    fn plan(&self, request: &ViewRequest) -> ViewResult<Vec<LayerRequest>> {
        let targets: Vec<&Arc<ViewLayer>> = match request.operation {
            ViewOperation::Read(_) => {
                self.layers.iter().filter(|l| self.in_scope(request, l)).collect()
            }
            ViewOperation::Write { .. } => vec![&self.write_layer],
        };

        targets
            .into_iter()
            .map(|layer| {
                let session = self.open(layer)?;
                Ok(LayerRequest::new(Arc::clone(layer), session, request.operation.clone()))
            })
            .collect()
    }

    fn open(&self, layer: &ViewLayer) -> ViewResult<Arc<dyn LayerSession>> {
        self.sessions
            .open(layer)
            .map_err(|e| ViewError::execution(layer.id().clone(), e))
    }

    /// Whether `layer` serves a collection the request addresses.
    ///
    /// A write addresses the write layer's collection only.
    fn in_scope(&self, request: &ViewRequest, layer: &ViewLayer) -> bool {
        match request.operation {
            ViewOperation::Read(_) => request.targets(layer),
            ViewOperation::Write { .. } => layer.collection() == self.write_layer.collection(),
        }
    }

    /// Union of missing (layer, feature) pairs over all groups, deduplicated.
    ///
    /// Obligatory layers outside the request's collections are never reported.
    fn resolve_missing(
        &self,
        request: &ViewRequest,
        groups: &FeatureGroups,
    ) -> ViewResult<Vec<MissingLayer>> {
        let Some(resolver) = &self.resolver else {
            return Ok(Vec::new());
        };

        let mut seen = BTreeSet::new();
        let mut missing = Vec::new();
        for group in groups.values() {
            for pair in resolver.resolve(group)? {
                if self.in_scope(request, &pair.layer) && seen.insert(pair.key()) {
                    missing.push(pair);
                }
            }
        }
        Ok(missing)
    }

    /// Run the single backfill round and fold its rows into `groups`.
    ///
    /// Returns the ids of the groups that received rows.
    async fn backfill(
        &self,
        groups: &mut FeatureGroups,
        missing: Vec<MissingLayer>,
    ) -> ViewResult<Vec<FeatureId>> {
        let pairs = missing.len().to_string();
        log_event(Event::BackfillPlanned, &[("pairs", &pairs)]);

        let mut sessions: HashMap<LayerId, Arc<dyn LayerSession>> = HashMap::new();
        let mut requests = Vec::with_capacity(missing.len());
        for pair in missing {
            let session = match sessions.get(pair.layer.id()) {
                Some(session) => Arc::clone(session),
                None => {
                    let session = self
                        .open(&pair.layer)
                        .map_err(|e| e.into_aggregate(ViewState::Backfilled))?;
                    sessions.insert(pair.layer.id().clone(), Arc::clone(&session));
                    session
                }
            };
            requests.push(LayerRequest::by_id(pair.layer, session, pair.feature_id));
        }

        let returned = self.executor.run_round(requests, RoundKind::Backfill).await?;

        let mut affected = Vec::new();
        for (id, rows) in returned {
            match groups.get_mut(&id) {
                Some(group) => {
                    group.extend(rows);
                    affected.push(id);
                }
                None => {
                    let count = rows.len().to_string();
                    log_event(Event::BackfillRowDropped, &[("feature_id", &id), ("rows", &count)]);
                }
            }
        }
        Ok(affected)
    }
}
