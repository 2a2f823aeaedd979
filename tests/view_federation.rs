//! View Federation Tests
//!
//! End-to-end behavior of a view over in-memory layers:
//! - Lower priority value wins the merge
//! - Missing obligatory layers are fetched in one backfill round
//! - A failing layer fails the whole request with no partial result
//! - Round deadlines fall back to the default when no timeout is set
//! - Merged output is stable across runs

use std::sync::Arc;
use std::time::Duration;

use layerview::backend::{MemorySessionFactory, MemoryStorage};
use layerview::fanout::{FanoutConfig, FanoutExecutor, DEFAULT_ROUND_DEADLINE};
use layerview::merge::MergePolicy;
use layerview::missing::{MissingResolver, ObligatoryLayers};
use layerview::observability::FederationMetrics;
use layerview::view::{
    FeatureRow, LayerConfig, LayerId, LayerRequest, LayerResult, ReadFilter, SessionFactory, View,
    ViewConfig, ViewError, ViewLayer, ViewOperation, ViewRequest, ViewState,
};
use serde_json::json;
use tokio::runtime::Handle;

// =============================================================================
// Helper Functions
// =============================================================================

fn row(id: &str, version: &str) -> FeatureRow {
    FeatureRow::new(id).with_property("version", json!(version))
}

fn version(row: &FeatureRow) -> &str {
    row.properties["version"].as_str().unwrap()
}

fn roads(storage: &str, rows: Vec<FeatureRow>) -> Arc<MemoryStorage> {
    Arc::new(MemoryStorage::new(storage).with_features("roads", rows))
}

struct Layers {
    l0: Arc<MemoryStorage>,
    l1: Arc<MemoryStorage>,
}

impl Layers {
    /// L0 holds f1@A; L1 holds f1@B and f2@B
    fn new() -> Self {
        Self {
            l0: roads("l0", vec![row("f1", "A")]),
            l1: roads("l1", vec![row("f1", "B"), row("f2", "B")]),
        }
    }

    fn sessions(&self, timeout: Duration) -> Arc<MemorySessionFactory> {
        Arc::new(
            MemorySessionFactory::new()
                .with_storage(Arc::clone(&self.l0), timeout)
                .with_storage(Arc::clone(&self.l1), timeout),
        )
    }
}

fn config() -> ViewConfig {
    ViewConfig::new(vec![
        LayerConfig::new("l0", "roads", 0),
        LayerConfig::new("l1", "roads", 1),
    ])
}

fn view(config: ViewConfig, layers: &Layers) -> View {
    let view = View::new(Handle::current());
    view.initialize(config, layers.sessions(Duration::ZERO)).unwrap();
    view
}

// =============================================================================
// Merge Precedence Tests
// =============================================================================

/// Both layers return f1; the lower priority value wins.
#[tokio::test]
async fn test_lower_priority_wins() {
    let layers = Layers::new();
    let view = view(config(), &layers);

    let rows = view.read(["roads"], ReadFilter::all()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "f1");
    assert_eq!(version(&rows[0]), "A");
    assert_eq!(rows[1].id, "f2");
    assert_eq!(version(&rows[1]), "B");
}

/// Declaration order does not matter, only priority values.
#[tokio::test]
async fn test_declaration_order_irrelevant() {
    let layers = Layers::new();
    let reversed = ViewConfig::new(vec![
        LayerConfig::new("l1", "roads", 1),
        LayerConfig::new("l0", "roads", 0),
    ]);
    let view = view(reversed, &layers);

    let rows = view.read(["roads"], ReadFilter::all()).await.unwrap();
    assert_eq!(version(&rows[0]), "A");
    assert_eq!(view.layers()[0].storage(), "l0");
}

/// Latest-modified policy prefers the newest row regardless of priority.
#[tokio::test]
async fn test_latest_modified_policy() {
    use chrono::{TimeZone, Utc};

    let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let new = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let layers = Layers {
        l0: roads("l0", vec![row("f1", "A").with_updated_at(old)]),
        l1: roads("l1", vec![row("f1", "B").with_updated_at(new)]),
    };
    let view = view(config().with_merge(MergePolicy::LatestModified), &layers);

    let rows = view.read(["roads"], ReadFilter::all()).await.unwrap();
    assert_eq!(version(&rows[0]), "B");
}

// =============================================================================
// Backfill Tests
// =============================================================================

/// f2 is only in L1; with both layers obligatory, L0 is asked for f2.
#[tokio::test]
async fn test_missing_obligatory_layer_is_backfilled() {
    // The primary read filters on version B, so L0 contributes nothing
    let layers = Layers {
        l0: roads("l0", vec![row("f1", "A"), row("f2", "A")]),
        ..Layers::new()
    };

    let config = config()
        .with_obligatory(LayerId::new("l0", "roads"))
        .with_obligatory(LayerId::new("l1", "roads"));
    let view = view(config, &layers);

    let outcome = view
        .execute(&ViewRequest::read(
            ["roads"],
            ReadFilter::all().with_property("version", json!("B")),
        ))
        .await
        .unwrap();

    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.backfilled, 2);
    assert_eq!(version(outcome.get("f2").unwrap()), "A");
    assert_eq!(outcome.features["f2"].layer().storage(), "l0");
}

/// The resolver reports exactly the absent obligatory layer.
#[test]
fn test_resolve_reports_absent_layer() {
    let l0 = Arc::new(ViewLayer::new("l0", "roads", 0));
    let l1 = Arc::new(ViewLayer::new("l1", "roads", 1));
    let resolver = ObligatoryLayers::new([Arc::clone(&l0), Arc::clone(&l1)]);

    let group = vec![LayerResult::new(row("f2", "B"), Arc::clone(&l1))];
    let missing = resolver.resolve(&group).unwrap();

    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].layer.id(), l0.id());
    assert_eq!(missing[0].feature_id, "f2");
}

/// Backfill finding nothing keeps the primary result and does not loop.
#[tokio::test]
async fn test_single_backfill_round() {
    let layers = Layers::new();
    let metrics = Arc::new(FederationMetrics::new());
    let view = View::new(Handle::current()).with_telemetry(metrics.clone());
    view.initialize(
        config().with_obligatory(LayerId::new("l0", "roads")),
        layers.sessions(Duration::ZERO),
    )
    .unwrap();

    let rows = view.read(["roads"], ReadFilter::all()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(version(&rows[1]), "B");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.rounds_completed, 2);
    assert_eq!(snapshot.rounds_failed, 0);
    assert_eq!(snapshot.backfill_rounds, 1);
}

/// An obligatory layer in another collection stays out of a roads read.
#[tokio::test]
async fn test_obligatory_layer_in_other_collection_not_backfilled() {
    let roads = Arc::new(MemoryStorage::new("a").with_features("roads", vec![row("r1", "road")]));
    let rails = Arc::new(MemoryStorage::new("b").with_features("rails", vec![row("r1", "rail")]));
    let sessions = Arc::new(
        MemorySessionFactory::new()
            .with_storage(roads, Duration::ZERO)
            .with_storage(rails, Duration::ZERO),
    );

    let config = ViewConfig::new(vec![
        LayerConfig::new("a", "roads", 1),
        LayerConfig::new("b", "rails", 0),
    ])
    .with_obligatory(LayerId::new("b", "rails"));
    let view = View::new(Handle::current());
    view.initialize(config, sessions).unwrap();

    let outcome = view
        .execute(&ViewRequest::read(["roads"], ReadFilter::all()))
        .await
        .unwrap();
    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.backfilled, 0);
    assert_eq!(outcome.features["r1"].layer().storage(), "a");
    assert_eq!(version(outcome.get("r1").unwrap()), "road");

    // Addressing both collections brings rails back in
    let outcome = view
        .execute(&ViewRequest::read(["roads", "rails"], ReadFilter::all()))
        .await
        .unwrap();
    assert_eq!(outcome.features["r1"].layer().storage(), "b");
}

// =============================================================================
// Failure Tests
// =============================================================================

/// One failing layer out of three fails the request; nothing partial leaks.
#[tokio::test]
async fn test_failing_layer_fails_request() {
    let layers = Layers::new();
    let broken = Arc::new(MemoryStorage::new("l2").with_features("roads", vec![row("f3", "C")]));
    broken.inject_failure(Some("connection reset"));

    let sessions = Arc::new(
        MemorySessionFactory::new()
            .with_storage(Arc::clone(&layers.l0), Duration::ZERO)
            .with_storage(Arc::clone(&layers.l1), Duration::ZERO)
            .with_storage(broken, Duration::ZERO),
    );
    let view = View::new(Handle::current());
    let mut config = config();
    config.layers.push(LayerConfig::new("l2", "roads", 2));
    view.initialize(config, sessions).unwrap();

    let err = view.read(["roads"], ReadFilter::all()).await.unwrap_err();
    assert_eq!(err.code(), "LAYERVIEW_AGGREGATE_FAILURE");
    match &err {
        ViewError::Aggregate { stage, source } => {
            assert_eq!(*stage, ViewState::FannedOut);
            assert!(matches!(**source, ViewError::Execution { .. }));
        }
        other => panic!("expected aggregate, got {:?}", other),
    }
}

/// A layer slower than its statement timeout fails the round.
#[tokio::test]
async fn test_slow_layer_times_out() {
    let layers = Layers::new();
    layers.l1.inject_latency(Duration::from_secs(30));
    let view = View::new(Handle::current());
    view.initialize(config(), layers.sessions(Duration::from_millis(50))).unwrap();

    let err = view.read(["roads"], ReadFilter::all()).await.unwrap_err();
    assert!(matches!(err.root_cause(), ViewError::Timeout { deadline_ms: 50, .. }));
}

/// Using a view before initialization is a configuration error.
#[tokio::test]
async fn test_uninitialized_view() {
    let view = View::new(Handle::current());
    let err = view.write(vec![row("f9", "W")]).await.unwrap_err();
    assert_eq!(err.code(), "LAYERVIEW_CONFIGURATION");
}

// =============================================================================
// Deadline Tests
// =============================================================================

/// All statement timeouts zero: the round runs under the default deadline.
#[tokio::test]
async fn test_zero_timeouts_use_default_deadline() {
    let layers = Layers::new();
    let sessions = layers.sessions(Duration::ZERO);
    let executor = FanoutExecutor::new(Handle::current(), FanoutConfig::default());

    let requests: Vec<LayerRequest> = (0..3)
        .map(|i| {
            let layer = Arc::new(ViewLayer::new("l0", "roads", i));
            let session = sessions.open(&layer).unwrap();
            LayerRequest::new(layer, session, ViewOperation::Read(ReadFilter::all()))
        })
        .collect();

    assert_eq!(executor.deadline_for(&requests), DEFAULT_ROUND_DEADLINE);
    assert_eq!(DEFAULT_ROUND_DEADLINE, Duration::from_secs(600));
    assert_eq!(executor.run(requests).await.unwrap()["f1"].len(), 3);
}

// =============================================================================
// Write Tests
// =============================================================================

/// Writes land in the write layer and come back merged.
#[tokio::test]
async fn test_write_through_view() {
    let layers = Layers::new();
    let config = config()
        .with_write_layer(LayerId::new("l1", "roads"))
        .with_obligatory(LayerId::new("l0", "roads"));
    let view = view(config, &layers);

    let rows = view.write(vec![row("f1", "W"), row("f5", "W")]).await.unwrap();
    assert_eq!(rows.len(), 2);
    // L0 still outranks the written f1
    assert_eq!(version(&rows[0]), "A");
    assert_eq!(version(&rows[1]), "W");

    assert_eq!(layers.l1.count("roads"), Some(3));
    assert!(layers.l0.get("roads", "f5").is_none());
}

// =============================================================================
// Idempotence Tests
// =============================================================================

/// Repeated runs over unchanged layers give the same merged output.
#[tokio::test]
async fn test_merged_output_is_stable() {
    let layers = Layers::new();
    layers.l0.inject_latency(Duration::from_millis(5));
    let view = view(config(), &layers);

    let first = view.read(Vec::<String>::new(), ReadFilter::all()).await.unwrap();
    for _ in 0..5 {
        let again = view.read(Vec::<String>::new(), ReadFilter::all()).await.unwrap();
        assert_eq!(again, first);
    }
}

/// query_in_parallel merges caller-built requests.
#[tokio::test]
async fn test_query_in_parallel() {
    let layers = Layers::new();
    let view = view(config(), &layers);
    let sessions = layers.sessions(Duration::ZERO);

    let requests = view
        .layers()
        .iter()
        .map(|layer| {
            let session = sessions.open(layer).unwrap();
            LayerRequest::by_id(Arc::clone(layer), session, "f1")
        })
        .collect();

    let merged = view.query_in_parallel(requests).await.unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged["f1"].priority(), 0);
}
