//! CLI command implementations
//!
//! Each command loads the configuration, opens the fixture-backed storages,
//! initializes one view and serves exactly one request before exiting.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::runtime::{Builder, Runtime};

use crate::backend::{MemorySessionFactory, MemoryStorage};
use crate::observability::{log_event, Event};
use crate::view::{FeatureRow, ReadFilter, View, ViewConfig, ViewOutcome, ViewRequest};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_features, write_error, write_response};

/// One storage backing one or more layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file mapping collection name to its features
    pub fixture: PathBuf,

    /// Statement timeout in milliseconds; 0 means none
    #[serde(default)]
    pub statement_timeout_ms: u64,
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// View definition
    pub view: ViewConfig,

    /// Storages by name, as referenced by the view's layers
    pub storages: BTreeMap<String, StorageConfig>,

    /// Directory relative fixture paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        config.validate()?;

        let layers = config.view.layers.len().to_string();
        let storages = config.storages.len().to_string();
        log_event(
            Event::ConfigLoaded,
            &[
                ("path", &path.display().to_string()),
                ("layers", &layers),
                ("storages", &storages),
            ],
        );

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        self.view.validate()?;

        for layer in &self.view.layers {
            if !self.storages.contains_key(&layer.storage) {
                return Err(CliError::config_error(format!(
                    "layer {}/{} references unknown storage '{}'",
                    layer.storage, layer.collection, layer.storage
                )));
            }
        }

        Ok(())
    }

    /// Fixture path of a storage, resolved against the config file
    pub fn fixture_path(&self, storage: &StorageConfig) -> PathBuf {
        if storage.fixture.is_absolute() {
            storage.fixture.clone()
        } else {
            self.base_dir.join(&storage.fixture)
        }
    }

    /// Load every storage from its fixture
    fn open_storages(&self) -> CliResult<BTreeMap<String, Arc<MemoryStorage>>> {
        self.storages
            .iter()
            .map(|(name, storage)| {
                let path = self.fixture_path(storage);
                let content = fs::read_to_string(&path).map_err(|e| {
                    CliError::io_error(format!("Failed to read fixture {}: {}", path.display(), e))
                })?;
                let collections: BTreeMap<String, Vec<FeatureRow>> =
                    serde_json::from_str(&content).map_err(|e| {
                        CliError::config_error(format!("Invalid fixture {}: {}", path.display(), e))
                    })?;
                let storage = MemoryStorage::from_collections(name.clone(), collections);
                Ok((name.clone(), Arc::new(storage)))
            })
            .collect()
    }

    fn session_factory(
        &self,
        storages: &BTreeMap<String, Arc<MemoryStorage>>,
    ) -> MemorySessionFactory {
        storages.iter().fold(MemorySessionFactory::new(), |factory, (name, storage)| {
            let timeout = self
                .storages
                .get(name)
                .map(|s| Duration::from_millis(s.statement_timeout_ms))
                .unwrap_or_default();
            factory.with_storage(Arc::clone(storage), timeout)
        })
    }
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    let result = run_command(cli.command);
    if let Err(e) = &result {
        write_error(e.code_str(), e.message())?;
    }
    result
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let runtime = runtime()?;
    let data = match cmd {
        Command::Query {
            config,
            collections,
            ids,
            limit,
        } => runtime.block_on(query(&config, collections, ids, limit))?,
        Command::Write { config, collection } => {
            let features = read_features()?;
            runtime.block_on(write(&config, &collection, features))?
        }
    };
    write_response(data)
}

fn runtime() -> CliResult<Runtime> {
    Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error(format!("Failed to start runtime: {}", e)))
}

/// Read the merged view
pub async fn query(
    config_path: &Path,
    collections: Vec<String>,
    ids: Vec<String>,
    limit: Option<usize>,
) -> CliResult<Value> {
    let config = Config::load(config_path)?;
    let storages = config.open_storages()?;
    let view = open_view(&config, &storages)?;

    let mut filter = ReadFilter::ids(ids);
    if let Some(limit) = limit {
        filter = filter.with_limit(limit);
    }

    let outcome = view.execute(&ViewRequest::read(collections, filter)).await?;
    Ok(render(outcome))
}

/// Write features to the view's write layer and persist its fixture
pub async fn write(
    config_path: &Path,
    collection: &str,
    features: Vec<FeatureRow>,
) -> CliResult<Value> {
    let config = Config::load(config_path)?;
    let storages = config.open_storages()?;
    let view = open_view(&config, &storages)?;

    let target = config
        .view
        .write_layer
        .clone()
        .or_else(|| view.layers().first().map(|l| l.id().clone()))
        .ok_or_else(|| CliError::config_error("view has no write layer"))?;
    if target.collection != collection {
        return Err(CliError::input_error(format!(
            "write layer {} does not serve collection '{}'",
            target, collection
        )));
    }

    let outcome = view.execute(&ViewRequest::write(features)).await?;

    let written = storages.get(&target.storage);
    if let (Some(storage), Some(storage_config)) = (written, config.storages.get(&target.storage)) {
        let path = config.fixture_path(storage_config);
        let content = serde_json::to_string_pretty(&storage.to_collections())?;
        fs::write(&path, content).map_err(|e| {
            CliError::io_error(format!("Failed to persist fixture {}: {}", path.display(), e))
        })?;
    }

    Ok(render(outcome))
}

fn open_view(config: &Config, storages: &BTreeMap<String, Arc<MemoryStorage>>) -> CliResult<View> {
    let view = View::new(tokio::runtime::Handle::current());
    view.initialize(config.view.clone(), Arc::new(config.session_factory(storages)))?;
    Ok(view)
}

fn render(outcome: ViewOutcome) -> Value {
    let request_id = outcome.request_id.to_string();
    let rounds = outcome.rounds;
    let backfilled = outcome.backfilled;
    let features: Vec<Value> = outcome
        .features
        .into_values()
        .map(|winner| {
            json!({
                "layer": winner.layer().id().to_string(),
                "feature": winner.into_feature(),
            })
        })
        .collect();

    json!({
        "request_id": request_id,
        "rounds": rounds,
        "backfilled": backfilled,
        "features": features,
    })
}
