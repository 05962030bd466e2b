use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use flowcast_core::dataset::{Dataset, DatasetSummary};
use flowcast_core::error::Result;

use crate::config::ServerConfig;
use crate::emitter::CancelFlag;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub datasets: Arc<DatasetRegistry>,
    pub playbacks: PlaybackRegistry,
}

impl AppState {
    /// Load the built-in datasets plus the configured dataset file, if any.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let mut datasets = DatasetRegistry::new();
        for dataset in Dataset::builtin()? {
            datasets.insert(dataset);
        }
        if let Some(path) = &config.dataset_file {
            let dataset = Dataset::from_file(path)?;
            tracing::info!(name = dataset.name(), events = dataset.len(), "registered dataset file");
            datasets.insert(dataset);
        }
        Ok(Self::with_datasets(config, datasets))
    }

    pub fn with_datasets(config: ServerConfig, datasets: DatasetRegistry) -> Self {
        Self {
            config: Arc::new(config),
            datasets: Arc::new(datasets),
            playbacks: PlaybackRegistry::new(),
        }
    }
}

/// Named datasets available for playback.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, Arc<Dataset>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset, replacing any dataset with the same name.
    pub fn insert(&mut self, dataset: Dataset) {
        self.datasets
            .insert(dataset.name().to_string(), Arc::new(dataset));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Dataset>> {
        self.datasets.get(name).cloned()
    }

    pub fn summaries(&self) -> Vec<DatasetSummary> {
        self.datasets.values().map(|d| d.summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Playbacks currently streaming, so they can be cancelled on shutdown.
#[derive(Debug, Clone, Default)]
pub struct PlaybackRegistry {
    active: Arc<RwLock<HashMap<Uuid, CancelFlag>>>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new playback. Dropping the guard cancels and
    /// unregisters it.
    pub fn register(&self) -> PlaybackGuard {
        let id = Uuid::new_v4();
        let cancel = CancelFlag::new();
        self.write().insert(id, cancel.clone());
        PlaybackGuard {
            id,
            cancel,
            registry: self.clone(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.read().len()
    }

    pub fn cancel_all(&self) {
        let active = self.read();
        for cancel in active.values() {
            cancel.cancel();
        }
        if !active.is_empty() {
            tracing::info!(count = active.len(), "cancelled active playbacks");
        }
    }

    fn remove(&self, id: &Uuid) {
        self.write().remove(id);
    }

    // The map stays consistent even if a holder panicked, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, CancelFlag>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, CancelFlag>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ownership of one registered playback.
#[derive(Debug)]
pub struct PlaybackGuard {
    id: Uuid,
    cancel: CancelFlag,
    registry: PlaybackRegistry,
}

impl PlaybackGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl Drop for PlaybackGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_datasets_registered() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        assert!(state.datasets.get("deep_research").is_some());
        assert!(state.datasets.get("quickstart").is_some());
        assert!(state.datasets.get("nope").is_none());
    }

    #[test]
    fn dataset_file_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(
            &path,
            r#"[{"id":"x","type":"flow_completed","timestamp":0,"data":{"message":"hi"}}]"#,
        )
        .unwrap();

        let state = AppState::new(ServerConfig::default().with_dataset_file(&path)).unwrap();
        assert_eq!(state.datasets.len(), 3);
        assert_eq!(state.datasets.get("custom").unwrap().len(), 1);
    }

    #[test]
    fn invalid_dataset_file_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[{").unwrap();
        assert!(AppState::new(ServerConfig::default().with_dataset_file(&path)).is_err());
    }

    #[test]
    fn summaries_are_sorted_by_name() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        let names: Vec<String> = state.datasets.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["deep_research", "quickstart"]);
    }

    #[test]
    fn guard_drop_cancels_and_unregisters() {
        let registry = PlaybackRegistry::new();
        let guard = registry.register();
        let flag = guard.cancel_flag();
        assert_eq!(registry.active_count(), 1);

        drop(guard);
        assert!(flag.is_cancelled());
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn cancel_all_reaches_every_playback() {
        let registry = PlaybackRegistry::new();
        let a = registry.register();
        let b = registry.register();
        registry.cancel_all();
        assert!(a.cancel_flag().is_cancelled());
        assert!(b.cancel_flag().is_cancelled());
        assert_eq!(registry.active_count(), 2);
    }
}
