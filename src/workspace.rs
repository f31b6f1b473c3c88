// ============================================================================
// WORKSPACE: explicit context shared by every entry point
// ============================================================================
//
// Holds the blob store, the settings, and one rebuild gate per instance. There
// is no process-wide default; callers construct a Workspace and pass instance
// ids explicitly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::error::Result;
use crate::settings::EngineSettings;
use crate::store::{BlobKey, BlobStore};
use crate::tiles::TileStore;

#[derive(Debug)]
pub struct Workspace {
    store: BlobStore,
    settings: EngineSettings,
    gates: Mutex<HashMap<Uuid, Arc<RebuildGate>>>,
}

impl Workspace {
    /// Validates the settings; the data root is created lazily on first write.
    pub fn new(settings: EngineSettings) -> Result<Arc<Self>> {
        settings.validate()?;
        Ok(Arc::new(Self {
            store: BlobStore::new(&settings.data_root),
            settings,
            gates: Mutex::new(HashMap::new()),
        }))
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    pub fn tiles(&self) -> TileStore {
        TileStore::new(self.store.clone())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The rebuild gate for an instance; the same gate for every caller.
    pub(crate) fn gate(&self, instance: Uuid) -> Arc<RebuildGate> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.entry(instance).or_default().clone()
    }

    /// Ids of every instance with a persisted record, sorted.
    pub fn instance_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self
            .store
            .list(&BlobKey::instances())?
            .iter()
            .filter_map(|name| Uuid::parse_str(name).ok())
            .filter(|id| self.store.exists(&BlobKey::instance_record(*id)))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// What a call to [`RebuildGate::run`] ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildOutcome {
    Built,
    /// A rebuild that started after this request already covered it.
    Coalesced,
}

/// Serializes composite rebuilds for one instance.
///
/// Callers take a ticket *after* writing their tile. A rebuild records the
/// request count before it reads any tile state and publishes it once the
/// composite is persisted, so the watermark only ever covers edits that are
/// in the composite.
#[derive(Debug, Default)]
pub(crate) struct RebuildGate {
    requested: AtomicU64,
    built: Mutex<u64>,
}

impl RebuildGate {
    pub(crate) fn run(&self, rebuild: impl FnOnce() -> Result<()>) -> Result<RebuildOutcome> {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let mut built = self.lock();
        if *built >= ticket {
            return Ok(RebuildOutcome::Coalesced);
        }
        let target = self.requested.load(Ordering::SeqCst);
        rebuild()?;
        *built = target;
        Ok(RebuildOutcome::Built)
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.built.lock().unwrap_or_else(|e| e.into_inner())
    }
}
