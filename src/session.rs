//! Editing sessions: one instance, one grid cell.
//!
//! A session hands the editor a starting image (the "background") and is the
//! only path through which edited tiles enter an instance.

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;
use crate::error::{Error, Result};
use crate::grid::Location;
use crate::instance::Instance;
use crate::store::BlobKey;
use crate::workspace::{RebuildOutcome, Workspace};

/// Persisted session record (`sessions/{id}/session`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub location: Location,
}

#[derive(Clone, Debug)]
pub struct Session {
    id: Uuid,
    instance: Arc<Instance>,
    location: Location,
}

impl Session {
    /// Open a new session on `location` and materialize its background.
    ///
    /// The location is checked before anything is written, so a rejected
    /// session leaves no trace in the store.
    pub fn create(instance: &Arc<Instance>, location: Location) -> Result<Self> {
        instance.geometry()?.validate(location)?;

        let session = Self {
            id: Uuid::new_v4(),
            instance: instance.clone(),
            location,
        };
        session.initialize_background()?;
        session.save()?;
        info!("Created session {} for {} on instance {}", session.id, location, instance.id());
        Ok(session)
    }

    /// Reopen a session of `instance`.
    pub fn open(instance: &Arc<Instance>, id: Uuid) -> Result<Self> {
        let key = BlobKey::session_record(instance.id(), id);
        let bytes = instance
            .workspace()
            .store()
            .read(&key)?
            .ok_or(Error::SessionNotFound(id))?;
        let record: SessionRecord = serde_json::from_slice(&bytes).map_err(|source| Error::Metadata {
            key: key.to_string(),
            source,
        })?;
        if record.id != id || record.instance_id != instance.id() {
            return Err(Error::SessionNotFound(id));
        }
        info!("Loaded session {} for {}", id, record.location);
        Ok(Self {
            id,
            instance: instance.clone(),
            location: record.location,
        })
    }

    /// Locate a session without knowing its instance.
    pub fn find(workspace: &Arc<Workspace>, id: Uuid) -> Result<Self> {
        for instance_id in workspace.instance_ids()? {
            if workspace.store().exists(&BlobKey::session_record(instance_id, id)) {
                let instance = Arc::new(Instance::open(workspace, instance_id)?);
                return Self::open(&instance, id);
            }
        }
        Err(Error::SessionNotFound(id))
    }

    fn save(&self) -> Result<()> {
        let key = BlobKey::session_record(self.instance.id(), self.id);
        let json = serde_json::to_vec_pretty(&self.record()).map_err(|source| Error::Metadata {
            key: key.to_string(),
            source,
        })?;
        self.instance.workspace().store().write(&key, &json)?;
        Ok(())
    }

    fn background_key(&self) -> BlobKey {
        BlobKey::session_background(self.instance.id(), self.id)
    }

    /// Existing override bytes verbatim, else a fresh crop of the source.
    fn initialize_background(&self) -> Result<()> {
        let store = self.instance.workspace().store();
        if let Some(bytes) = self.instance.tile(self.location)? {
            info!("Using existing tile image for {}", self.location);
            store.write(&self.background_key(), &bytes)?;
            return Ok(());
        }

        info!("No existing tile for {}, generating a background from source", self.location);
        let crop = self.instance.source_crop(self.location)?;
        let quality = self.instance.workspace().settings().background_quality;
        store.write(&self.background_key(), &codec::encode_jpeg(&crop, quality)?)?;
        Ok(())
    }

    // ---- accessors ----------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            instance_id: self.instance.id(),
            location: self.location,
        }
    }

    // ---- operations ---------------------------------------------------------

    pub fn read_background(&self) -> Result<Vec<u8>> {
        self.instance
            .workspace()
            .store()
            .read(&self.background_key())?
            .ok_or(Error::BackgroundNotFound(self.id))
    }

    /// Accept a finished edit: raw image bytes, bare base64, or a data-URI.
    ///
    /// The payload is validated before anything is written. The tile is
    /// stored and the composite rebuilt; the session background is refreshed
    /// only once that has succeeded.
    pub fn submit_edit(&self, payload: &[u8]) -> Result<RebuildOutcome> {
        let bytes = codec::normalize_payload(payload)?;
        let outcome = self.instance.apply_tile_edit(self.location, &bytes)?;
        self.instance.workspace().store().write(&self.background_key(), &bytes)?;
        Ok(outcome)
    }
}
