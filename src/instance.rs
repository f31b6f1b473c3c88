use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;
use crate::compositor::{self, Composite};
use crate::error::{Error, Result};
use crate::grid::{GridGeometry, Location};
use crate::store::BlobKey;
use crate::workspace::{RebuildOutcome, Workspace};

/// Persisted instance metadata. Field names match the `instance` JSON file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub id: Uuid,
    pub source_image_path: PathBuf,
    pub source_image_width: u32,
    pub source_image_height: u32,
    pub step_count_x: u32,
    pub step_count_y: u32,
    pub step_size_x: u32,
    pub step_size_y: u32,
}

impl InstanceRecord {
    fn from_geometry(id: Uuid, source_image_path: PathBuf, g: &GridGeometry) -> Self {
        Self {
            id,
            source_image_path,
            source_image_width: g.image_width,
            source_image_height: g.image_height,
            step_count_x: g.step_count_x,
            step_count_y: g.step_count_y,
            step_size_x: g.step_size_x,
            step_size_y: g.step_size_y,
        }
    }
}

/// One source image, its grid, and its tile overrides.
///
/// Geometry is derived once at creation and read back verbatim on open.
#[derive(Clone, Debug)]
pub struct Instance {
    record: InstanceRecord,
    workspace: Arc<Workspace>,
}

impl Instance {
    /// Decode the source, derive the grid, and persist a new instance.
    pub fn create(
        workspace: &Arc<Workspace>,
        source_image_path: impl AsRef<Path>,
        step_count_x: u32,
        step_count_y: u32,
    ) -> Result<Self> {
        let path = source_image_path.as_ref();
        GridGeometry::check_counts(step_count_x, step_count_y)?;

        let source = codec::decode_file(path)?;
        info!("Source image {}: {}x{}", path.display(), source.width(), source.height());
        let geometry = GridGeometry::derive(source.width(), source.height(), step_count_x, step_count_y)?;

        let instance = Self {
            record: InstanceRecord::from_geometry(Uuid::new_v4(), path.to_path_buf(), &geometry),
            workspace: workspace.clone(),
        };
        instance.save()?;
        info!(
            "New instance {}: {}x{} grid, cells {}x{}",
            instance.id(),
            geometry.step_count_x,
            geometry.step_count_y,
            geometry.step_size_x,
            geometry.step_size_y
        );
        Ok(instance)
    }

    /// Load a persisted instance. A missing record is [`Error::InstanceNotFound`].
    pub fn open(workspace: &Arc<Workspace>, id: Uuid) -> Result<Self> {
        let key = BlobKey::instance_record(id);
        let bytes = workspace.store().read(&key)?.ok_or(Error::InstanceNotFound(id))?;
        let mut record: InstanceRecord = serde_json::from_slice(&bytes).map_err(|source| Error::Metadata {
            key: key.to_string(),
            source,
        })?;
        if record.id != id {
            warn!("instance record under {} claims id {}; using the key", id, record.id);
            record.id = id;
        }
        Ok(Self {
            record,
            workspace: workspace.clone(),
        })
    }

    /// Like [`Instance::open`], but a missing record yields a bare instance
    /// (see [`Instance::is_configured`]) instead of an error.
    pub fn open_or_bare(workspace: &Arc<Workspace>, id: Uuid) -> Result<Self> {
        match Self::open(workspace, id) {
            Err(Error::InstanceNotFound(_)) => Ok(Self {
                record: InstanceRecord { id, ..InstanceRecord::default() },
                workspace: workspace.clone(),
            }),
            other => other,
        }
    }

    fn save(&self) -> Result<()> {
        let key = BlobKey::instance_record(self.id());
        let json = serde_json::to_vec_pretty(&self.record).map_err(|source| Error::Metadata {
            key: key.to_string(),
            source,
        })?;
        self.workspace.store().write(&key, &json)?;
        Ok(())
    }

    // ---- accessors ----------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn record(&self) -> &InstanceRecord {
        &self.record
    }

    pub fn source_image_path(&self) -> &Path {
        &self.record.source_image_path
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// False for a bare instance returned by [`Instance::open_or_bare`].
    pub fn is_configured(&self) -> bool {
        self.record.step_count_x > 0 && self.record.step_count_y > 0
    }

    /// The persisted geometry (never re-derived from the source).
    pub fn geometry(&self) -> Result<GridGeometry> {
        let r = &self.record;
        GridGeometry::check_counts(r.step_count_x, r.step_count_y)?;
        Ok(GridGeometry {
            image_width: r.source_image_width,
            image_height: r.source_image_height,
            step_count_x: r.step_count_x,
            step_count_y: r.step_count_y,
            step_size_x: r.step_size_x,
            step_size_y: r.step_size_y,
        })
    }

    // ---- tiles --------------------------------------------------------------

    pub fn tile(&self, location: Location) -> Result<Option<Vec<u8>>> {
        Ok(self.workspace.tiles().get(self.id(), location)?)
    }

    pub fn tile_locations(&self) -> Result<Vec<Location>> {
        Ok(self.workspace.tiles().locations(self.id())?)
    }

    /// Store an override and rebuild the composite.
    pub fn apply_tile_edit(&self, location: Location, image_bytes: &[u8]) -> Result<RebuildOutcome> {
        self.geometry()?.validate(location)?;
        self.workspace.tiles().put(self.id(), location, image_bytes)?;
        info!("Saved tile {} for instance {}", location, self.id());
        self.rebuild_composite()
    }

    // ---- composite ----------------------------------------------------------

    pub fn decode_source(&self) -> Result<RgbaImage> {
        codec::decode_file(self.source_image_path())
    }

    /// Source pixels of one cell.
    pub fn source_crop(&self, location: Location) -> Result<RgbaImage> {
        let geometry = self.geometry()?;
        geometry.validate(location)?;
        Ok(compositor::crop_cell(&self.decode_source()?, &geometry, location))
    }

    /// Render the composite from current state without persisting it.
    pub fn render(&self) -> Result<Composite> {
        let geometry = self.geometry()?;
        let source = self.decode_source()?;
        let overrides = self.workspace.tiles().list(self.id())?;
        Ok(compositor::composite(
            &source,
            &geometry,
            &overrides,
            self.workspace.settings().composite_options(),
        ))
    }

    /// Render, encode, and atomically replace the persisted composite.
    /// Serialized per instance; a failure leaves the previous artifact intact.
    pub fn rebuild_composite(&self) -> Result<RebuildOutcome> {
        let gate = self.workspace.gate(self.id());
        let outcome = gate.run(|| {
            let composite = self.render()?;
            let quality = self.workspace.settings().composite_quality;
            let bytes = codec::encode_jpeg(&composite.image, quality)?;
            let key = BlobKey::composite(self.id());
            self.workspace.store().write(&key, &bytes)?;
            info!(
                "Saved {} ({} override(s), {} fallback(s))",
                key,
                composite.overridden.len(),
                composite.fallbacks.len()
            );
            Ok(())
        })?;
        if outcome == RebuildOutcome::Coalesced {
            info!("Composite for {} already covers this edit", self.id());
        }
        Ok(outcome)
    }

    /// The persisted composite, or [`Error::CompositeNotReady`].
    pub fn composite_bytes(&self) -> Result<Vec<u8>> {
        self.workspace
            .store()
            .read(&BlobKey::composite(self.id()))?
            .ok_or(Error::CompositeNotReady(self.id()))
    }
}
