//! Tessera: split a source image into a grid of tiles, collect replacement
//! tiles from independent editors, and rebuild the full-resolution composite.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera::{EngineSettings, Instance, Location, Session, Workspace};
//!
//! # fn main() -> tessera::Result<()> {
//! let workspace = Workspace::new(EngineSettings::default())?;
//! let instance = Arc::new(Instance::create(&workspace, "assets/paper4.jpg", 6, 6)?);
//! instance.rebuild_composite()?;
//!
//! let session = Session::create(&instance, Location::new(2, 1))?;
//! let background = session.read_background()?;
//! session.submit_edit(&background)?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod compositor;
pub mod error;
pub mod grid;
pub mod instance;
pub mod logger;
pub mod session;
pub mod settings;
pub mod store;
pub mod tiles;
pub mod workspace;

pub use compositor::{Composite, CompositeOptions};
pub use error::{Error, Result};
pub use grid::{GridGeometry, Location};
pub use instance::{Instance, InstanceRecord};
pub use session::{Session, SessionRecord};
pub use settings::EngineSettings;
pub use store::{BlobKey, BlobStore, StoreError};
pub use tiles::TileStore;
pub use workspace::{RebuildOutcome, Workspace};
