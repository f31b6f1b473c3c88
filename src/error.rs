use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::grid::Location;
use crate::store::StoreError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the engine reports to its callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source image {} is unreadable: {reason}", path.display())]
    SourceImageUnreadable { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("location {location} is outside the {cols}x{rows} grid")]
    InvalidLocation { location: Location, cols: u32, rows: u32 },

    #[error("instance {0} not found")]
    InstanceNotFound(Uuid),

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("composite for instance {0} has not been built yet")]
    CompositeNotReady(Uuid),

    #[error("background image for session {0} is missing")]
    BackgroundNotFound(Uuid),

    #[error("malformed image payload: {0}")]
    MalformedImagePayload(String),

    #[error("could not read {}: {source}", path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recoverable: the compositor falls back to source pixels for the cell.
    #[error("tile {location} could not be decoded: {reason}")]
    TileDecode { location: Location, reason: String },

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("corrupt metadata record {key}: {source}")]
    Metadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
