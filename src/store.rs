// ============================================================================
// BLOB STORE: hierarchical key -> bytes, rooted at the data directory
// ============================================================================
//
// Layout under the root:
//   instances/{id}/instance                       metadata record (JSON)
//   instances/{id}/composite.jpg                  rebuilt composite
//   instances/{id}/tiles/{x},{y}.jpg              tile overrides
//   instances/{id}/sessions/{sid}/session         session record (JSON)
//   instances/{id}/sessions/{sid}/background.jpg  session starting image
//
// Writes go to a uniquely named sibling first and are renamed into place, so
// readers only ever see a complete old or a complete new artifact.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::grid::Location;

/// Suffix of in-flight writes. Never returned by `list`.
const TEMP_MARKER: &str = ".partial-";

#[derive(Debug, Error)]
#[error("{op} {key}: {source}")]
pub struct StoreError {
    pub op: &'static str,
    pub key: BlobKey,
    #[source]
    pub source: io::Error,
}

/// A `/`-separated key relative to the store root.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlobKey(String);

impl BlobKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn join(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}/{}", self.0, segment))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // ---- well-known keys ----------------------------------------------------

    pub fn instances() -> Self {
        Self::new("instances")
    }

    pub fn instance_dir(id: Uuid) -> Self {
        Self::instances().join(&id.to_string())
    }

    pub fn instance_record(id: Uuid) -> Self {
        Self::instance_dir(id).join("instance")
    }

    pub fn composite(id: Uuid) -> Self {
        Self::instance_dir(id).join("composite.jpg")
    }

    pub fn tiles_dir(id: Uuid) -> Self {
        Self::instance_dir(id).join("tiles")
    }

    pub fn tile(id: Uuid, location: Location) -> Self {
        Self::tiles_dir(id).join(&format!("{}.jpg", location))
    }

    pub fn sessions_dir(id: Uuid) -> Self {
        Self::instance_dir(id).join("sessions")
    }

    pub fn session_dir(id: Uuid, session: Uuid) -> Self {
        Self::sessions_dir(id).join(&session.to_string())
    }

    pub fn session_record(id: Uuid, session: Uuid) -> Self {
        Self::session_dir(id, session).join("session")
    }

    pub fn session_background(id: Uuid, session: Uuid) -> Self {
        Self::session_dir(id, session).join("background.jpg")
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filesystem-backed blob store. Cheap to clone.
#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, key: &BlobKey) -> PathBuf {
        key.as_str()
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |p, seg| p.join(seg))
    }

    /// `Ok(None)` when the key does not exist; `Err` only for real I/O failures.
    pub fn read(&self, key: &BlobKey) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_of(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError { op: "read", key: key.clone(), source: e }),
        }
    }

    pub fn exists(&self, key: &BlobKey) -> bool {
        self.path_of(key).exists()
    }

    /// Atomically replace the blob at `key`, creating parent namespaces.
    pub fn write(&self, key: &BlobKey, bytes: &[u8]) -> Result<(), StoreError> {
        let err = |op: &'static str| move |source: io::Error| StoreError { op, key: key.clone(), source };

        let dest = self.path_of(key);
        let parent = dest.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(err("create namespace for"))?;

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!("{}{}{}", file_name, TEMP_MARKER, Uuid::new_v4().simple()));

        let written = (|| -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(err("write")(e));
        }

        fs::rename(&tmp, &dest).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            err("replace")(e)
        })
    }

    /// Names of the direct children of `prefix`. A missing prefix is empty.
    pub fn list(&self, prefix: &BlobKey) -> Result<Vec<String>, StoreError> {
        let dir = self.path_of(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
        let entries = glob::glob(&pattern).map_err(|e| StoreError {
            op: "list",
            key: prefix.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError {
                op: "list",
                key: prefix.clone(),
                source: e.into(),
            })?;
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && !name.contains(TEMP_MARKER)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn missing_key_reads_as_none() {
        let (_dir, store) = store();
        assert!(store.read(&BlobKey::new("nope/nothing")).unwrap().is_none());
    }

    #[test]
    fn write_creates_namespace_and_replaces() {
        let (_dir, store) = store();
        let key = BlobKey::new("a/b/c.bin");
        store.write(&key, b"first").unwrap();
        store.write(&key, b"second").unwrap();
        assert_eq!(store.read(&key).unwrap().unwrap(), b"second");
        assert_eq!(store.list(&BlobKey::new("a/b")).unwrap(), vec!["c.bin".to_string()]);
    }

    #[test]
    fn read_of_a_directory_is_an_error() {
        let (_dir, store) = store();
        store.write(&BlobKey::new("d/x"), b"1").unwrap();
        assert!(store.read(&BlobKey::new("d")).is_err());
    }

    #[test]
    fn list_skips_partial_writes() {
        let (dir, store) = store();
        store.write(&BlobKey::new("t/1,1.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("t").join(format!("0,0.jpg{}abc", TEMP_MARKER)), b"y").unwrap();
        assert_eq!(store.list(&BlobKey::new("t")).unwrap(), vec!["1,1.jpg".to_string()]);
        assert!(store.list(&BlobKey::new("missing")).unwrap().is_empty());
    }

    #[test]
    fn well_known_keys() {
        let id = Uuid::nil();
        assert_eq!(
            BlobKey::tile(id, Location::new(2, 1)).as_str(),
            "instances/00000000-0000-0000-0000-000000000000/tiles/2,1.jpg"
        );
    }
}
