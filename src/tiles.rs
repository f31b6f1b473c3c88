//! Tile overrides, keyed by instance and grid location.
//!
//! Absence is the normal state of a tile: it means "no override yet" and the
//! compositor falls back to source pixels.

use std::collections::HashMap;

use log::warn;
use uuid::Uuid;

use crate::grid::Location;
use crate::store::{BlobKey, BlobStore, StoreError};

const TILE_EXT: &str = ".jpg";

#[derive(Clone, Debug)]
pub struct TileStore {
    store: BlobStore,
}

impl TileStore {
    pub fn new(store: BlobStore) -> Self {
        Self { store }
    }

    /// Persist raw encoded bytes for a tile, replacing any previous override.
    pub fn put(&self, instance: Uuid, location: Location, image_bytes: &[u8]) -> Result<(), StoreError> {
        self.store.write(&BlobKey::tile(instance, location), image_bytes)
    }

    pub fn get(&self, instance: Uuid, location: Location) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.read(&BlobKey::tile(instance, location))
    }

    pub fn contains(&self, instance: Uuid, location: Location) -> bool {
        self.store.exists(&BlobKey::tile(instance, location))
    }

    /// Locations that currently have an override, sorted.
    pub fn locations(&self, instance: Uuid) -> Result<Vec<Location>, StoreError> {
        let mut locations: Vec<Location> = self
            .store
            .list(&BlobKey::tiles_dir(instance))?
            .iter()
            .filter_map(|name| parse_tile_name(name))
            .collect();
        locations.sort();
        Ok(locations)
    }

    /// Every stored override with its bytes. Order carries no meaning.
    pub fn list(&self, instance: Uuid) -> Result<HashMap<Location, Vec<u8>>, StoreError> {
        let mut tiles = HashMap::new();
        for location in self.locations(instance)? {
            // A tile may be listed and then replaced; a vanished one is just absent.
            if let Some(bytes) = self.get(instance, location)? {
                tiles.insert(location, bytes);
            }
        }
        Ok(tiles)
    }
}

fn parse_tile_name(name: &str) -> Option<Location> {
    let Some(stem) = name.strip_suffix(TILE_EXT) else {
        warn!("ignoring unexpected file '{}' in tile store", name);
        return None;
    };
    match stem.parse::<Location>() {
        Ok(location) => Some(location),
        Err(e) => {
            warn!("ignoring tile '{}': {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_tile_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = TileStore::new(BlobStore::new(dir.path()));
        let id = Uuid::new_v4();
        assert!(tiles.get(id, Location::new(0, 0)).unwrap().is_none());
        assert!(tiles.list(id).unwrap().is_empty());
    }

    #[test]
    fn put_get_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let tiles = TileStore::new(store.clone());
        let id = Uuid::new_v4();

        tiles.put(id, Location::new(1, 2), b"one").unwrap();
        tiles.put(id, Location::new(0, 0), b"zero").unwrap();
        tiles.put(id, Location::new(1, 2), b"uno").unwrap();
        store.write(&BlobKey::tiles_dir(id).join("notes.txt"), b"stray").unwrap();
        store.write(&BlobKey::tiles_dir(id).join("x,y.jpg"), b"stray").unwrap();

        assert_eq!(tiles.get(id, Location::new(1, 2)).unwrap().unwrap(), b"uno");
        assert!(tiles.contains(id, Location::new(0, 0)));
        assert_eq!(tiles.locations(id).unwrap(), vec![Location::new(0, 0), Location::new(1, 2)]);

        let listed = tiles.list(id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[&Location::new(0, 0)], b"zero");
    }
}
