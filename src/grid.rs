// ============================================================================
// GRID GEOMETRY: partition of a source image into equal-size cells
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A grid cell coordinate (column, row).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub x: u32,
    pub y: u32,
}

impl Location {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Parses the `x,y` form used as the tile storage key.
impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'x,y', got '{}'", s))?;
        let x = x.trim().parse::<u32>().map_err(|e| format!("bad column '{}': {}", x, e))?;
        let y = y.trim().parse::<u32>().map_err(|e| format!("bad row '{}': {}", y, e))?;
        Ok(Self { x, y })
    }
}

/// Pixel rectangle of one cell in source-image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Grid partition derived from the source dimensions and the step counts.
///
/// Step sizes come from truncating division, so the grid may leave a strip on
/// the right and bottom edges that no cell covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridGeometry {
    pub image_width: u32,
    pub image_height: u32,
    pub step_count_x: u32,
    pub step_count_y: u32,
    pub step_size_x: u32,
    pub step_size_y: u32,
}

impl GridGeometry {
    /// Derive the geometry. Zero step counts are rejected up front.
    pub fn derive(image_width: u32, image_height: u32, step_count_x: u32, step_count_y: u32) -> Result<Self> {
        Self::check_counts(step_count_x, step_count_y)?;
        Ok(Self {
            image_width,
            image_height,
            step_count_x,
            step_count_y,
            step_size_x: image_width / step_count_x,
            step_size_y: image_height / step_count_y,
        })
    }

    pub fn check_counts(step_count_x: u32, step_count_y: u32) -> Result<()> {
        if step_count_x == 0 || step_count_y == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "grid step counts must be positive, got {}x{}",
                step_count_x, step_count_y
            )));
        }
        Ok(())
    }

    pub fn contains(&self, location: Location) -> bool {
        location.x < self.step_count_x && location.y < self.step_count_y
    }

    /// Bounds check used by every write path.
    pub fn validate(&self, location: Location) -> Result<()> {
        if self.contains(location) {
            Ok(())
        } else {
            Err(Error::InvalidLocation {
                location,
                cols: self.step_count_x,
                rows: self.step_count_y,
            })
        }
    }

    /// Top-left pixel of a cell. Not bounds checked.
    #[inline]
    pub fn origin(&self, location: Location) -> (u32, u32) {
        (location.x * self.step_size_x, location.y * self.step_size_y)
    }

    pub fn cell_rect(&self, location: Location) -> CellRect {
        let (x, y) = self.origin(location);
        CellRect {
            x,
            y,
            width: self.step_size_x,
            height: self.step_size_y,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.step_count_x as usize * self.step_count_y as usize
    }

    /// Every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Location> + '_ {
        (0..self.step_count_y).flat_map(move |y| (0..self.step_count_x).map(move |x| Location { x, y }))
    }

    /// Width covered by grid cells; the rest of the image is remainder strip.
    pub fn covered_width(&self) -> u32 {
        self.step_size_x * self.step_count_x
    }

    pub fn covered_height(&self) -> u32 {
        self.step_size_y * self.step_count_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_sizes_truncate() {
        let g = GridGeometry::derive(1000, 701, 6, 4).unwrap();
        assert_eq!(g.step_size_x, 166);
        assert_eq!(g.step_size_y, 175);
        assert_eq!(g.covered_width(), 996);
        assert_eq!(g.covered_height(), 700);
    }

    #[test]
    fn coverage_never_exceeds_image() {
        for w in [1u32, 7, 64, 599, 1200, 5544] {
            for h in [1u32, 9, 100, 800, 3744] {
                for cx in 1..=9 {
                    for cy in 1..=9 {
                        let g = GridGeometry::derive(w, h, cx, cy).unwrap();
                        assert!(g.step_size_x * cx <= w);
                        assert!(g.step_size_y * cy <= h);
                    }
                }
            }
        }
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(matches!(GridGeometry::derive(100, 100, 0, 3), Err(Error::InvalidConfiguration(_))));
        assert!(matches!(GridGeometry::derive(100, 100, 3, 0), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn origins_follow_step_sizes() {
        let g = GridGeometry::derive(1200, 800, 4, 4).unwrap();
        assert_eq!(g.origin(Location::new(2, 1)), (600, 200));
        assert_eq!(
            g.cell_rect(Location::new(3, 3)),
            CellRect { x: 900, y: 600, width: 300, height: 200 }
        );
    }

    #[test]
    fn cells_are_row_major() {
        let g = GridGeometry::derive(30, 20, 3, 2).unwrap();
        let cells: Vec<_> = g.cells().collect();
        assert_eq!(cells.len(), g.cell_count());
        assert_eq!(cells[0], Location::new(0, 0));
        assert_eq!(cells[1], Location::new(1, 0));
        assert_eq!(cells[3], Location::new(0, 1));
    }

    #[test]
    fn validate_reports_grid_size() {
        let g = GridGeometry::derive(60, 60, 6, 6).unwrap();
        assert!(g.validate(Location::new(5, 5)).is_ok());
        match g.validate(Location::new(6, 0)) {
            Err(Error::InvalidLocation { location, cols, rows }) => {
                assert_eq!(location, Location::new(6, 0));
                assert_eq!((cols, rows), (6, 6));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn location_key_round_trip() {
        let loc: Location = "12, 3".parse().unwrap();
        assert_eq!(loc, Location::new(12, 3));
        assert_eq!(loc.to_string(), "12,3");
        assert!("12".parse::<Location>().is_err());
        assert!("a,b".parse::<Location>().is_err());
    }
}
