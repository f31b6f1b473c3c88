// ============================================================================
// COMPOSITOR: source image + tile overrides -> full-resolution composite
// ============================================================================
//
// The canvas starts as a copy of the source, so the strip left uncovered by
// truncating step sizes always shows source pixels. Overrides are decoded in
// parallel (cells are independent) and then applied in row-major order, which
// keeps the result deterministic when an oversized override spills into its
// neighbours.

use std::collections::HashMap;

use image::RgbaImage;
use log::{debug, warn};
use rayon::prelude::*;

use crate::codec;
use crate::error::Error;
use crate::grid::{GridGeometry, Location};

#[derive(Clone, Copy, Debug, Default)]
pub struct CompositeOptions {
    /// Clip each override to its cell's nominal extent. Unclipped, a larger
    /// override runs past its cell until a later cell draws over it.
    pub clip_overrides: bool,
}

/// A rendered composite plus what went into it.
#[derive(Debug)]
pub struct Composite {
    pub image: RgbaImage,
    /// Cells whose pixels came from an override, row-major.
    pub overridden: Vec<Location>,
    /// Cells whose override failed to decode; each holds an [`Error::TileDecode`].
    pub fallbacks: Vec<Error>,
}

enum CellFill {
    Source,
    Override(RgbaImage),
    Fallback(Error),
}

/// Build the composite. The output always has the source image's bounds.
pub fn composite(
    source: &RgbaImage,
    geometry: &GridGeometry,
    overrides: &HashMap<Location, Vec<u8>>,
    options: CompositeOptions,
) -> Composite {
    if (source.width(), source.height()) != (geometry.image_width, geometry.image_height) {
        warn!(
            "source is {}x{} but the grid was derived from {}x{}; compositing onto the source bounds",
            source.width(),
            source.height(),
            geometry.image_width,
            geometry.image_height
        );
    }

    let stray = overrides.keys().filter(|loc| !geometry.contains(**loc)).count();
    if stray > 0 {
        debug!("ignoring {} override(s) outside the {}x{} grid", stray, geometry.step_count_x, geometry.step_count_y);
    }

    let cells: Vec<Location> = geometry.cells().collect();
    let fills: Vec<(Location, CellFill)> = cells
        .into_par_iter()
        .map(|location| {
            let fill = match overrides.get(&location) {
                None => CellFill::Source,
                Some(bytes) => match codec::decode(bytes) {
                    Ok(img) => CellFill::Override(img),
                    Err(e) => CellFill::Fallback(Error::TileDecode {
                        location,
                        reason: e.to_string(),
                    }),
                },
            };
            (location, fill)
        })
        .collect();

    let mut canvas = source.clone();
    let mut overridden = Vec::new();
    let mut fallbacks = Vec::new();

    for (location, fill) in fills {
        let (ox, oy) = geometry.origin(location);
        match fill {
            CellFill::Override(img) => {
                let (w, h) = if options.clip_overrides {
                    (img.width().min(geometry.step_size_x), img.height().min(geometry.step_size_y))
                } else {
                    (img.width(), img.height())
                };
                copy_rect(&mut canvas, &img, 0, 0, w, h, ox, oy);
                overridden.push(location);
            }
            CellFill::Fallback(err) => {
                warn!("{}; using source pixels", err);
                copy_rect(&mut canvas, source, ox, oy, geometry.step_size_x, geometry.step_size_y, ox, oy);
                fallbacks.push(err);
            }
            CellFill::Source => {
                copy_rect(&mut canvas, source, ox, oy, geometry.step_size_x, geometry.step_size_y, ox, oy);
            }
        }
    }

    Composite {
        image: canvas,
        overridden,
        fallbacks,
    }
}

/// Crop one cell out of the source. Parts of the cell beyond the source
/// bounds stay transparent.
pub fn crop_cell(source: &RgbaImage, geometry: &GridGeometry, location: Location) -> RgbaImage {
    let rect = geometry.cell_rect(location);
    let mut out = RgbaImage::new(rect.width.max(1), rect.height.max(1));
    copy_rect(&mut out, source, rect.x, rect.y, rect.width, rect.height, 0, 0);
    out
}

/// Copy a `w × h` block from `src` at `(sx, sy)` into `dst` at `(dx, dy)`,
/// one row slice at a time. The block is clipped to both images.
#[allow(clippy::too_many_arguments)]
fn copy_rect(dst: &mut RgbaImage, src: &RgbaImage, sx: u32, sy: u32, w: u32, h: u32, dx: u32, dy: u32) {
    if sx >= src.width() || sy >= src.height() || dx >= dst.width() || dy >= dst.height() {
        return;
    }
    let w = w.min(src.width() - sx).min(dst.width() - dx) as usize;
    let h = h.min(src.height() - sy).min(dst.height() - dy) as usize;
    if w == 0 || h == 0 {
        return;
    }

    let src_stride = src.width() as usize * 4;
    let dst_stride = dst.width() as usize * 4;
    let byte_len = w * 4;
    let src_raw = src.as_raw();
    let dst_raw: &mut [u8] = dst.as_mut();

    for row in 0..h {
        let src_start = (sy as usize + row) * src_stride + sx as usize * 4;
        let dst_start = (dy as usize + row) * dst_stride + dx as usize * 4;
        dst_raw[dst_start..dst_start + byte_len].copy_from_slice(&src_raw[src_start..src_start + byte_len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]))
    }

    fn png(img: &RgbaImage) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn no_overrides_reproduces_source() {
        let source = gradient(103, 61);
        let g = GridGeometry::derive(103, 61, 6, 6).unwrap();
        let out = composite(&source, &g, &HashMap::new(), CompositeOptions::default());
        assert_eq!(out.image, source);
        assert!(out.overridden.is_empty());
        assert!(out.fallbacks.is_empty());
    }

    #[test]
    fn override_fills_its_cell_only() {
        let source = gradient(120, 80);
        let g = GridGeometry::derive(120, 80, 4, 4).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(Location::new(2, 1), png(&RgbaImage::from_pixel(30, 20, RED)));

        let out = composite(&source, &g, &overrides, CompositeOptions::default());
        assert_eq!(out.overridden, vec![Location::new(2, 1)]);
        for y in 0..80 {
            for x in 0..120 {
                let inside = (60..90).contains(&x) && (20..40).contains(&y);
                let expected = if inside { RED } else { *source.get_pixel(x, y) };
                assert_eq!(*out.image.get_pixel(x, y), expected, "pixel {},{}", x, y);
            }
        }
    }

    #[test]
    fn smaller_override_partially_fills() {
        let source = gradient(40, 40);
        let g = GridGeometry::derive(40, 40, 2, 2).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(Location::new(1, 1), png(&RgbaImage::from_pixel(5, 5, RED)));

        let out = composite(&source, &g, &overrides, CompositeOptions::default());
        assert_eq!(*out.image.get_pixel(24, 24), RED);
        assert_eq!(*out.image.get_pixel(25, 25), *source.get_pixel(25, 25));
    }

    #[test]
    fn oversized_override_spills_then_later_cells_win() {
        let source = gradient(40, 20);
        let g = GridGeometry::derive(40, 20, 2, 1).unwrap();
        let mut overrides = HashMap::new();
        // 30 px wide: 10 px past its own 20 px cell into cell (1,0), which has
        // no override and is restored from source afterwards.
        overrides.insert(Location::new(0, 0), png(&RgbaImage::from_pixel(30, 20, RED)));
        let out = composite(&source, &g, &overrides, CompositeOptions::default());
        assert_eq!(*out.image.get_pixel(19, 5), RED);
        assert_eq!(*out.image.get_pixel(25, 5), *source.get_pixel(25, 5));

        // Last column spilling into the remainder strip keeps its pixels.
        let source = gradient(45, 20);
        let g = GridGeometry::derive(45, 20, 2, 1).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(Location::new(1, 0), png(&RgbaImage::from_pixel(30, 20, RED)));
        let out = composite(&source, &g, &overrides, CompositeOptions::default());
        assert_eq!(*out.image.get_pixel(44, 0), RED);
    }

    #[test]
    fn clipping_keeps_overrides_inside_their_cell() {
        let source = gradient(45, 20);
        let g = GridGeometry::derive(45, 20, 2, 1).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(Location::new(1, 0), png(&RgbaImage::from_pixel(30, 30, RED)));
        let out = composite(&source, &g, &overrides, CompositeOptions { clip_overrides: true });
        assert_eq!(out.image.dimensions(), (45, 20));
        assert_eq!(*out.image.get_pixel(22, 0), RED);
        assert_eq!(*out.image.get_pixel(43, 19), RED);
        assert_eq!(*out.image.get_pixel(44, 0), *source.get_pixel(44, 0));
    }

    #[test]
    fn remainder_strip_comes_from_source() {
        let source = gradient(65, 43);
        let g = GridGeometry::derive(65, 43, 6, 4).unwrap();
        let overrides: HashMap<_, _> = g
            .cells()
            .map(|loc| (loc, png(&RgbaImage::from_pixel(g.step_size_x, g.step_size_y, RED))))
            .collect();
        let out = composite(&source, &g, &overrides, CompositeOptions::default());
        assert_eq!(out.overridden.len(), g.cell_count());
        assert_eq!(*out.image.get_pixel(64, 0), *source.get_pixel(64, 0));
        assert_eq!(*out.image.get_pixel(0, 42), *source.get_pixel(0, 42));
        assert_eq!(*out.image.get_pixel(0, 0), RED);
    }

    #[test]
    fn corrupt_override_falls_back_to_source() {
        let source = gradient(40, 40);
        let g = GridGeometry::derive(40, 40, 2, 2).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(Location::new(0, 1), b"\xFF\xD8\xFFgarbage".to_vec());
        overrides.insert(Location::new(1, 1), png(&RgbaImage::from_pixel(20, 20, RED)));

        let out = composite(&source, &g, &overrides, CompositeOptions::default());
        assert_eq!(out.overridden, vec![Location::new(1, 1)]);
        assert_eq!(out.fallbacks.len(), 1);
        assert!(matches!(
            out.fallbacks[0],
            Error::TileDecode { location, .. } if location == Location::new(0, 1)
        ));
        assert_eq!(*out.image.get_pixel(5, 25), *source.get_pixel(5, 25));
    }

    #[test]
    fn stray_overrides_are_ignored() {
        let source = gradient(20, 20);
        let g = GridGeometry::derive(20, 20, 2, 2).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(Location::new(7, 0), png(&RgbaImage::from_pixel(10, 10, RED)));
        let out = composite(&source, &g, &overrides, CompositeOptions::default());
        assert_eq!(out.image, source);
    }

    #[test]
    fn crop_matches_source_block() {
        let source = gradient(120, 80);
        let g = GridGeometry::derive(120, 80, 4, 4).unwrap();
        let crop = crop_cell(&source, &g, Location::new(3, 2));
        assert_eq!(crop.dimensions(), (30, 20));
        assert_eq!(*crop.get_pixel(0, 0), *source.get_pixel(90, 40));
        assert_eq!(*crop.get_pixel(29, 19), *source.get_pixel(119, 59));
    }
}
