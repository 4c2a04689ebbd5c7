/// Tile grid generation and tissue-content estimation
///
/// The grid steps by `tile_size - overlap` in both directions starting at the
/// slide origin; tiles on the right and bottom edges are clipped to the image.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A rectangular region in slide coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Regular, finite, lazily enumerated tile layout over a slide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_size: u32,
    step: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32, overlap: u32) -> Self {
        let tile_size = tile_size.max(1);
        Self {
            width,
            height,
            tile_size,
            step: tile_size.saturating_sub(overlap).max(1),
        }
    }

    pub fn columns(&self) -> u32 {
        self.width.div_ceil(self.step)
    }

    pub fn rows(&self) -> u32 {
        self.height.div_ceil(self.step)
    }

    /// Total tile count, known before any tile is produced
    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major iterator over tile regions
    pub fn tiles(self) -> impl Iterator<Item = TileRegion> {
        let columns = self.columns();
        (0..self.rows()).flat_map(move |row| {
            (0..columns).map(move |column| {
                let x = column * self.step;
                let y = row * self.step;
                TileRegion {
                    x,
                    y,
                    width: self.tile_size.min(self.width - x),
                    height: self.tile_size.min(self.height - y),
                }
            })
        })
    }
}

/// Fraction of sampled pixels darker than `background_level`
///
/// `stride` samples every n-th pixel in both axes; 1 inspects the whole tile.
pub fn tissue_fraction(tile: &RgbImage, background_level: u8, stride: u32) -> f64 {
    let stride = stride.max(1);
    let mut sampled = 0usize;
    let mut tissue = 0usize;

    for y in (0..tile.height()).step_by(stride as usize) {
        for x in (0..tile.width()).step_by(stride as usize) {
            let [r, g, b] = tile.get_pixel(x, y).0;
            let mean = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
            sampled += 1;
            if mean < u16::from(background_level) {
                tissue += 1;
            }
        }
    }

    if sampled == 0 {
        0.0
    } else {
        tissue as f64 / sampled as f64
    }
}
