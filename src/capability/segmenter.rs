/// Threshold + connected-component cell detector
///
/// Stands in for the real segmentation model: pixels darker than
/// `darkness_level` are grouped into 4-connected blobs and every blob of at
/// least `min_area` pixels is reported as its bounding-box polygon.

use crate::{capability::CellSegmenter, error::PipelineError, runtime::result::Polygon};
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct ThresholdSegmenter {
    /// Mean RGB intensity below which a pixel is considered stained
    pub darkness_level: u8,
    /// Smallest blob, in pixels, reported as a cell
    pub min_area: usize,
}

impl Default for ThresholdSegmenter {
    fn default() -> Self {
        Self {
            darkness_level: 100,
            min_area: 16,
        }
    }
}

#[async_trait]
impl CellSegmenter for ThresholdSegmenter {
    async fn segment(&self, tile: Arc<RgbImage>) -> Result<Vec<Polygon>, PipelineError> {
        let params = *self;
        tokio::task::spawn_blocking(move || params.detect(&tile))
            .await
            .map_err(|e| PipelineError::Inference(format!("segmentation task failed: {e}")))
    }
}

impl ThresholdSegmenter {
    /// Label dark blobs and return their bounding boxes
    pub fn detect(&self, tile: &RgbImage) -> Vec<Polygon> {
        let (width, height) = tile.dimensions();
        let (w, h) = (width as usize, height as usize);
        let dark: Vec<bool> = tile
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                (u16::from(r) + u16::from(g) + u16::from(b)) / 3 < u16::from(self.darkness_level)
            })
            .collect();

        let mut visited = vec![false; w * h];
        let mut polygons = Vec::new();
        let mut stack = Vec::new();

        for start in 0..w * h {
            if !dark[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            stack.push(start);

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);
            let mut area = 0usize;
            while let Some(index) = stack.pop() {
                let (x, y) = (index % w, index / w);
                area += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                let neighbours = [
                    (x > 0).then(|| index - 1),
                    (x + 1 < w).then(|| index + 1),
                    (y > 0).then(|| index - w),
                    (y + 1 < h).then(|| index + w),
                ];
                for next in neighbours.into_iter().flatten() {
                    if dark[next] && !visited[next] {
                        visited[next] = true;
                        stack.push(next);
                    }
                }
            }

            if area >= self.min_area {
                let (x0, y0, x1, y1) = (min_x as u32, min_y as u32, max_x as u32, max_y as u32);
                polygons.push(Polygon {
                    points: vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
                });
            }
        }

        polygons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn paint(tile: &mut RgbImage, x0: u32, y0: u32, size: u32) {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                tile.put_pixel(x, y, Rgb([30, 20, 60]));
            }
        }
    }

    #[test]
    fn finds_separate_blobs() {
        let mut tile = RgbImage::from_pixel(32, 32, Rgb([250, 250, 250]));
        paint(&mut tile, 2, 2, 5);
        paint(&mut tile, 20, 10, 6);

        let polygons = ThresholdSegmenter::default().detect(&tile);
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].points, vec![[2, 2], [6, 2], [6, 6], [2, 6]]);
        assert_eq!(polygons[1].points[0], [20, 10]);
    }

    #[test]
    fn specks_below_min_area_are_ignored() {
        let mut tile = RgbImage::from_pixel(16, 16, Rgb([250, 250, 250]));
        paint(&mut tile, 4, 4, 2);
        assert!(ThresholdSegmenter::default().detect(&tile).is_empty());
    }
}
