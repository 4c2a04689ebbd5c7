/// Slide source backed by ordinary raster files (TIFF, PNG, JPEG)
///
/// The whole image is decoded once on open; regions are cropped from memory.

use crate::{
    capability::{Slide, SlideSource},
    error::PipelineError,
    runtime::tiles::TileRegion,
};
use async_trait::async_trait;
use image::RgbImage;
use std::{path::Path, sync::Arc};

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileSource;

/// A fully decoded raster slide
#[derive(Debug)]
pub struct DecodedSlide {
    image: RgbImage,
}

impl DecodedSlide {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }
}

#[async_trait]
impl SlideSource for ImageFileSource {
    async fn open(&self, path: &str) -> Result<Arc<dyn Slide>, PipelineError> {
        let owned = path.to_string();
        let open_error = |reason: String| PipelineError::ImageOpen {
            path: path.to_string(),
            reason,
        };

        if !Path::new(path).is_file() {
            return Err(open_error("no such file".to_string()));
        }

        tracing::debug!("🖼️ Decoding slide: {}", path);
        let decoded = tokio::task::spawn_blocking(move || image::open(&owned).map(|img| img.to_rgb8()))
            .await
            .map_err(|e| open_error(format!("decoder task failed: {e}")))?
            .map_err(|e| open_error(e.to_string()))?;

        tracing::debug!("🖼️ Slide {} decoded: {}x{}", path, decoded.width(), decoded.height());
        Ok(Arc::new(DecodedSlide::new(decoded)))
    }
}

#[async_trait]
impl Slide for DecodedSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    async fn read_region(&self, region: TileRegion) -> Result<RgbImage, PipelineError> {
        let (width, height) = self.image.dimensions();
        let fits = region.x.checked_add(region.width).is_some_and(|right| right <= width)
            && region.y.checked_add(region.height).is_some_and(|bottom| bottom <= height);
        if !fits {
            return Err(PipelineError::TileRead {
                x: region.x,
                y: region.y,
                reason: format!("region {}x{} exceeds slide bounds {width}x{height}", region.width, region.height),
            });
        }
        Ok(image::imageops::crop_imm(&self.image, region.x, region.y, region.width, region.height).to_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[tokio::test]
    async fn missing_file_is_an_open_error() {
        let err = ImageFileSource.open("/definitely/not/here.tiff").await.err().unwrap();
        assert!(matches!(err, PipelineError::ImageOpen { .. }));
    }

    #[tokio::test]
    async fn undecodable_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = ImageFileSource.open(path.to_str().unwrap()).await.err().unwrap();
        assert!(matches!(err, PipelineError::ImageOpen { .. }));
    }

    #[tokio::test]
    async fn reads_regions_from_decoded_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slide.png");
        let mut img = RgbImage::from_pixel(20, 10, Rgb([255, 255, 255]));
        img.put_pixel(15, 5, Rgb([1, 2, 3]));
        img.save(&path).unwrap();

        let slide = ImageFileSource.open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(slide.dimensions(), (20, 10));

        let tile = slide
            .read_region(TileRegion { x: 10, y: 0, width: 10, height: 10 })
            .await
            .unwrap();
        assert_eq!(tile.get_pixel(5, 5), &Rgb([1, 2, 3]));

        let err = slide
            .read_region(TileRegion { x: 15, y: 0, width: 10, height: 10 })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TileRead { .. }));
    }
}
