//! Background removal pipeline
//!
//! Decoded image in, RGBA cutout out: the image is flattened to RGB, segmented
//! by the [`ModelHost`], the mask is resampled to the source size and written
//! into the alpha channel.

use crate::{
    error::{BgRemovalError, Result},
    host::ModelHost,
    services::ImageIOService,
    types::SegmentationMask,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, debug_span};

/// Drives the model host and composites its mask onto the source image
#[derive(Debug, Clone)]
pub struct CompositingPipeline {
    host: Arc<ModelHost>,
}

impl CompositingPipeline {
    #[must_use]
    pub fn new(host: Arc<ModelHost>) -> Self {
        Self { host }
    }

    #[must_use]
    pub fn host(&self) -> &ModelHost {
        &self.host
    }

    /// Cut the foreground out of `image`
    ///
    /// Any alpha channel already present in `image` is discarded; the result's
    /// alpha comes from the mask only.
    ///
    /// # Errors
    /// - Segmentation failures from the model host
    /// - Mask resampling failures
    pub fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let (width, height) = image.dimensions();
        let _span = debug_span!("remove_background", width, height).entered();

        let rgb = image.to_rgb8();
        let mask = self.host.segment(&rgb)?;

        let mask = if mask.dimensions == (width, height) {
            mask
        } else {
            let _span = debug_span!("resample_mask", from = ?mask.dimensions).entered();
            mask.resize(width, height)?
        };

        composite(image, &mask)
    }

    /// Decode, cut out and re-encode as PNG
    ///
    /// # Errors
    /// - Decode, segmentation or encode failures
    pub fn process_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let start = Instant::now();

        let image = {
            let _span = debug_span!("decode", bytes = bytes.len()).entered();
            ImageIOService::load_from_bytes(bytes)?
        };
        let decoded = start.elapsed();

        let cutout = self.remove_background(&image)?;
        let segmented = start.elapsed();

        let png = {
            let _span = debug_span!("encode").entered();
            ImageIOService::encode_png(&cutout)?
        };

        debug!(
            decode_ms = decoded.as_millis() as u64,
            segment_ms = (segmented - decoded).as_millis() as u64,
            encode_ms = (start.elapsed() - segmented).as_millis() as u64,
            output_bytes = png.len(),
            "Image processed"
        );
        Ok(png)
    }
}

/// Write `mask` into the alpha channel of `image`
///
/// RGB channels are copied unchanged; the source alpha, if any, is replaced.
///
/// # Errors
/// - Mask dimensions differ from the image dimensions
pub fn composite(image: &DynamicImage, mask: &SegmentationMask) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions {
        return Err(BgRemovalError::processing(format!(
            "Mask is {}x{} but image is {}x{}",
            mask.dimensions.0,
            mask.dimensions.1,
            image.width(),
            image.height()
        )));
    }

    let mut rgba = image.to_rgba8();
    for (pixel, alpha) in rgba.pixels_mut().zip(&mask.data) {
        pixel.0[3] = *alpha;
    }
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBackend, MockOutput};
    use crate::config::ModelHostConfig;
    use image::{Rgb, RgbImage, Rgba};

    fn pipeline(backend: MockBackend) -> CompositingPipeline {
        let host = ModelHost::from_backend(Box::new(backend), &ModelHostConfig::default()).unwrap();
        CompositingPipeline::new(Arc::new(host))
    }

    #[test]
    fn test_composite_sets_alpha_only() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(3, 2, |x, y| {
            Rgb([x as u8 * 10, y as u8 * 20, 99])
        }));
        let mask = SegmentationMask::new(vec![0, 50, 100, 150, 200, 255], (3, 2)).unwrap();

        let result = composite(&image, &mask).unwrap();
        assert_eq!(*result.get_pixel(0, 0), Rgba([0, 0, 99, 0]));
        assert_eq!(*result.get_pixel(2, 1), Rgba([20, 20, 99, 255]));
        assert_eq!(result.get_pixel(1, 1).0[3], 200);
    }

    #[test]
    fn test_composite_rejects_mismatched_mask() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let mask = SegmentationMask::new(vec![0; 6], (3, 2)).unwrap();
        assert!(matches!(
            composite(&image, &mask),
            Err(BgRemovalError::Processing(_))
        ));
    }

    #[test]
    fn test_output_matches_input_dimensions() {
        let pipeline = pipeline(MockBackend::new());
        for (w, h) in [(1, 1), (17, 9), (300, 7), (5, 211), (32, 32)] {
            let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([40, 80, 120])));
            let result = pipeline.remove_background(&image).unwrap();
            assert_eq!(result.dimensions(), (w, h));
        }
    }

    #[test]
    fn test_existing_alpha_is_discarded() {
        let pipeline = pipeline(MockBackend::new().with_output(MockOutput::Constant(1.0)));
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([5, 6, 7, 0])));

        let result = pipeline.remove_background(&image).unwrap();
        assert!(result.pixels().all(|p| p.0 == [5, 6, 7, 255]));
    }

    #[test]
    fn test_split_mask_survives_resampling() {
        let pipeline = pipeline(MockBackend::new().with_output(MockOutput::SplitVertical));
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([1, 1, 1])));

        let result = pipeline.remove_background(&image).unwrap();
        assert_eq!(result.get_pixel(5, 50).0[3], 0);
        assert_eq!(result.get_pixel(195, 50).0[3], 255);
    }

    #[test]
    fn test_process_bytes_is_deterministic() {
        let pipeline = pipeline(MockBackend::new());
        let source = DynamicImage::ImageRgb8(RgbImage::from_fn(40, 30, |x, y| {
            Rgb([(x * 6) as u8, (y * 8) as u8, 128])
        }));
        let mut jpeg = Vec::new();
        source
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let first = pipeline.process_bytes(&jpeg).unwrap();
        let second = pipeline.process_bytes(&jpeg).unwrap();
        assert_eq!(first, second);

        let decoded = ImageIOService::load_from_bytes(&first).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn test_process_bytes_rejects_garbage() {
        let pipeline = pipeline(MockBackend::new());
        assert!(matches!(
            pipeline.process_bytes(b"not an image"),
            Err(BgRemovalError::Decode(_))
        ));
    }
}
