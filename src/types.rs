//! Segmentation mask type

use crate::error::{BgRemovalError, Result};
use image::{imageops::FilterType, GrayImage};
use ndarray::ArrayView2;

/// Single-channel foreground mask, row-major, 0 = background, 255 = foreground
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Intensities, `width * height` entries
    pub data: Vec<u8>,
    /// `(width, height)`
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Wrap raw mask bytes
    ///
    /// # Errors
    /// - `data.len()` differs from `width * height`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgRemovalError::processing(format!(
                "Mask of {}x{} needs {} values, got {}",
                dimensions.0,
                dimensions.1,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Quantize a `[height, width]` probability map to `u8`
    ///
    /// Values are clamped to `[0, 1]`; NaN maps to 0.
    #[must_use]
    pub fn from_probabilities(probabilities: ArrayView2<'_, f32>) -> Self {
        let (height, width) = probabilities.dim();
        let data = probabilities
            .iter()
            .map(|p| (p.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        Self {
            data,
            dimensions: (width as u32, height as u32),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Copy the mask into a grayscale image
    ///
    /// # Errors
    /// - Buffer size does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        GrayImage::from_raw(self.dimensions.0, self.dimensions.1, self.data.clone())
            .ok_or_else(|| BgRemovalError::processing("Mask buffer does not match its dimensions"))
    }

    /// Resample to `width` x `height` with a Lanczos3 filter
    ///
    /// # Errors
    /// - Zero target dimensions
    /// - Buffer size does not match the dimensions
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::processing(format!(
                "Cannot resize mask to {width}x{height}"
            )));
        }
        if self.dimensions == (width, height) {
            return Ok(self.clone());
        }

        let resized =
            image::imageops::resize(&self.to_image()?, width, height, FilterType::Lanczos3);
        Ok(Self {
            data: resized.into_raw(),
            dimensions: (width, height),
        })
    }

    /// Share of pixels at or above 50% foreground
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|v| **v >= 128).count();
        foreground as f32 / self.data.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_new_checks_length() {
        assert!(SegmentationMask::new(vec![0; 6], (3, 2)).is_ok());
        assert!(SegmentationMask::new(vec![0; 5], (3, 2)).is_err());
    }

    #[test]
    fn test_from_probabilities_quantizes_and_clamps() {
        let probs = array![[0.0_f32, 0.5, 1.0], [-1.0, 2.0, f32::NAN]];
        let mask = SegmentationMask::from_probabilities(probs.view());
        assert_eq!(mask.dimensions, (3, 2));
        assert_eq!(mask.data, vec![0, 128, 255, 0, 255, 0]);
    }

    #[test]
    fn test_resize_hits_exact_dimensions() {
        let probs = Array2::<f32>::from_elem((8, 8), 1.0);
        let mask = SegmentationMask::from_probabilities(probs.view());

        for (w, h) in [(1, 1), (13, 7), (640, 3), (3, 480)] {
            let resized = mask.resize(w, h).unwrap();
            assert_eq!(resized.dimensions, (w, h));
            assert_eq!(resized.data.len(), (w * h) as usize);
            // Uniform masks stay uniform under Lanczos
            assert!(resized.data.iter().all(|v| *v == 255));
        }
        assert!(mask.resize(0, 5).is_err());
    }

    #[test]
    fn test_to_image_and_ratio() {
        let mask = SegmentationMask::new(vec![0, 255, 255, 10], (2, 2)).unwrap();
        let image = mask.to_image().unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [255]);
        assert!((mask.foreground_ratio() - 0.5).abs() < f32::EPSILON);
    }
}
