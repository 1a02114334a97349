//! Image to tensor conversion for model input

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;

/// Converts RGB images into normalized NCHW tensors
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Resize `image` to the model input size and normalize it
    ///
    /// The image is stretched to the target size with bilinear filtering; the
    /// aspect ratio is not preserved, which keeps the mask-to-image mapping a
    /// plain resize. Each channel becomes `(px * rescale - mean) / std`.
    ///
    /// # Errors
    /// - Empty input image
    /// - Zero target size in the preprocessing config
    pub fn preprocess(image: &RgbImage, config: &PreprocessingConfig) -> Result<Array4<f32>> {
        let [target_h, target_w] = config.target_size;
        if target_h == 0 || target_w == 0 {
            return Err(BgRemovalError::invalid_config(
                "Preprocessing target size must be non-zero",
            ));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::processing("Cannot preprocess an empty image"));
        }

        let resized;
        let canvas = if image.dimensions() == (target_w, target_h) {
            image
        } else {
            resized = image::imageops::resize(image, target_w, target_h, FilterType::Triangle);
            &resized
        };

        Ok(Self::to_tensor(canvas, config))
    }

    fn to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let scale: [f32; 3] =
            std::array::from_fn(|c| config.rescale_factor / config.normalization_std[c]);
        let offset: [f32; 3] =
            std::array::from_fn(|c| config.normalization_mean[c] / config.normalization_std[c]);

        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor allocated with the canvas dimensions, channel index < 3
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    f32::from(pixel[c]) * scale[c] - offset[c];
            }
        }

        tensor
    }
}
