//! Image decoding and PNG encoding for uploads

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Fallback name for the returned attachment
pub const DEFAULT_OUTPUT_FILENAME: &str = "no_background.png";

/// Service for decoding uploads and encoding results
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image from raw bytes, guessing the format from content
    ///
    /// ```rust
    /// use bgremove_api::services::ImageIOService;
    ///
    /// assert!(ImageIOService::load_from_bytes(b"").is_err());
    /// ```
    ///
    /// # Errors
    /// - Empty input
    /// - Unknown format or corrupt data
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::decode("empty image data"));
        }
        image::load_from_memory(bytes)
            .map_err(|e| BgRemovalError::decode(format!("Failed to decode image: {e}")))
    }

    /// Encode an RGBA image as PNG
    ///
    /// # Errors
    /// - Encoder failure
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(image.as_raw().len() / 2);
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| BgRemovalError::encode(format!("Failed to encode PNG: {e}")))?;
        Ok(buffer)
    }

    /// Attachment name for a processed upload
    ///
    /// Keeps the base name of the uploaded file, swaps its extension for
    /// `.png` and drops characters that are unsafe inside a header value.
    ///
    /// ```rust
    /// use bgremove_api::services::ImageIOService;
    ///
    /// assert_eq!(ImageIOService::output_filename(Some("C:\\photos\\cat.jpeg")), "cat.png");
    /// assert_eq!(ImageIOService::output_filename(None), "no_background.png");
    /// ```
    #[must_use]
    pub fn output_filename(original: Option<&str>) -> String {
        let Some(original) = original else {
            return DEFAULT_OUTPUT_FILENAME.to_string();
        };

        let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
        let stem = match base.rfind('.') {
            Some(0) | None => base,
            Some(idx) => base.get(..idx).unwrap_or(base),
        };

        let cleaned: String = stem
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
            .collect();
        let cleaned = cleaned.trim().trim_start_matches('.');

        if cleaned.is_empty() {
            DEFAULT_OUTPUT_FILENAME.to_string()
        } else {
            format!("{cleaned}.png")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba};

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    #[test]
    fn test_load_from_bytes_formats() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 5, Rgb([200, 10, 10])));
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp] {
            let decoded = ImageIOService::load_from_bytes(&encode(&image, format)).unwrap();
            assert_eq!(decoded.dimensions(), (7, 5), "{format:?}");
        }
    }

    #[test]
    fn test_load_from_bytes_errors_are_decode_errors() {
        let err = ImageIOService::load_from_bytes(&[]).unwrap_err();
        assert!(matches!(err, BgRemovalError::Decode(_)));
        assert_eq!(err.detail(), "empty image data");

        let err = ImageIOService::load_from_bytes(b"hello, world").unwrap_err();
        assert!(matches!(err, BgRemovalError::Decode(_)));

        let png = encode(
            &DynamicImage::ImageRgb8(RgbImage::new(64, 64)),
            ImageFormat::Png,
        );
        let truncated = &png[..png.len() / 2];
        assert!(matches!(
            ImageIOService::load_from_bytes(truncated),
            Err(BgRemovalError::Decode(_))
        ));
    }

    #[test]
    fn test_png_preserves_alpha_exactly() {
        let mut image = RgbaImage::new(4, 3);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgba([x as u8 * 60, y as u8 * 80, 7, (x * 3 + y * 17) as u8 * 5]);
        }
        let bytes = ImageIOService::encode_png(&image).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let decoded = ImageIOService::load_from_bytes(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(ImageIOService::output_filename(Some("portrait.jpg")), "portrait.png");
        assert_eq!(ImageIOService::output_filename(Some("archive.tar.gz")), "archive.tar.png");
        assert_eq!(ImageIOService::output_filename(Some("../../etc/passwd")), "passwd.png");
        assert_eq!(ImageIOService::output_filename(Some("noext")), "noext.png");
        assert_eq!(ImageIOService::output_filename(Some(".hidden")), "hidden.png");
        assert_eq!(ImageIOService::output_filename(Some("a\"b\r\n.png")), "ab.png");
        assert_eq!(ImageIOService::output_filename(Some("")), DEFAULT_OUTPUT_FILENAME);
        assert_eq!(ImageIOService::output_filename(Some("dir/")), DEFAULT_OUTPUT_FILENAME);
        assert_eq!(ImageIOService::output_filename(Some("фото.png")), DEFAULT_OUTPUT_FILENAME);
    }
}
