use crate::models::SourceImage;
use crate::utils::ExtractionError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use log::debug;
use std::io::Cursor;
use std::path::Path;

/// Decoding, colour conversion and encoding helpers shared by every stage.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Decode photo bytes and undo any EXIF rotation so every later stage
    /// sees the image the way the camera holder did.
    pub fn load_source(image_bytes: &[u8]) -> Result<SourceImage, ExtractionError> {
        if image_bytes.is_empty() {
            return Err(ExtractionError::ImageProcessingError(
                "Empty image data".to_string(),
            ));
        }

        let image = image::load_from_memory(image_bytes)
            .map_err(|e| ExtractionError::ImageProcessingError(format!("Failed to load image: {}", e)))?;

        let orientation = Self::read_exif_orientation(image_bytes);
        if orientation != 1 {
            debug!("Applying EXIF orientation {}", orientation);
        }
        let image = Self::apply_exif_orientation(image, orientation);

        if image.width() < 16 || image.height() < 16 {
            return Err(ExtractionError::ImageProcessingError(format!(
                "Image too small: {}x{}",
                image.width(),
                image.height()
            )));
        }

        Ok(SourceImage::new(image))
    }

    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, ExtractionError> {
        Ok(std::fs::read(path)?)
    }

    /// EXIF tag 0x0112, or 1 when the container carries none.
    pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
        let mut cursor = Cursor::new(bytes);
        let reader = match exif::Reader::new().read_from_container(&mut cursor) {
            Ok(r) => r,
            Err(_) => return 1,
        };

        reader
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .unwrap_or(1)
    }

    pub fn apply_exif_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
        match orientation {
            2 => image.fliph(),
            3 => image.rotate180(),
            4 => image.flipv(),
            5 => image.rotate90().fliph(),
            6 => image.rotate90(),
            7 => image.rotate270().fliph(),
            8 => image.rotate270(),
            _ => image,
        }
    }

    /// Returns hue in degrees [0, 360) and saturation/value in [0, 1].
    pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
        let r = r as f32 / 255.0;
        let g = g as f32 / 255.0;
        let b = b as f32 / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta <= f32::EPSILON {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };

        let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
        (hue, saturation, max)
    }

    /// Shrink so the longer side is at most `max_dimension`. Returns the
    /// working image and the factor that maps its coordinates back.
    pub fn downscale(image: &DynamicImage, max_dimension: u32) -> (DynamicImage, f32) {
        let longest = image.width().max(image.height());
        if longest <= max_dimension {
            return (image.clone(), 1.0);
        }

        let factor = longest as f32 / max_dimension as f32;
        let width = ((image.width() as f32 / factor).round() as u32).max(1);
        let height = ((image.height() as f32 / factor).round() as u32).max(1);
        debug!(
            "Downscaling {}x{} to {}x{} for detection",
            image.width(),
            image.height(),
            width,
            height
        );

        (image.resize_exact(width, height, FilterType::Triangle), factor)
    }

    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }

    pub fn encode_base64_png(image: &DynamicImage) -> Result<String, ExtractionError> {
        Ok(STANDARD.encode(Self::encode_png(image)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 100, 50])));
        ImageProcessor::encode_png(&img).unwrap()
    }

    #[test]
    fn test_load_source_without_exif() {
        let bytes = png_bytes(64, 32);
        assert_eq!(ImageProcessor::read_exif_orientation(&bytes), 1);

        let source = ImageProcessor::load_source(&bytes).unwrap();
        assert_eq!((source.width(), source.height()), (64, 32));
    }

    #[test]
    fn test_load_source_rejects_garbage() {
        assert!(ImageProcessor::load_source(&[]).is_err());
        assert!(ImageProcessor::load_source(b"not an image").is_err());
    }

    #[test]
    fn test_exif_rotation_swaps_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 20));
        let rotated = ImageProcessor::apply_exif_orientation(img.clone(), 6);
        assert_eq!((rotated.width(), rotated.height()), (20, 40));

        let untouched = ImageProcessor::apply_exif_orientation(img, 1);
        assert_eq!((untouched.width(), untouched.height()), (40, 20));
    }

    #[test]
    fn test_rgb_to_hsv() {
        let (h, s, v) = ImageProcessor::rgb_to_hsv(255, 0, 0);
        assert_eq!((h, s, v), (0.0, 1.0, 1.0));

        let (h, _, _) = ImageProcessor::rgb_to_hsv(0, 0, 255);
        assert!((h - 240.0).abs() < 1e-3);

        let (_, s, v) = ImageProcessor::rgb_to_hsv(128, 128, 128);
        assert_eq!(s, 0.0);
        assert!((v - 0.502).abs() < 1e-2);
    }

    #[test]
    fn test_downscale_reports_factor() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(2048, 1024));
        let (small, factor) = ImageProcessor::downscale(&img, 1024);
        assert_eq!((small.width(), small.height()), (1024, 512));
        assert_eq!(factor, 2.0);

        let (same, factor) = ImageProcessor::downscale(&small, 1024);
        assert_eq!(same.width(), 1024);
        assert_eq!(factor, 1.0);
    }

    #[test]
    fn test_base64_png_decodes() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let encoded = ImageProcessor::encode_base64_png(&img).unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert!(image::load_from_memory(&decoded).is_ok());
    }
}
