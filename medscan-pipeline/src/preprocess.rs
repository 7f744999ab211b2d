//! Image normalization ahead of OCR and model submission.
//!
//! Uploaded photos arrive as arbitrary JPEG/PNG: huge camera resolutions,
//! PNG transparency, odd color types. Normalization flattens transparency
//! against white, caps the longest dimension, and re-encodes as a bounded
//! quality JPEG. Failure here is never fatal: a corrupt or unsupported image
//! is passed through unchanged and the downstream stages work with the
//! original bytes.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use std::io::Cursor;
use tracing::{debug, warn};

/// Image bytes ready for OCR and model submission, owned by the request.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    /// Neither output dimension exceeds this; images are never upscaled.
    max_dimension: u32,
    jpeg_quality: u8,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            max_dimension: 2000,
            jpeg_quality: 80,
        }
    }
}

impl ImagePreprocessor {
    pub fn new(max_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            max_dimension,
            jpeg_quality,
        }
    }

    /// Normalize one uploaded image. On any internal failure the original
    /// bytes and MIME type come back unchanged.
    pub async fn normalize(&self, data: Vec<u8>, mime_type: &str) -> PreprocessedImage {
        let max_dimension = self.max_dimension;
        let quality = self.jpeg_quality;
        let input = data.clone();

        let encoded = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let img = image::load_from_memory(&input)?;
            let img = flatten_to_white(img);
            let img = if img.width() > max_dimension || img.height() > max_dimension {
                img.resize(max_dimension, max_dimension, FilterType::CatmullRom)
            } else {
                img
            };

            let mut buffer = Vec::new();
            let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality);
            img.write_with_encoder(encoder)?;
            Ok(buffer)
        })
        .await;

        match encoded {
            Ok(Ok(jpeg)) => {
                debug!(
                    original_bytes = data.len(),
                    normalized_bytes = jpeg.len(),
                    "image normalized"
                );
                PreprocessedImage {
                    data: jpeg,
                    mime_type: "image/jpeg".to_string(),
                }
            }
            Ok(Err(e)) => {
                warn!("image normalization failed, using original upload: {}", e);
                PreprocessedImage {
                    data,
                    mime_type: mime_type.to_string(),
                }
            }
            Err(e) => {
                warn!("image normalization task failed, using original upload: {}", e);
                PreprocessedImage {
                    data,
                    mime_type: mime_type.to_string(),
                }
            }
        }
    }
}

/// Composite any alpha channel over a white background. Scanned documents and
/// phone photos rarely carry transparency, but PNG exports from editing apps
/// do, and both tesseract and the vision model behave badly on it.
fn flatten_to_white(img: DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut flat = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        flat.put_pixel(x, y, image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    DynamicImage::ImageRgb8(flat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[tokio::test]
    async fn oversized_image_is_bounded_to_max_dimension() {
        let pre = ImagePreprocessor::default();
        let big = DynamicImage::new_rgb8(4000, 1000);
        let out = pre.normalize(png_bytes(big), "image/png").await;

        assert_eq!(out.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert!(decoded.width() <= 2000 && decoded.height() <= 2000);
        // Aspect ratio preserved: 4:1 input stays 4:1.
        assert_eq!(decoded.width(), 2000);
        assert_eq!(decoded.height(), 500);
    }

    #[tokio::test]
    async fn small_image_is_not_upscaled() {
        let pre = ImagePreprocessor::default();
        let small = DynamicImage::new_rgb8(120, 80);
        let out = pre.normalize(png_bytes(small), "image/png").await;

        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }

    #[tokio::test]
    async fn transparency_is_flattened_to_white() {
        let pre = ImagePreprocessor::default();
        let transparent = DynamicImage::ImageRgba8(image::RgbaImage::new(10, 10));
        let out = pre.normalize(png_bytes(transparent), "image/png").await;

        let decoded = image::load_from_memory(&out.data).unwrap().to_rgb8();
        let pixel = decoded.get_pixel(5, 5);
        // Fully transparent input composites to (near-)white after JPEG.
        assert!(pixel[0] > 240 && pixel[1] > 240 && pixel[2] > 240);
    }

    #[tokio::test]
    async fn corrupt_input_falls_back_to_original_bytes() {
        let pre = ImagePreprocessor::default();
        let garbage = vec![0x00, 0x01, 0x02, 0x03];
        let out = pre.normalize(garbage.clone(), "image/jpeg").await;

        assert_eq!(out.data, garbage);
        assert_eq!(out.mime_type, "image/jpeg");
    }
}
