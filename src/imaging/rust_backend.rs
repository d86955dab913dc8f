//! Pure Rust image backend, statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image` crate (pure Rust decoders) |
//! | Identify | `image::image_dimensions` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//!
//! The `image` crate's WebP encoder is lossless only, so the configured
//! quality applies to AVIF alone. AVIF cannot be decoded: the `avif`
//! feature only brings in the encoder.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::ConvertParams;
use crate::config::ImageFormat;
use image::DynamicImage;
use image::ImageReader;
use std::io::BufWriter;
use std::path::Path;

/// Extensions the optimizer accepts as sources.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            SUPPORTED_INPUT_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

/// Pure Rust backend using the `image` crate ecosystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    if !is_supported_input(path) {
        return Err(BackendError::ProcessingFailed(format!(
            "Unsupported input format: {}",
            path.display()
        )));
    }
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Both encoders take 8-bit RGB or RGBA only.
fn to_8bit(img: DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        DynamicImage::from(img.into_rgba8())
    } else {
        DynamicImage::from(img.into_rgb8())
    }
}

fn save_webp(img: &DynamicImage, path: &Path) -> Result<(), BackendError> {
    let writer = BufWriter::new(std::fs::File::create(path)?);
    let encoder = image::codecs::webp::WebPEncoder::new_lossless(writer);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {}", e)))
}

/// Encode and save as AVIF using rav1e (speed=6 for reasonable throughput).
fn save_avif(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let writer = BufWriter::new(std::fs::File::create(path)?);
    let encoder =
        image::codecs::avif::AvifEncoder::new_with_speed_quality(writer, 6, quality as u8);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("AVIF encode failed: {}", e)))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn convert(&self, params: &ConvertParams) -> Result<(), BackendError> {
        let img = to_8bit(load_image(&params.source)?);
        match params.format {
            ImageFormat::Webp => save_webp(&img, &params.output),
            ImageFormat::Avif => save_avif(&img, &params.output, params.quality.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use image::{ImageEncoder, RgbImage, RgbaImage};

    /// Create a small valid JPEG file with the given dimensions.
    fn create_test_jpeg(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let file = std::fs::File::create(path).unwrap();
        let writer = BufWriter::new(file);
        image::codecs::jpeg::JpegEncoder::new(writer)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
    }

    fn create_test_png(path: &Path, width: u32, height: u32) {
        let img = RgbaImage::from_fn(width, height, |x, _| {
            image::Rgba([200, 30, 30, (x % 256) as u8])
        });
        img.save(path).unwrap();
    }

    fn params(source: &Path, output: &Path, format: ImageFormat) -> ConvertParams {
        ConvertParams {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            format,
            quality: Quality::new(60),
        }
    }

    #[test]
    fn supported_input_extensions() {
        assert!(is_supported_input(Path::new("a.JPG")));
        assert!(is_supported_input(Path::new("a.png")));
        assert!(!is_supported_input(Path::new("a.avif")));
        assert!(!is_supported_input(Path::new("a")));
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 200, height: 150 });
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(result.is_err());
    }

    #[test]
    fn convert_png_with_alpha_to_webp_keeps_dimensions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("icon.png");
        let output = tmp.path().join("icon.webp");
        create_test_png(&source, 48, 32);

        let backend = RustBackend::new();
        backend
            .convert(&params(&source, &output, ImageFormat::Webp))
            .unwrap();
        assert_eq!(
            backend.identify(&output).unwrap(),
            Dimensions { width: 48, height: 32 }
        );
    }

    #[test]
    fn convert_jpeg_to_avif_writes_isobmff() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        let output = tmp.path().join("photo.avif");
        create_test_jpeg(&source, 64, 48);

        RustBackend::new()
            .convert(&params(&source, &output, ImageFormat::Avif))
            .unwrap();
        let bytes = std::fs::read(&output).unwrap();
        assert!(bytes.len() > 12);
        assert_eq!(&bytes[4..8], b"ftyp");
    }

    #[test]
    fn convert_unsupported_source_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("notes.txt");
        std::fs::write(&source, "hello").unwrap();
        let result = RustBackend::new().convert(&params(
            &source,
            &tmp.path().join("notes.webp"),
            ImageFormat::Webp,
        ));
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn convert_corrupt_source_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("broken.png");
        std::fs::write(&source, "not a png").unwrap();
        let result = RustBackend::new().convert(&params(
            &source,
            &tmp.path().join("broken.webp"),
            ImageFormat::Webp,
        ));
        assert!(result.is_err());
    }
}
