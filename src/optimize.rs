//! Image optimizer: next-gen copies of the site's raster images.
//!
//! Every `[images] sources` entry that exists is converted to each
//! configured format next to the original (`img/a.png` → `img/a.webp`).
//! Conversions run in parallel on the rayon pool. Missing sources are
//! skipped and a failed conversion is reported without stopping the rest.
//!
//! The originals stay in place as fallbacks; [`picture_snippet`] renders
//! the `<picture>` markup that serves the new formats first.

use crate::config::{ImageFormat, ImagesConfig};
use crate::imaging::{ConvertParams, Dimensions, ImageBackend, Quality};
use maud::{Markup, html};
use rayon::prelude::*;
use std::path::Path;

/// One output file.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub format: ImageFormat,
    /// Output path relative to the site root.
    pub output: String,
    pub size_kb: f64,
    /// Percentage smaller than the original; negative when larger.
    pub savings_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Converted {
        source: String,
        original_kb: f64,
        dimensions: Dimensions,
        conversions: Vec<Conversion>,
    },
    /// The source does not exist.
    Skipped { source: String },
    Failed { source: String, error: String },
}

impl ImageOutcome {
    pub fn source(&self) -> &str {
        match self {
            Self::Converted { source, .. }
            | Self::Skipped { source }
            | Self::Failed { source, .. } => source,
        }
    }
}

/// `img/photo.jpg` → `img/photo.webp`.
pub fn output_path(source: &str, format: ImageFormat) -> String {
    let path = Path::new(source);
    path.with_extension(format.extension())
        .to_string_lossy()
        .into_owned()
}

fn size_kb(path: &Path) -> std::io::Result<f64> {
    Ok(std::fs::metadata(path)?.len() as f64 / 1024.0)
}

fn savings(original_kb: f64, new_kb: f64) -> f64 {
    if original_kb <= 0.0 {
        return 0.0;
    }
    ((1.0 - new_kb / original_kb) * 1000.0).round() / 10.0
}

fn optimize_one(
    backend: &impl ImageBackend,
    root: &Path,
    source: &str,
    formats: &[ImageFormat],
    quality: Quality,
) -> ImageOutcome {
    let source_path = root.join(source);
    if !source_path.is_file() {
        tracing::debug!(source, "skipping missing image");
        return ImageOutcome::Skipped {
            source: source.to_string(),
        };
    }

    let attempt = || -> Result<ImageOutcome, String> {
        let original_kb = size_kb(&source_path).map_err(|e| e.to_string())?;
        let dimensions = backend.identify(&source_path).map_err(|e| e.to_string())?;
        let mut conversions = Vec::with_capacity(formats.len());
        for &format in formats {
            let output = output_path(source, format);
            let output_path = root.join(&output);
            backend
                .convert(&ConvertParams {
                    source: source_path.clone(),
                    output: output_path.clone(),
                    format,
                    quality,
                })
                .map_err(|e| e.to_string())?;
            let new_kb = size_kb(&output_path).map_err(|e| e.to_string())?;
            conversions.push(Conversion {
                format,
                output,
                size_kb: new_kb,
                savings_percent: savings(original_kb, new_kb),
            });
        }
        Ok(ImageOutcome::Converted {
            source: source.to_string(),
            original_kb,
            dimensions,
            conversions,
        })
    };

    attempt().unwrap_or_else(|error| {
        tracing::warn!(source, %error, "image conversion failed");
        ImageOutcome::Failed {
            source: source.to_string(),
            error,
        }
    })
}

/// Convert every configured source. Results keep configuration order.
pub fn optimize_images(
    backend: &impl ImageBackend,
    root: &Path,
    config: &ImagesConfig,
) -> Vec<ImageOutcome> {
    let quality = Quality::new(config.quality);
    config
        .sources
        .par_iter()
        .map(|source| optimize_one(backend, root, source, &config.formats, quality))
        .collect()
}

/// `<picture>` markup: one `<source>` per new format, then the original as
/// both a typed source and the lazy `<img>` fallback.
pub fn picture_snippet(source: &str, formats: &[ImageFormat]) -> Markup {
    let original_mime = crate::mime::content_type(Path::new(source));
    html! {
        picture {
            @for format in formats {
                source srcset=(output_path(source, *format)) type=(format.mime());
            }
            source srcset=(source) type=(original_mime);
            img src=(source) alt="..." loading="lazy";
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use std::fs;
    use tempfile::TempDir;

    fn config(sources: &[&str], formats: &[ImageFormat]) -> ImagesConfig {
        ImagesConfig {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            formats: formats.to_vec(),
            quality: 70,
            max_processes: None,
        }
    }

    #[test]
    fn output_path_swaps_extension() {
        assert_eq!(output_path("img/a.png", ImageFormat::Webp), "img/a.webp");
        assert_eq!(output_path("bg.jpg", ImageFormat::Avif), "bg.avif");
    }

    #[test]
    fn savings_rounded_to_one_decimal() {
        assert_eq!(savings(10.0, 7.5), 25.0);
        assert_eq!(savings(3.0, 2.0), 33.3);
        assert_eq!(savings(1.0, 2.0), -100.0);
        assert_eq!(savings(0.0, 1.0), 0.0);
    }

    #[test]
    fn converts_each_source_to_each_format() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("icon.png"), vec![0u8; 2048]).unwrap();
        let backend = MockBackend::new();

        let results = optimize_images(
            &backend,
            tmp.path(),
            &config(&["icon.png"], &[ImageFormat::Webp, ImageFormat::Avif]),
        );

        let ImageOutcome::Converted {
            original_kb,
            conversions,
            ..
        } = &results[0]
        else {
            panic!("expected conversion, got {:?}", results[0]);
        };
        assert_eq!(*original_kb, 2.0);
        assert_eq!(conversions.len(), 2);
        assert_eq!(conversions[0].output, "icon.webp");
        assert_eq!(conversions[1].output, "icon.avif");
        assert_eq!(conversions[0].size_kb, 0.5);
        assert_eq!(conversions[0].savings_percent, 75.0);

        let converts: Vec<_> = backend
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::Convert { quality: 70, .. }))
            .collect();
        assert_eq!(converts.len(), 2);
    }

    #[test]
    fn missing_sources_skipped_failures_isolated() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.png"), vec![0u8; 1024]).unwrap();
        fs::write(tmp.path().join("bad.jpg"), vec![0u8; 1024]).unwrap();
        let backend = MockBackend::new().failing_on("bad.jpg");

        let results = optimize_images(
            &backend,
            tmp.path(),
            &config(&["good.png", "gone.png", "bad.jpg"], &[ImageFormat::Webp]),
        );

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], ImageOutcome::Converted { .. }));
        assert_eq!(
            results[1],
            ImageOutcome::Skipped {
                source: "gone.png".to_string()
            }
        );
        assert!(matches!(&results[2], ImageOutcome::Failed { source, .. } if source == "bad.jpg"));
        assert!(tmp.path().join("good.webp").is_file());
    }

    #[test]
    fn picture_snippet_orders_sources() {
        let html = picture_snippet("img/me.jpg", &[ImageFormat::Avif, ImageFormat::Webp]).into_string();
        let avif = html.find(r#"srcset="img/me.avif" type="image/avif""#).unwrap();
        let webp = html.find(r#"srcset="img/me.webp" type="image/webp""#).unwrap();
        let jpeg = html.find(r#"srcset="img/me.jpg" type="image/jpeg""#).unwrap();
        assert!(avif < webp && webp < jpeg);
        assert!(html.contains(r#"<img src="img/me.jpg" alt="..." loading="lazy">"#));
        assert!(html.starts_with("<picture>") && html.ends_with("</picture>"));
    }
}
