//! Format normalisation: HEIC/HEIF → a standard raster encoding.
//!
//! Phones save HEIC by default, but neither previews nor the generation
//! service accept it. Files whose name ends in `.heic`/`.heif` are decoded
//! through a [`HeicDecoder`] and re-encoded (see [`super::encode`]); every
//! other accepted file passes through untouched.
//!
//! Decoding and encoding are CPU-bound, so they run inside
//! `tokio::task::spawn_blocking`.
//!
//! Each [`ProcessedImage`] owns a [`PreviewHandle`]: a temporary file holding
//! the normalised bytes. Dropping the handle (or calling
//! [`PreviewHandle::release`]) removes the file, so the preview is released
//! exactly once on every exit path.

use crate::config::{ConversionFormat, PipelineConfig};
use crate::error::HeadshotError;
use crate::pipeline::encode::encode_image;
use crate::pipeline::validate::{is_heic_name, replace_heic_extension, ImageFile, UploadCandidate};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Decodes HEIC/HEIF containers into pixels.
pub trait HeicDecoder: Send + Sync {
    /// Decode the primary image of the container.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, String>;
}

/// Decoder used when the crate is built without the `heic` feature.
pub struct UnsupportedHeicDecoder;

impl HeicDecoder for UnsupportedHeicDecoder {
    fn decode(&self, _bytes: &[u8]) -> Result<DynamicImage, String> {
        Err("HEIC support is not compiled in; rebuild with `--features heic`".to_string())
    }
}

/// HEIC decoder backed by the system libheif.
#[cfg(feature = "heic")]
pub struct LibHeifDecoder;

#[cfg(feature = "heic")]
impl HeicDecoder for LibHeifDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, String> {
        use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

        let lib = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(bytes).map_err(|e| e.to_string())?;
        let handle = ctx.primary_image_handle().map_err(|e| e.to_string())?;
        let decoded = lib
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
            .map_err(|e| e.to_string())?;

        let width = decoded.width();
        let height = decoded.height();
        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| "decoded image has no interleaved plane".to_string())?;

        // Rows may be padded beyond width * 4 bytes.
        let row_len = width as usize * 4;
        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in plane.data.chunks(plane.stride).take(height as usize) {
            pixels.extend_from_slice(&row[..row_len]);
        }

        image::RgbaImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "pixel buffer does not match image dimensions".to_string())
    }
}

/// The decoder matching the enabled crate features.
pub fn default_heic_decoder() -> Arc<dyn HeicDecoder> {
    #[cfg(feature = "heic")]
    {
        Arc::new(LibHeifDecoder)
    }
    #[cfg(not(feature = "heic"))]
    {
        Arc::new(UnsupportedHeicDecoder)
    }
}

/// A displayable reference to an accepted image.
///
/// Owns a temporary file; the file is deleted when the handle is dropped.
#[derive(Debug)]
pub struct PreviewHandle {
    file: NamedTempFile,
}

impl PreviewHandle {
    /// Write `bytes` to a fresh temporary file named after `name`'s extension.
    pub fn create(name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        use std::io::Write;

        let suffix = Path::new(name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("headshot-preview-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the preview now, surfacing any I/O error.
    pub fn release(self) -> std::io::Result<()> {
        self.file.close()
    }
}

/// An accepted image, ready to be sent for generation.
#[derive(Debug)]
pub struct ProcessedImage {
    /// The normalised file (converted, or the original blob).
    pub file: ImageFile,
    pub preview: PreviewHandle,
    pub was_converted: bool,
}

/// Turns accepted candidates into [`ProcessedImage`]s.
#[derive(Clone)]
pub struct Normalizer {
    decoder: Arc<dyn HeicDecoder>,
    format: ConversionFormat,
    quality: f32,
}

impl Normalizer {
    /// Normaliser using the feature-selected decoder and the config's target format.
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_decoder(config, default_heic_decoder())
    }

    pub fn with_decoder(config: &PipelineConfig, decoder: Arc<dyn HeicDecoder>) -> Self {
        Self {
            decoder,
            format: config.conversion_format,
            quality: config.conversion_quality,
        }
    }

    /// Normalise one candidate.
    ///
    /// # Errors
    /// [`HeadshotError::ConversionFailed`] when decoding, encoding or the
    /// preview write fails. Nothing partial is returned.
    pub async fn normalize(&self, candidate: UploadCandidate) -> Result<ProcessedImage, HeadshotError> {
        let file = candidate.file;

        if !is_heic_name(&file.name) {
            debug!("{} needs no conversion", file.name);
            let preview = make_preview(&file).await?;
            return Ok(ProcessedImage {
                file,
                preview,
                was_converted: false,
            });
        }

        info!("Converting {} to {:?}", file.name, self.format);
        let decoder = Arc::clone(&self.decoder);
        let format = self.format;
        let quality = self.quality;
        let source = file.bytes.clone();
        let name = file.name.clone();

        let encoded = tokio::task::spawn_blocking(move || {
            let img = decoder.decode(&source)?;
            encode_image(&img, format, quality).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| HeadshotError::Internal(format!("Conversion task panicked: {}", e)))?
        .map_err(|detail| HeadshotError::ConversionFailed {
            name: name.clone(),
            detail,
        })?;

        let converted = ImageFile::new(
            replace_heic_extension(&name, format.extension()),
            format.media_type(),
            encoded,
        );
        info!(
            "Converted {} → {} ({} bytes)",
            name,
            converted.name,
            converted.len()
        );

        let preview = make_preview(&converted).await?;
        Ok(ProcessedImage {
            file: converted,
            preview,
            was_converted: true,
        })
    }
}

async fn make_preview(file: &ImageFile) -> Result<PreviewHandle, HeadshotError> {
    let name = file.name.clone();
    let bytes = file.bytes.clone();
    tokio::task::spawn_blocking(move || PreviewHandle::create(&name, &bytes))
        .await
        .map_err(|e| HeadshotError::Internal(format!("Preview task panicked: {}", e)))?
        .map_err(|e| HeadshotError::ConversionFailed {
            name: file.name.clone(),
            detail: format!("could not write preview: {}", e),
        })
}
