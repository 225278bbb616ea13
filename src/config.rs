//! Configuration types for the headshot pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The builder clamps numeric inputs into their
//! legal ranges; [`PipelineConfigBuilder::build`] rejects the combinations
//! clamping cannot fix.

use crate::error::HeadshotError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Quality factor used when re-encoding converted HEIC/HEIF photos.
pub const DEFAULT_CONVERSION_QUALITY: f32 = 0.9;

/// Pause between two successive downloads of a batch.
pub const DEFAULT_THROTTLE_MS: u64 = 500;

/// Configuration for a headshot generation session.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use headshot_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .output_size("1024x1024")
///     .throttle_ms(250)
///     .download_dir("out")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Largest accepted upload, in bytes. Default: 10 MiB.
    pub max_upload_bytes: u64,

    /// Target encoding for converted HEIC/HEIF photos. Default: PNG.
    pub conversion_format: ConversionFormat,

    /// Quality factor in `0.0..=1.0` for converted photos. Default: 0.9.
    ///
    /// Only lossy targets (JPEG) honour it; PNG is lossless.
    pub conversion_quality: f32,

    /// Output size requested from the generation service. Default: "1024x1024".
    pub output_size: String,

    /// Response format requested from the generation service. Default: "url".
    pub response_format: String,

    /// Storage path prefix for uploaded source photos. Default: "uploads".
    pub upload_prefix: String,

    /// Delay between successive downloads in milliseconds. Default: 500.
    pub throttle_ms: u64,

    /// Directory downloaded headshots are written to. Default: current dir.
    pub download_dir: PathBuf,

    /// Per-item download timeout in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Timeout for the generation call in seconds. Default: 180.
    ///
    /// Generation usually takes 30–60 s for a full batch.
    pub api_timeout_secs: u64,

    /// Download progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            conversion_format: ConversionFormat::default(),
            conversion_quality: DEFAULT_CONVERSION_QUALITY,
            output_size: "1024x1024".to_string(),
            response_format: "url".to_string(),
            upload_prefix: "uploads".to_string(),
            throttle_ms: DEFAULT_THROTTLE_MS,
            download_dir: PathBuf::from("."),
            download_timeout_secs: 120,
            api_timeout_secs: 180,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("conversion_format", &self.conversion_format)
            .field("conversion_quality", &self.conversion_quality)
            .field("output_size", &self.output_size)
            .field("response_format", &self.response_format)
            .field("upload_prefix", &self.upload_prefix)
            .field("throttle_ms", &self.throttle_ms)
            .field("download_dir", &self.download_dir)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn DownloadProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn conversion_format(mut self, format: ConversionFormat) -> Self {
        self.config.conversion_format = format;
        self
    }

    pub fn conversion_quality(mut self, q: f32) -> Self {
        self.config.conversion_quality = q.clamp(0.0, 1.0);
        self
    }

    pub fn output_size(mut self, size: impl Into<String>) -> Self {
        self.config.output_size = size.into();
        self
    }

    pub fn response_format(mut self, format: impl Into<String>) -> Self {
        self.config.response_format = format.into();
        self
    }

    pub fn upload_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.upload_prefix = prefix.into();
        self
    }

    pub fn throttle_ms(mut self, ms: u64) -> Self {
        self.config.throttle_ms = ms;
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, HeadshotError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(HeadshotError::InvalidConfig(
                "Upload limit must be at least 1 byte".into(),
            ));
        }
        if !is_valid_size(&c.output_size) {
            return Err(HeadshotError::InvalidConfig(format!(
                "Output size must look like WIDTHxHEIGHT, got '{}'",
                c.output_size
            )));
        }
        if c.response_format.trim().is_empty() {
            return Err(HeadshotError::InvalidConfig(
                "Response format must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

fn is_valid_size(size: &str) -> bool {
    match size.split_once('x') {
        Some((w, h)) => matches!(
            (w.parse::<u32>(), h.parse::<u32>()),
            (Ok(w), Ok(h)) if w > 0 && h > 0
        ),
        None => false,
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Standard raster encoding HEIC/HEIF photos are converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConversionFormat {
    /// Lossless PNG (default).
    #[default]
    Png,
    /// JPEG at the configured quality.
    Jpeg,
}

impl ConversionFormat {
    /// Media type of the encoded output.
    pub fn media_type(self) -> &'static str {
        match self {
            ConversionFormat::Png => "image/png",
            ConversionFormat::Jpeg => "image/jpeg",
        }
    }

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ConversionFormat::Png => "png",
            ConversionFormat::Jpeg => "jpg",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_upload_policy() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.conversion_format, ConversionFormat::Png);
        assert_eq!(c.conversion_quality, 0.9);
        assert_eq!(c.output_size, "1024x1024");
        assert_eq!(c.response_format, "url");
        assert_eq!(c.throttle_ms, 500);
    }

    #[test]
    fn builder_clamps_quality() {
        let c = PipelineConfig::builder()
            .conversion_quality(1.7)
            .build()
            .unwrap();
        assert_eq!(c.conversion_quality, 1.0);
    }

    #[test]
    fn builder_rejects_malformed_size() {
        let err = PipelineConfig::builder()
            .output_size("huge")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("WIDTHxHEIGHT"));

        assert!(PipelineConfig::builder().output_size("0x512").build().is_err());
        assert!(PipelineConfig::builder().output_size("512x768").build().is_ok());
    }

    #[test]
    fn builder_rejects_zero_limit() {
        assert!(PipelineConfig::builder().max_upload_bytes(0).build().is_err());
    }

    #[test]
    fn conversion_format_naming() {
        assert_eq!(ConversionFormat::Png.media_type(), "image/png");
        assert_eq!(ConversionFormat::Jpeg.extension(), "jpg");
    }
}
