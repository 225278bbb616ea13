//! # headshot-pipeline
//!
//! Turn one uploaded portrait into a batch of AI-generated professional
//! headshots, then save the ones you like.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo
//!  │
//!  ├─ 1. Validate   size ≤ 10 MB, JPEG / PNG / WebP / HEIC / HEIF
//!  ├─ 2. Normalize  HEIC → PNG (CPU-bound, spawn_blocking) + preview
//!  ├─ 3. Request    style prompt + custom text, 1–12 images
//!  ├─ 4. Generate   upload source, call the image service
//!  ├─ 5. Results    ids `{timestamp}-{index}`, style + prompt attached
//!  └─ 6. Download   sequential, 500 ms between files
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use headshot_pipeline::{
//!     accept_path, build_request, download, find_style, generate, HttpGenerationService,
//!     Normalizer, PipelineConfig, Selection,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let service = HttpGenerationService::from_env(config.api_timeout_secs)?;
//!
//!     let image = accept_path("me.heic", &Normalizer::new(&config), &config).await?;
//!     let style = find_style("professional").expect("built-in style");
//!     let request = build_request(style, &image, "navy blazer", 4, &config.output_size);
//!
//!     let batch = generate(&service, &request, &config).await?;
//!     let report = download(&batch.artifacts, &Selection::All, &config).await?;
//!     eprintln!("saved {} files", report.files.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `headshot` binary (clap + anyhow + tracing-subscriber) |
//! | `heic`  | off     | Real HEIC/HEIF decoding through `libheif-rs` (needs system libheif) |
//!
//! Without `heic`, HEIC uploads still validate but normalisation fails with
//! a conversion error.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod styles;
pub mod wizard;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionFormat, PipelineConfig, PipelineConfigBuilder};
pub use error::{DownloadError, ErrorKind, HeadshotError, ValidationError, ValidationErrorKind};
pub use generate::{accept_path, accept_upload, download, generate, generate_sync};
pub use output::{Batch, DownloadReport, DownloadedFile, GeneratedArtifact};
pub use pipeline::download::{
    download_filename, slug, ArtifactFetcher, BatchDownloader, HttpFetcher, Selection,
};
pub use pipeline::materialize::materialize;
pub use pipeline::normalize::{HeicDecoder, Normalizer, PreviewHandle, ProcessedImage};
pub use pipeline::request::{build_request, GenerationRequest, Quantity};
pub use pipeline::validate::{validate, ImageFile, UploadCandidate, ALLOWED_MEDIA_TYPES};
pub use progress::{DownloadProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{GenerationService, HttpGenerationService, ServiceError};
pub use styles::{compose_prompt, find_style, StyleTemplate, HEADSHOT_STYLES};
pub use wizard::{GenerationTicket, ImageSlot, Step, WizardAction, WizardState};
