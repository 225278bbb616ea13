//! Error types for the headshot-pipeline library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ValidationError`] — the candidate file was rejected before anything
//!   else happened (too large, wrong type). Reported immediately; the user
//!   simply picks another file.
//!
//! * [`HeadshotError`] — a pipeline step failed as a whole (conversion,
//!   upload, generation, the download batch). Every variant is recoverable:
//!   the caller surfaces it and lets the user re-attempt the same step.
//!   [`HeadshotError::kind`] maps each variant onto its user-facing
//!   category.
//!
//! * [`DownloadError`] — **Non-fatal**: one item of a download batch failed.
//!   Siblings keep going; the batch reports every item error at the end via
//!   [`HeadshotError::DownloadFailed`].
//!
//! Nothing is retried automatically.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse category of a [`HeadshotError`], matching the notification the
/// user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Size/type policy rejected the file.
    Validation,
    /// HEIC/HEIF normalisation failed.
    Conversion,
    /// Upload or generation call failed, or returned nothing usable.
    Generation,
    /// At least one item of a download batch failed, or nothing was selected.
    Download,
    /// Invalid configuration or a step started before its inputs exist.
    Config,
    /// Unexpected internal failure.
    Internal,
}

/// Why a candidate file was rejected by [`crate::pipeline::validate::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Declared byte size exceeds the upload limit.
    #[error("File size must be less than {}MB", .limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },

    /// Neither the declared media type nor the extension is acceptable.
    #[error("Please upload a valid image file (JPEG, PNG, WebP, HEIC)")]
    UnsupportedType { media_type: String, name: String },
}

/// The two kinds of validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    Size,
    Type,
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            ValidationError::TooLarge { .. } => ValidationErrorKind::Size,
            ValidationError::UnsupportedType { .. } => ValidationErrorKind::Type,
        }
    }
}

/// All step-level errors returned by the headshot-pipeline library.
///
/// Per-item download failures use [`DownloadError`] and are collected into
/// [`HeadshotError::DownloadFailed`] rather than aborting the batch.
#[derive(Debug, Error)]
pub enum HeadshotError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The candidate failed the size/type policy.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Input file exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// HEIC/HEIF decoding or re-encoding failed.
    #[error("Failed to convert HEIC image '{name}': {detail}\nPlease try again or pick another photo.")]
    ConversionFailed { name: String, detail: String },

    // ── Generation errors ─────────────────────────────────────────────────
    /// The generation service is not configured (missing URL, project, ...).
    #[error("Generation service is not configured.\n{hint}")]
    ServiceNotConfigured { hint: String },

    /// The source image could not be uploaded to the service's storage.
    #[error("Failed to upload image: {reason}")]
    UploadFailed { reason: String },

    /// The generation call failed or returned no usable images.
    #[error("Failed to generate headshots: {reason}\nPlease try again.")]
    GenerationFailed { reason: String },

    /// The generation call did not answer in time.
    #[error("Generation timed out after {secs}s\nIncrease --api-timeout or try again.")]
    GenerationTimeout { secs: u64 },

    // ── Download errors ───────────────────────────────────────────────────
    /// A subset download was requested with an empty selection.
    #[error("Please select images to download")]
    NothingSelected,

    /// The download directory could not be created; nothing was fetched.
    #[error("Cannot create download directory '{path}': {source}")]
    DownloadDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some items of a download batch failed; the others were saved.
    #[error("Failed to download {failed}/{total} images\nFirst error: {}", first_error(.errors))]
    DownloadFailed {
        saved: usize,
        failed: usize,
        total: usize,
        errors: Vec<DownloadError>,
    },

    // ── Config / state errors ─────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A generation was requested before its inputs exist.
    #[error("Cannot generate yet: no {missing} selected")]
    NotReady { missing: &'static str },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn first_error(errors: &[DownloadError]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl HeadshotError {
    /// The user-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HeadshotError::Validation(_)
            | HeadshotError::FileNotFound { .. }
            | HeadshotError::FileReadFailed { .. } => ErrorKind::Validation,
            HeadshotError::ConversionFailed { .. } => ErrorKind::Conversion,
            HeadshotError::ServiceNotConfigured { .. }
            | HeadshotError::UploadFailed { .. }
            | HeadshotError::GenerationFailed { .. }
            | HeadshotError::GenerationTimeout { .. } => ErrorKind::Generation,
            HeadshotError::NothingSelected
            | HeadshotError::DownloadDirUnavailable { .. }
            | HeadshotError::DownloadFailed { .. } => ErrorKind::Download,
            HeadshotError::InvalidConfig(_) | HeadshotError::NotReady { .. } => ErrorKind::Config,
            HeadshotError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A non-fatal error for a single item of a download batch.
///
/// `position` is the 1-based index within the batch being downloaded.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum DownloadError {
    /// Fetching the remote bytes failed.
    #[error("Image {position} ({id}): fetch failed: {detail}")]
    FetchFailed {
        position: usize,
        id: String,
        detail: String,
    },

    /// Writing the local file failed.
    #[error("Image {position} ({id}): could not save '{path}': {detail}")]
    SaveFailed {
        position: usize,
        id: String,
        path: PathBuf,
        detail: String,
    },
}
