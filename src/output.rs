//! Result types produced by generation and download.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One generated headshot plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// `"{batch_timestamp_ms}-{index}"`, unique within its batch.
    pub id: String,
    /// Where the service hosts the image.
    pub url: String,
    /// The exact prompt that produced it.
    pub prompt: String,
    /// Display name of the style used.
    pub style: String,
}

/// The artifacts produced by one generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub artifacts: Vec<GeneratedArtifact>,
    /// How many images were asked for; the service may return fewer.
    pub requested: u8,
    pub prompt: String,
    pub style: String,
    /// URL of the uploaded source photo.
    pub source_url: String,
    pub generated_at: DateTime<Utc>,
    /// Wall-clock time of upload + generation.
    pub duration_ms: u64,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// A file written by the batch downloader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedFile {
    /// Artifact id the file came from.
    pub id: String,
    /// 1-based position within the downloaded (sub)batch.
    pub position: usize,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Outcome of a fully successful batch download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadReport {
    pub files: Vec<DownloadedFile>,
    /// Number of pauses inserted between items.
    pub throttle_pauses: usize,
    pub duration_ms: u64,
}
