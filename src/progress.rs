//! Progress-callback trait for batch download events.
//!
//! Inject an [`Arc<dyn DownloadProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as [`crate::pipeline::download::BatchDownloader`] walks a batch.
//!
//! Downloads run strictly one after another, so callbacks are never invoked
//! concurrently for the same batch. The trait is still `Send + Sync` because
//! the config that carries it may be shared across tasks.
//!
//! # Example
//!
//! ```rust
//! use headshot_pipeline::{DownloadProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     saved: AtomicUsize,
//! }
//!
//! impl DownloadProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, position: usize, total: usize, _path: &std::path::Path, _bytes: usize) {
//!         self.saved.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("saved {}/{}", position, total);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { saved: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn DownloadProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Called by the batch downloader as it processes each item.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Positions are 1-based within the batch being
/// downloaded.
pub trait DownloadProgressCallback: Send + Sync {
    /// Called once before the first fetch.
    fn on_download_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before an item is fetched.
    fn on_item_start(&self, position: usize, total: usize) {
        let _ = (position, total);
    }

    /// Called when an item has been fetched and saved.
    ///
    /// # Arguments
    /// * `path`  — where the file was written
    /// * `bytes` — size of the saved file
    fn on_item_complete(&self, position: usize, total: usize, path: &Path, bytes: usize) {
        let _ = (position, total, path, bytes);
    }

    /// Called when fetching or saving an item failed.
    fn on_item_error(&self, position: usize, total: usize, error: &str) {
        let _ = (position, total, error);
    }

    /// Called right before the downloader pauses between two items.
    fn on_throttle(&self, delay: Duration) {
        let _ = delay;
    }

    /// Called once after every item has been attempted.
    fn on_download_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DownloadProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn DownloadProgressCallback>;
