//! Throttled batch download of generated headshots.
//!
//! Items are fetched and saved strictly one after another, with a fixed pause
//! between two successive items and none after the last.
//!
//! A failing item never stops its siblings. Once every item has been
//! attempted, any failure turns the whole call into
//! [`HeadshotError::DownloadFailed`] listing each per-item error.

use crate::config::PipelineConfig;
use crate::error::{DownloadError, HeadshotError};
use crate::output::{DownloadReport, DownloadedFile, GeneratedArtifact};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which artifacts of a batch to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The whole batch.
    All,
    /// Only these artifact ids, in batch order.
    Subset(HashSet<String>),
}

impl Selection {
    pub fn subset<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::Subset(ids.into_iter().map(Into::into).collect())
    }
}

/// Retrieves the bytes behind an artifact URL.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// [`ArtifactFetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, HeadshotError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| HeadshotError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                "timed out".to_string()
            } else {
                e.to_string()
            }
        })?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}

static RE_NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lower-case `style` and collapse every run of non `[a-z0-9]` into one `-`.
pub fn slug(style: &str) -> String {
    RE_NON_ALNUM_RUN
        .replace_all(&style.to_lowercase(), "-")
        .into_owned()
}

/// `headshot-{slug}-{position}-{YYYY-MM-DD}.png`, `position` 1-based.
pub fn download_filename(position: usize, style: &str, date: NaiveDate) -> String {
    format!(
        "headshot-{}-{}-{}.png",
        slug(style),
        position,
        date.format("%Y-%m-%d")
    )
}

/// Downloads artifacts one by one into a directory.
#[derive(Clone)]
pub struct BatchDownloader {
    fetcher: Arc<dyn ArtifactFetcher>,
    output_dir: PathBuf,
    throttle: Duration,
    progress: Option<ProgressCallback>,
}

impl BatchDownloader {
    /// Downloader using HTTP and the config's directory, throttle and callback.
    pub fn new(config: &PipelineConfig) -> Result<Self, HeadshotError> {
        let fetcher = HttpFetcher::new(config.download_timeout_secs)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: &PipelineConfig, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            fetcher,
            output_dir: config.download_dir.clone(),
            throttle: Duration::from_millis(config.throttle_ms),
            progress: config.progress_callback.clone(),
        }
    }

    /// Download the selected artifacts, dated today (UTC).
    pub async fn download_batch(
        &self,
        artifacts: &[GeneratedArtifact],
        selection: &Selection,
    ) -> Result<DownloadReport, HeadshotError> {
        let today = chrono::Utc::now().date_naive();
        self.download_batch_dated(artifacts, selection, today).await
    }

    /// Like [`Self::download_batch`] with an explicit date for the file names.
    pub async fn download_batch_dated(
        &self,
        artifacts: &[GeneratedArtifact],
        selection: &Selection,
        date: NaiveDate,
    ) -> Result<DownloadReport, HeadshotError> {
        let items: Vec<&GeneratedArtifact> = match selection {
            Selection::All => artifacts.iter().collect(),
            Selection::Subset(ids) => {
                if ids.is_empty() {
                    return Err(HeadshotError::NothingSelected);
                }
                artifacts.iter().filter(|a| ids.contains(&a.id)).collect()
            }
        };
        if items.is_empty() {
            return Err(HeadshotError::NothingSelected);
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| HeadshotError::DownloadDirUnavailable {
                path: self.output_dir.clone(),
                source,
            })?;

        let start = Instant::now();
        let total = items.len();
        info!(
            "Downloading {} images to {}",
            total,
            self.output_dir.display()
        );
        if let Some(ref cb) = self.progress {
            cb.on_download_start(total);
        }

        let mut files = Vec::with_capacity(total);
        let mut errors = Vec::new();
        let mut pauses = 0;

        for (i, artifact) in items.iter().enumerate() {
            let position = i + 1;
            if let Some(ref cb) = self.progress {
                cb.on_item_start(position, total);
            }

            match self.download_one(artifact, position, date).await {
                Ok(file) => {
                    debug!("Saved {} → {}", artifact.id, file.path.display());
                    if let Some(ref cb) = self.progress {
                        cb.on_item_complete(position, total, &file.path, file.bytes);
                    }
                    files.push(file);
                }
                Err(e) => {
                    warn!("{}", e);
                    if let Some(ref cb) = self.progress {
                        cb.on_item_error(position, total, &e.to_string());
                    }
                    errors.push(e);
                }
            }

            if position < total {
                if let Some(ref cb) = self.progress {
                    cb.on_throttle(self.throttle);
                }
                tokio::time::sleep(self.throttle).await;
                pauses += 1;
            }
        }

        if let Some(ref cb) = self.progress {
            cb.on_download_complete(total, files.len());
        }

        if !errors.is_empty() {
            return Err(HeadshotError::DownloadFailed {
                saved: files.len(),
                failed: errors.len(),
                total,
                errors,
            });
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Downloaded {} images in {}ms", total, duration_ms);
        Ok(DownloadReport {
            files,
            throttle_pauses: pauses,
            duration_ms,
        })
    }

    async fn download_one(
        &self,
        artifact: &GeneratedArtifact,
        position: usize,
        date: NaiveDate,
    ) -> Result<DownloadedFile, DownloadError> {
        let bytes = self
            .fetcher
            .fetch(&artifact.url)
            .await
            .map_err(|detail| DownloadError::FetchFailed {
                position,
                id: artifact.id.clone(),
                detail,
            })?;

        let wanted = self
            .output_dir
            .join(download_filename(position, &artifact.style, date));
        let path = write_atomic(&wanted, &bytes)
            .await
            .map_err(|e| DownloadError::SaveFailed {
                position,
                id: artifact.id.clone(),
                path: wanted.clone(),
                detail: e.to_string(),
            })?;

        Ok(DownloadedFile {
            id: artifact.id.clone(),
            position,
            path,
            bytes: bytes.len(),
        })
    }
}

/// Write to a sibling temp file, then rename it to the first free name.
///
/// An existing file is never replaced: `name.png` becomes `name (1).png`,
/// `name (2).png`, ... Returns the path actually written.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let tmp_path = path.with_extension("png.tmp");
    tokio::fs::write(&tmp_path, bytes).await?;

    let renamed = match free_path(path).await {
        Ok(target) => match tokio::fs::rename(&tmp_path, &target).await {
            Ok(()) => Ok(target),
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    if renamed.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    renamed
}

/// `path` itself if unused, otherwise the first `stem (n).ext` that is.
async fn free_path(path: &Path) -> std::io::Result<PathBuf> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(path.to_path_buf());
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = path.with_file_name(format!("{stem} ({n}){ext}"));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactFetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                Err("HTTP 404 Not Found".to_string())
            } else {
                Ok(url.as_bytes().to_vec())
            }
        }
    }

    fn artifact(i: usize, url: &str) -> GeneratedArtifact {
        GeneratedArtifact {
            id: format!("1700000000000-{i}"),
            url: url.to_string(),
            prompt: "p".into(),
            style: "Professional".into(),
        }
    }

    fn downloader(dir: &Path, throttle_ms: u64) -> (BatchDownloader, Arc<CountingFetcher>) {
        let config = PipelineConfig::builder()
            .download_dir(dir)
            .throttle_ms(throttle_ms)
            .build()
            .unwrap();
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        (
            BatchDownloader::with_fetcher(&config, fetcher.clone()),
            fetcher,
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn slug_collapses_runs() {
        assert_eq!(slug("Professional"), "professional");
        assert_eq!(slug("Black & White  Noir"), "black-white-noir");
        assert_eq!(slug("Été 2024"), "-t-2024");
    }

    #[test]
    fn filename_format() {
        assert_eq!(
            download_filename(1, "Casual", date()),
            "headshot-casual-1-2024-03-09.png"
        );
    }

    #[tokio::test]
    async fn empty_selection_fails_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let (dl, fetcher) = downloader(dir.path(), 0);
        let batch = vec![artifact(0, "https://a"), artifact(1, "https://b")];

        let err = dl
            .download_batch_dated(&batch, &Selection::Subset(HashSet::new()), date())
            .await
            .unwrap_err();
        assert!(matches!(err, HeadshotError::NothingSelected));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn three_items_pause_twice() {
        let dir = tempfile::tempdir().unwrap();
        let (dl, fetcher) = downloader(dir.path(), 40);
        let batch: Vec<_> = (0..3).map(|i| artifact(i, &format!("https://x/{i}"))).collect();

        let start = Instant::now();
        let report = dl
            .download_batch_dated(&batch, &Selection::All, date())
            .await
            .unwrap();

        assert_eq!(report.throttle_pauses, 2);
        assert_eq!(report.files.len(), 3);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn subset_positions_restart_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let (dl, _) = downloader(dir.path(), 0);
        let batch: Vec<_> = (0..4).map(|i| artifact(i, &format!("https://x/{i}"))).collect();

        let selection = Selection::subset(["1700000000000-3", "1700000000000-1"]);
        let report = dl
            .download_batch_dated(&batch, &selection, date())
            .await
            .unwrap();

        let names: Vec<_> = report
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "headshot-professional-1-2024-03-09.png",
                "headshot-professional-2-2024-03-09.png"
            ]
        );
        // Batch order is kept: id -1 comes before id -3.
        assert_eq!(report.files[0].id, "1700000000000-1");
        assert_eq!(
            std::fs::read(&report.files[1].path).unwrap(),
            b"https://x/3".to_vec()
        );
    }

    #[tokio::test]
    async fn failure_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let (dl, fetcher) = downloader(dir.path(), 0);
        let batch = vec![
            artifact(0, "https://x/0"),
            artifact(1, "https://x/broken"),
            artifact(2, "https://x/2"),
        ];

        let err = dl
            .download_batch_dated(&batch, &Selection::All, date())
            .await
            .unwrap_err();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        match err {
            HeadshotError::DownloadFailed {
                saved,
                failed,
                total,
                errors,
            } => {
                assert_eq!((saved, failed, total), (2, 1, 3));
                assert!(matches!(
                    errors[0],
                    DownloadError::FetchFailed { position: 2, .. }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(dir.path().join("headshot-professional-3-2024-03-09.png").exists());
        assert!(!dir.path().join("headshot-professional-2-2024-03-09.png").exists());
    }

    #[tokio::test]
    async fn subset_matching_nothing_is_nothing_selected() {
        let dir = tempfile::tempdir().unwrap();
        let (dl, fetcher) = downloader(dir.path(), 0);
        let batch = vec![artifact(0, "https://a")];

        let err = dl
            .download_batch_dated(&batch, &Selection::subset(["stale-id"]), date())
            .await
            .unwrap_err();
        assert!(matches!(err, HeadshotError::NothingSelected));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_batch_same_day_keeps_first_files() {
        let dir = tempfile::tempdir().unwrap();
        let (dl, _) = downloader(dir.path(), 0);
        let first = vec![GeneratedArtifact {
            id: "1-0".into(),
            ..artifact(0, "https://first/batch")
        }];
        let second = vec![GeneratedArtifact {
            id: "2-0".into(),
            ..artifact(0, "https://second/batch")
        }];

        let a = dl.download_batch_dated(&first, &Selection::All, date()).await.unwrap();
        let b = dl.download_batch_dated(&second, &Selection::All, date()).await.unwrap();

        assert_eq!(
            a.files[0].path,
            dir.path().join("headshot-professional-1-2024-03-09.png")
        );
        assert_eq!(
            b.files[0].path,
            dir.path().join("headshot-professional-1-2024-03-09 (1).png")
        );
        assert_eq!(std::fs::read(&a.files[0].path).unwrap(), b"https://first/batch".to_vec());
        assert_eq!(std::fs::read(&b.files[0].path).unwrap(), b"https://second/batch".to_vec());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        let c = dl.download_batch_dated(&second, &Selection::All, date()).await.unwrap();
        assert_eq!(
            c.files[0].path,
            dir.path().join("headshot-professional-1-2024-03-09 (2).png")
        );
    }

    #[tokio::test]
    async fn unusable_download_dir_fails_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let (dl, fetcher) = downloader(&blocker.join("out"), 0);
        let batch = vec![artifact(0, "https://a"), artifact(1, "https://b")];

        let err = dl
            .download_batch_dated(&batch, &Selection::All, date())
            .await
            .unwrap_err();
        match &err {
            HeadshotError::DownloadDirUnavailable { path, .. } => {
                assert_eq!(path, &blocker.join("out"));
            }
            other => panic!("expected DownloadDirUnavailable, got {other:?}"),
        }
        assert_eq!(err.kind(), crate::error::ErrorKind::Download);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
