//! Pipeline entry points.
//!
//! Each function drives one user-visible step and returns a step-level
//! [`HeadshotError`] on failure; nothing is retried here. The steps:
//!
//! 1. [`accept_upload`] — validate, then normalise a picked file
//! 2. [`generate`]      — upload the source photo, request the batch,
//!    materialise artifacts
//! 3. [`download`]      — throttled, sequential download of (part of) a batch

use crate::config::PipelineConfig;
use crate::error::HeadshotError;
use crate::output::{Batch, DownloadReport, GeneratedArtifact};
use crate::pipeline::download::{BatchDownloader, Selection};
use crate::pipeline::materialize::materialize;
use crate::pipeline::normalize::{Normalizer, ProcessedImage};
use crate::pipeline::request::GenerationRequest;
use crate::pipeline::validate::{validate, UploadCandidate};
use crate::service::{GenerationService, ModifyImageRequest};
use chrono::Utc;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Validate and normalise a candidate.
///
/// Validation runs first; a rejected file never reaches the normaliser, so
/// no preview is ever created for it.
pub async fn accept_upload(
    candidate: UploadCandidate,
    normalizer: &Normalizer,
    config: &PipelineConfig,
) -> Result<ProcessedImage, HeadshotError> {
    validate(&candidate, config.max_upload_bytes)?;
    debug!(
        "Accepted {} ({} bytes, {})",
        candidate.name(),
        candidate.declared_size,
        candidate.media_type()
    );

    let image = normalizer.normalize(candidate).await?;
    if image.was_converted {
        info!("HEIC image converted to {}", image.file.name);
    }
    Ok(image)
}

/// Read a file from disk and run it through [`accept_upload`].
///
/// Files over `config.max_upload_bytes` are rejected from their metadata,
/// without being read.
pub async fn accept_path(
    path: impl AsRef<Path>,
    normalizer: &Normalizer,
    config: &PipelineConfig,
) -> Result<ProcessedImage, HeadshotError> {
    let candidate = UploadCandidate::from_path(path, config.max_upload_bytes).await?;
    accept_upload(candidate, normalizer, config).await
}

/// Run one generation attempt.
///
/// Uploads the source photo under `{upload_prefix}/{timestamp_ms}-{name}`,
/// asks the service for `request.count` images and materialises the result.
///
/// # Errors
/// * [`HeadshotError::UploadFailed`] — upload errored, timed out, reported
///   failure or returned no URL
/// * [`HeadshotError::GenerationFailed`] — generation errored, reported
///   failure, or produced zero usable images
/// * [`HeadshotError::GenerationTimeout`] — no answer within
///   `config.api_timeout_secs`
pub async fn generate(
    service: &dyn GenerationService,
    request: &GenerationRequest,
    config: &PipelineConfig,
) -> Result<Batch, HeadshotError> {
    let start = Instant::now();
    info!(
        "Generating {} {} headshots from {}",
        request.count, request.style, request.source.name
    );

    // ── Step 1: Upload the source photo ──────────────────────────────────
    let upload_path = format!(
        "{}/{}-{}",
        config.upload_prefix.trim_end_matches('/'),
        Utc::now().timestamp_millis(),
        request.source.name
    );
    let timeout = Duration::from_secs(config.api_timeout_secs);
    let uploaded = tokio::time::timeout(timeout, service.upload_file(&request.source, &upload_path))
        .await
        .map_err(|_| HeadshotError::UploadFailed {
            reason: format!("no answer within {}s", config.api_timeout_secs),
        })?
        .map_err(|e| HeadshotError::UploadFailed {
            reason: e.to_string(),
        })?;
    let source_url = match uploaded.url {
        Some(url) if uploaded.success && !url.trim().is_empty() => url,
        _ => {
            return Err(HeadshotError::UploadFailed {
                reason: "service reported no URL for the uploaded image".into(),
            })
        }
    };
    debug!("Uploaded source to {}", source_url);

    // ── Step 2: Request the batch ────────────────────────────────────────
    let modify = ModifyImageRequest {
        images: vec![source_url.clone()],
        prompt: request.prompt.clone(),
        n: request.count.get(),
        size: request.output_size.clone(),
        response_format: config.response_format.clone(),
    };
    let response = tokio::time::timeout(timeout, service.modify_image(&modify))
        .await
        .map_err(|_| HeadshotError::GenerationTimeout {
            secs: config.api_timeout_secs,
        })?
        .map_err(|e| HeadshotError::GenerationFailed {
            reason: e.to_string(),
        })?;

    if !response.success {
        return Err(HeadshotError::GenerationFailed {
            reason: "service reported failure".into(),
        });
    }

    // ── Step 3: Materialise ──────────────────────────────────────────────
    let generated_at = Utc::now();
    let artifacts: Vec<GeneratedArtifact> = materialize(
        &response.data,
        &request.style,
        &request.prompt,
        generated_at.timestamp_millis(),
    );
    if artifacts.is_empty() {
        return Err(HeadshotError::GenerationFailed {
            reason: "service returned no images".into(),
        });
    }
    if artifacts.len() < request.count.get() as usize {
        warn!(
            "Asked for {} images, received {}",
            request.count,
            artifacts.len()
        );
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    info!("Generated {} headshots in {}ms", artifacts.len(), duration_ms);

    Ok(Batch {
        artifacts,
        requested: request.count.get(),
        prompt: request.prompt.clone(),
        style: request.style.clone(),
        source_url,
        generated_at,
        duration_ms,
    })
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    service: &dyn GenerationService,
    request: &GenerationRequest,
    config: &PipelineConfig,
) -> Result<Batch, HeadshotError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| HeadshotError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(service, request, config))
}

/// Download artifacts over HTTP into `config.download_dir`.
pub async fn download(
    artifacts: &[GeneratedArtifact],
    selection: &Selection,
    config: &PipelineConfig,
) -> Result<DownloadReport, HeadshotError> {
    BatchDownloader::new(config)?
        .download_batch(artifacts, selection)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::validate::ImageFile;
    use crate::wizard::{Step, WizardAction, WizardState};
    use crate::service::{ModifyImageResponse, RemoteImage, ServiceError, UploadResponse};
    use async_trait::async_trait;

    struct FailingUpload;

    #[async_trait]
    impl GenerationService for FailingUpload {
        async fn upload_file(&self, _f: &ImageFile, _p: &str) -> Result<UploadResponse, ServiceError> {
            Ok(UploadResponse {
                success: false,
                url: None,
            })
        }

        async fn modify_image(
            &self,
            _r: &ModifyImageRequest,
        ) -> Result<ModifyImageResponse, ServiceError> {
            panic!("must not be called after a failed upload");
        }
    }

    struct SlowService;

    #[async_trait]
    impl GenerationService for SlowService {
        async fn upload_file(&self, _f: &ImageFile, _p: &str) -> Result<UploadResponse, ServiceError> {
            Ok(UploadResponse {
                success: true,
                url: Some("https://store/x.png".into()),
            })
        }

        async fn modify_image(
            &self,
            _r: &ModifyImageRequest,
        ) -> Result<ModifyImageResponse, ServiceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ModifyImageResponse {
                success: true,
                data: vec![RemoteImage::default()],
            })
        }
    }

    /// Uploads succeed; generation answers with a fixed outcome.
    struct ScriptedService {
        outcome: fn() -> Result<ModifyImageResponse, ServiceError>,
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn upload_file(&self, _f: &ImageFile, _p: &str) -> Result<UploadResponse, ServiceError> {
            Ok(UploadResponse {
                success: true,
                url: Some("https://store/x.png".into()),
            })
        }

        async fn modify_image(
            &self,
            _r: &ModifyImageRequest,
        ) -> Result<ModifyImageResponse, ServiceError> {
            (self.outcome)()
        }
    }

    struct StalledUpload;

    #[async_trait]
    impl GenerationService for StalledUpload {
        async fn upload_file(&self, _f: &ImageFile, _p: &str) -> Result<UploadResponse, ServiceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(UploadResponse::default())
        }

        async fn modify_image(
            &self,
            _r: &ModifyImageRequest,
        ) -> Result<ModifyImageResponse, ServiceError> {
            panic!("must not be called after a stalled upload");
        }
    }

    async fn generation_error(outcome: fn() -> Result<ModifyImageResponse, ServiceError>) -> HeadshotError {
        generate(&ScriptedService { outcome }, &request(), &PipelineConfig::default())
            .await
            .unwrap_err()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            source: ImageFile::new("me.png", "image/png", vec![1u8]),
            prompt: "p".into(),
            count: crate::pipeline::request::Quantity::new(2),
            output_size: "1024x1024".into(),
            style: "Casual".into(),
        }
    }

    #[tokio::test]
    async fn failed_upload_stops_before_generation() {
        let err = generate(&FailingUpload, &request(), &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HeadshotError::UploadFailed { .. }));
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let config = PipelineConfig::builder().api_timeout_secs(1).build().unwrap();
        let err = generate(&SlowService, &request(), &config).await.unwrap_err();
        assert!(matches!(err, HeadshotError::GenerationTimeout { secs: 1 }));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_normalising() {
        let config = PipelineConfig::builder().max_upload_bytes(2).build().unwrap();
        let normalizer = Normalizer::new(&config);
        let candidate =
            UploadCandidate::new(ImageFile::new("me.png", "image/png", vec![0u8; 3]));

        let err = accept_upload(candidate, &normalizer, &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn reported_failure_is_generation_failed() {
        let err = generation_error(|| {
            Ok(ModifyImageResponse {
                success: false,
                data: vec![RemoteImage {
                    url: Some("https://cdn/0.png".into()),
                }],
            })
        })
        .await;
        assert!(matches!(err, HeadshotError::GenerationFailed { .. }));
        assert_eq!(err.kind(), ErrorKind::Generation);
    }

    #[tokio::test]
    async fn service_error_is_generation_failed() {
        let err = generation_error(|| {
            Err(ServiceError::Status {
                status: 503,
                body: "overloaded".into(),
            })
        })
        .await;
        match &err {
            HeadshotError::GenerationFailed { reason } => assert!(reason.contains("503")),
            other => panic!("expected GenerationFailed, got {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Generation);
    }

    #[tokio::test]
    async fn no_usable_images_is_generation_failed() {
        let empty = generation_error(|| {
            Ok(ModifyImageResponse {
                success: true,
                data: vec![],
            })
        })
        .await;
        assert!(matches!(empty, HeadshotError::GenerationFailed { .. }));

        let no_urls = generation_error(|| {
            Ok(ModifyImageResponse {
                success: true,
                data: vec![RemoteImage::default(), RemoteImage { url: Some(" ".into()) }],
            })
        })
        .await;
        assert!(matches!(no_urls, HeadshotError::GenerationFailed { .. }));
        assert_eq!(no_urls.kind(), ErrorKind::Generation);
    }

    #[tokio::test]
    async fn stalled_upload_times_out() {
        let config = PipelineConfig::builder().api_timeout_secs(1).build().unwrap();
        let err = generate(&StalledUpload, &request(), &config).await.unwrap_err();
        match err {
            HeadshotError::UploadFailed { reason } => assert!(reason.contains("1s")),
            other => panic!("expected UploadFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_generation_resets_the_wizard() {
        let state = WizardState::new().reduce(WizardAction::BeginGeneration);
        let ticket = state.in_flight().unwrap();

        let service = ScriptedService {
            outcome: || {
                Ok(ModifyImageResponse {
                    success: false,
                    data: vec![],
                })
            },
        };
        let state = match generate(&service, &request(), &PipelineConfig::default()).await {
            Ok(batch) => state.reduce(WizardAction::FinishGeneration {
                ticket,
                artifacts: batch.artifacts,
            }),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Generation);
                state.reduce(WizardAction::FailGeneration { ticket })
            }
        };

        assert!(!state.is_generating());
        assert!(state.batch().is_empty());
        assert!(!state.is_completed(Step::Generate));
    }
}
