//! The hosted generation/storage service, seen from the pipeline.
//!
//! The pipeline never talks HTTP directly: it calls [`GenerationService`],
//! whose contract is deliberately narrow:
//!
//! 1. `upload_file(file, path)` → `{ success, url }`
//! 2. `modify_image({ images: [url], prompt, n, size, response_format })`
//!    → `{ success, data: [{ url }] }`
//!
//! [`HttpGenerationService`] implements it over JSON/HTTPS with `reqwest`.
//! Tests substitute an in-memory implementation.

use crate::error::HeadshotError;
use crate::pipeline::validate::ImageFile;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure talking to the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request never got an HTTP response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not what the contract promises.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Body of the upload call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub path: String,
    pub content_type: String,
    pub data_base64: String,
}

/// Answer to the upload call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of the generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyImageRequest {
    /// Source image URLs; the pipeline always sends exactly one.
    pub images: Vec<String>,
    pub prompt: String,
    pub n: u8,
    pub size: String,
    pub response_format: String,
}

/// One generated image as returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteImage {
    #[serde(default)]
    pub url: Option<String>,
}

/// Answer to the generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifyImageResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<RemoteImage>,
}

/// The external generation/storage collaborator.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Store `file` under `path` and return its public URL.
    async fn upload_file(&self, file: &ImageFile, path: &str) -> Result<UploadResponse, ServiceError>;

    /// Generate `n` variations of the given source images.
    async fn modify_image(
        &self,
        request: &ModifyImageRequest,
    ) -> Result<ModifyImageResponse, ServiceError>;
}

/// [`GenerationService`] over JSON/HTTPS.
///
/// Endpoints, relative to `base_url`:
/// * `POST /api/storage/{project}/upload`
/// * `POST /api/ai/{project}/modify-image`
#[derive(Clone)]
pub struct HttpGenerationService {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpGenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerationService")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpGenerationService {
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, HeadshotError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let project_id = project_id.into();

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HeadshotError::ServiceNotConfigured {
                hint: format!("Service URL must be an HTTP/HTTPS URL, got '{base_url}'"),
            });
        }
        if project_id.trim().is_empty() {
            return Err(HeadshotError::ServiceNotConfigured {
                hint: "Project id must not be empty.".into(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| HeadshotError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            project_id,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Configure from `HEADSHOT_SERVICE_URL`, `HEADSHOT_PROJECT_ID` and the
    /// optional `HEADSHOT_API_KEY`.
    pub fn from_env(timeout_secs: u64) -> Result<Self, HeadshotError> {
        let url = non_empty_env("HEADSHOT_SERVICE_URL").ok_or_else(|| {
            HeadshotError::ServiceNotConfigured {
                hint: "Set HEADSHOT_SERVICE_URL (and HEADSHOT_PROJECT_ID) or pass --service-url."
                    .into(),
            }
        })?;
        let project = non_empty_env("HEADSHOT_PROJECT_ID").ok_or_else(|| {
            HeadshotError::ServiceNotConfigured {
                hint: "Set HEADSHOT_PROJECT_ID or pass --project.".into(),
            }
        })?;
        Self::new(url, project, non_empty_env("HEADSHOT_API_KEY"), timeout_secs)
    }

    fn endpoint(&self, area: &str, action: &str) -> String {
        format!("{}/api/{}/{}/{}", self.base_url, area, self.project_id, action)
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let mut req = self.client.post(url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn upload_file(&self, file: &ImageFile, path: &str) -> Result<UploadResponse, ServiceError> {
        let body = UploadRequest {
            path: path.to_string(),
            content_type: file.media_type.clone(),
            data_base64: STANDARD.encode(&file.bytes),
        };
        debug!("Uploading {} ({} bytes) to {}", file.name, file.len(), path);
        self.post_json(&self.endpoint("storage", "upload"), &body).await
    }

    async fn modify_image(
        &self,
        request: &ModifyImageRequest,
    ) -> Result<ModifyImageResponse, ServiceError> {
        debug!("Requesting {} images at {}", request.n, request.size);
        self.post_json(&self.endpoint("ai", "modify-image"), request)
            .await
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
