//! Upload candidates and the size/type acceptance policy.
//!
//! A candidate is the raw file a user picked: bytes, a file name, a declared
//! media type and a declared size. [`validate`] decides whether the pipeline
//! accepts it. It is pure: no I/O, no mutation.

use crate::error::{HeadshotError, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Shared, immutable image bytes.
///
/// Cloning is a reference-count bump, so a pass-through normalisation hands
/// back the very same allocation.
pub type Blob = Arc<[u8]>;

/// Media types accepted as declared by the picker.
pub const ALLOWED_MEDIA_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
];

static RE_HEIC_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.(heic|heif)$").unwrap());

/// True when the file name ends in `.heic` or `.heif`, in any case.
pub fn is_heic_name(name: &str) -> bool {
    RE_HEIC_NAME.is_match(name)
}

/// Replace a trailing `.heic`/`.heif` with `.{extension}`.
pub fn replace_heic_extension(name: &str, extension: &str) -> String {
    RE_HEIC_NAME
        .replace(name, format!(".{extension}").as_str())
        .into_owned()
}

/// A named image blob with its media type.
#[derive(Clone)]
pub struct ImageFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Blob,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Blob>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// A file as handed over by the picker, before acceptance.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub file: ImageFile,
    /// Size the picker reported; checked against the upload limit.
    pub declared_size: u64,
}

impl UploadCandidate {
    /// Candidate whose declared size is its actual byte length.
    pub fn new(file: ImageFile) -> Self {
        let declared_size = file.len() as u64;
        Self {
            file,
            declared_size,
        }
    }

    /// Read a candidate from disk, inferring the declared media type from
    /// the extension.
    ///
    /// The declared size comes from the file's metadata. A file larger than
    /// `max_bytes` is rejected with [`ValidationError::TooLarge`] before any
    /// of its bytes are read.
    pub async fn from_path(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, HeadshotError> {
        let path = path.as_ref();
        let read_error = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HeadshotError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                HeadshotError::FileReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        };

        let declared_size = tokio::fs::metadata(path).await.map_err(read_error)?.len();
        if declared_size > max_bytes {
            return Err(ValidationError::TooLarge {
                size: declared_size,
                limit: max_bytes,
            }
            .into());
        }

        let bytes = tokio::fs::read(path).await.map_err(read_error)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let media_type = media_type_for_name(&name).to_string();
        debug!("Read candidate {} ({} bytes, {})", name, bytes.len(), media_type);

        Ok(Self {
            file: ImageFile::new(name, media_type, bytes),
            declared_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn media_type(&self) -> &str {
        &self.file.media_type
    }
}

/// Media type a picker would declare for this file name.
///
/// Unknown extensions yield `application/octet-stream`.
pub fn media_type_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Check a candidate against the size/type policy.
///
/// Size is checked first, regardless of type. A file passes the type check
/// when its declared media type is allowed, or when its name carries a
/// HEIC/HEIF extension (pickers often declare those as empty or generic).
///
/// The declared media type is trimmed and compared ASCII case-insensitively,
/// since media types are case-insensitive tokens: `IMAGE/PNG` is accepted.
pub fn validate(candidate: &UploadCandidate, max_bytes: u64) -> Result<(), ValidationError> {
    if candidate.declared_size > max_bytes {
        return Err(ValidationError::TooLarge {
            size: candidate.declared_size,
            limit: max_bytes,
        });
    }

    let declared = candidate.media_type().trim();
    let allowed = ALLOWED_MEDIA_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(declared));

    if !allowed && !is_heic_name(candidate.name()) {
        return Err(ValidationError::UnsupportedType {
            media_type: candidate.media_type().to_string(),
            name: candidate.name().to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;

    const LIMIT: u64 = 10 * 1024 * 1024;

    fn candidate(name: &str, media_type: &str, declared_size: u64) -> UploadCandidate {
        UploadCandidate {
            file: ImageFile::new(name, media_type, vec![0u8; 4]),
            declared_size,
        }
    }

    #[test]
    fn oversized_files_fail_on_size_whatever_the_type() {
        for (name, ty) in [
            ("a.jpg", "image/jpeg"),
            ("a.png", "image/png"),
            ("a.heic", ""),
            ("a.pdf", "application/pdf"),
        ] {
            let err = validate(&candidate(name, ty, LIMIT + 1), LIMIT).unwrap_err();
            assert_eq!(err.kind(), ValidationErrorKind::Size, "{name}");
        }
    }

    #[test]
    fn allowed_types_within_limit_pass() {
        for ty in ALLOWED_MEDIA_TYPES {
            assert!(validate(&candidate("photo", ty, LIMIT), LIMIT).is_ok(), "{ty}");
            assert!(validate(&candidate("photo", ty, 1), LIMIT).is_ok(), "{ty}");
        }
    }

    #[test]
    fn heic_extension_rescues_unknown_type() {
        assert!(validate(&candidate("IMG_0001.HEIC", "", 1024), LIMIT).is_ok());
        assert!(validate(
            &candidate("IMG_0001.heif", "application/octet-stream", 1024),
            LIMIT
        )
        .is_ok());
    }

    #[test]
    fn media_type_match_ignores_case_and_padding() {
        assert!(validate(&candidate("a.png", "IMAGE/PNG", 1024), LIMIT).is_ok());
        assert!(validate(&candidate("a.jpg", " image/jpeg ", 1024), LIMIT).is_ok());
        let err = validate(&candidate("a.gif", "IMAGE/GIF", 1024), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ValidationErrorKind::Type);
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let err = validate(&candidate("cv.pdf", "application/pdf", 1024), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ValidationErrorKind::Type);

        let err = validate(&candidate("anim.gif", "image/gif", 1024), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ValidationErrorKind::Type);
    }

    #[test]
    fn heic_name_matching() {
        assert!(is_heic_name("a.heic"));
        assert!(is_heic_name("a.HeIf"));
        assert!(!is_heic_name("a.heic.png"));
        assert!(!is_heic_name("heic"));
    }

    #[test]
    fn heic_extension_is_replaced() {
        assert_eq!(replace_heic_extension("IMG_1.HEIC", "png"), "IMG_1.png");
        assert_eq!(replace_heic_extension("x.heif", "jpg"), "x.jpg");
        assert_eq!(replace_heic_extension("x.png", "jpg"), "x.png");
    }

    #[test]
    fn media_type_inference() {
        assert_eq!(media_type_for_name("me.JPG"), "image/jpeg");
        assert_eq!(media_type_for_name("me.heic"), "image/heic");
        assert_eq!(media_type_for_name("notes"), "application/octet-stream");
    }

    #[tokio::test]
    async fn from_path_reports_missing_file() {
        let err = UploadCandidate::from_path("/definitely/not/here.png", LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, HeadshotError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn from_path_reads_bytes_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("me.png");
        std::fs::write(&path, b"\x89PNG....").unwrap();

        let c = UploadCandidate::from_path(&path, LIMIT).await.unwrap();
        assert_eq!(c.name(), "me.png");
        assert_eq!(c.media_type(), "image/png");
        assert_eq!(c.declared_size, 8);
    }

    #[tokio::test]
    async fn from_path_rejects_oversized_file_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        // Sparse: reports 64 MiB without occupying it on disk.
        std::fs::File::create(&path)
            .unwrap()
            .set_len(64 * 1024 * 1024)
            .unwrap();

        let err = UploadCandidate::from_path(&path, LIMIT).await.unwrap_err();
        match err {
            HeadshotError::Validation(e) => {
                assert_eq!(e.kind(), ValidationErrorKind::Size);
                assert_eq!(e.to_string(), "File size must be less than 10MB");
            }
            other => panic!("expected size error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn from_path_accepts_file_exactly_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.jpg");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let c = UploadCandidate::from_path(&path, 16).await.unwrap();
        assert_eq!(c.declared_size, 16);
        assert_eq!(c.file.len(), 16);
    }
}
