//! Generation request construction.
//!
//! A [`GenerationRequest`] can only be built from a normalised
//! [`ProcessedImage`] and a [`StyleTemplate`]; both are required parameters,
//! so a request without either cannot exist.

use crate::pipeline::normalize::ProcessedImage;
use crate::pipeline::validate::ImageFile;
use crate::styles::{compose_prompt, StyleTemplate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of headshots per request, always within
/// [`Quantity::MIN`]`..=`[`Quantity::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quantity(u8);

impl Quantity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 12;

    /// Clamp any integer into range.
    pub fn new(n: i64) -> Self {
        Self(n.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// One more, stopping at the upper bound.
    pub fn increment(self) -> Self {
        Self((self.0 + 1).min(Self::MAX))
    }

    /// One fewer, stopping at the lower bound.
    pub fn decrement(self) -> Self {
        Self(self.0.saturating_sub(1).max(Self::MIN))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self(4)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Quantity> for u8 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = String;

    /// Deserialised values are rejected, not clamped, when out of range.
    fn try_from(n: i64) -> Result<Self, Self::Error> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&n) {
            Ok(Self(n as u8))
        } else {
            Err(format!(
                "quantity must be {}–{}, got {}",
                Self::MIN,
                Self::MAX,
                n
            ))
        }
    }
}

/// Everything the generation service needs for one attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The normalised source photo to upload.
    pub source: ImageFile,
    pub prompt: String,
    pub count: Quantity,
    /// e.g. "1024x1024".
    pub output_size: String,
    /// Display name of the style, recorded on each artifact.
    pub style: String,
}

/// Build a generation request.
///
/// `count` is clamped into `1..=12` even though callers normally hand over
/// an already valid [`Quantity`].
pub fn build_request(
    style: &StyleTemplate,
    image: &ProcessedImage,
    custom_text: &str,
    count: i64,
    output_size: &str,
) -> GenerationRequest {
    GenerationRequest {
        source: image.file.clone(),
        prompt: compose_prompt(style, custom_text),
        count: Quantity::new(count),
        output_size: output_size.to_string(),
        style: style.name.to_string(),
    }
}
