//! Turn raw service results into [`GeneratedArtifact`]s.

use crate::output::GeneratedArtifact;
use crate::service::RemoteImage;
use tracing::warn;

/// Map remote results onto artifacts carrying their provenance.
///
/// The id of the result at position `i` is `"{batch_timestamp_ms}-{i}"`:
/// unique inside the batch, different on every re-generation. Results
/// without a usable URL are dropped; the remaining ones keep their original
/// index, so ids stay distinct.
pub fn materialize(
    raw: &[RemoteImage],
    style: &str,
    prompt: &str,
    batch_timestamp_ms: i64,
) -> Vec<GeneratedArtifact> {
    raw.iter()
        .enumerate()
        .filter_map(|(i, item)| match item.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Some(GeneratedArtifact {
                id: format!("{batch_timestamp_ms}-{i}"),
                url: url.to_string(),
                prompt: prompt.to_string(),
                style: style.to_string(),
            }),
            _ => {
                warn!("Result {} has no image URL; skipping", i);
                None
            }
        })
        .collect()
}
