//! Headshot style templates and prompt composition.
//!
//! Every prompt string the pipeline sends lives here so a wording change
//! touches exactly one place and tests can pin the exact text.

use serde::Serialize;

/// Literal phrase closing every composed prompt.
pub const PROMPT_SUFFIX: &str = "professional headshot photography";

/// A statically known headshot style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StyleTemplate {
    /// Stable identifier (`professional`, `casual`, `creative`).
    pub id: &'static str,
    /// Display name, also recorded on each generated artifact.
    pub name: &'static str,
    pub description: &'static str,
    /// Prompt fragment that opens the composed prompt.
    pub prompt: &'static str,
    /// Single glyph shown next to the style.
    pub preview: &'static str,
}

/// The three styles on offer, in display order.
pub const HEADSHOT_STYLES: [StyleTemplate; 3] = [
    StyleTemplate {
        id: "professional",
        name: "Professional",
        description: "Corporate headshot with business attire and clean background",
        prompt: "professional corporate headshot, business attire, clean studio background, professional lighting, high quality",
        preview: "👔",
    },
    StyleTemplate {
        id: "casual",
        name: "Casual",
        description: "Relaxed and approachable with natural lighting",
        prompt: "casual professional headshot, natural lighting, friendly smile, modern background",
        preview: "😊",
    },
    StyleTemplate {
        id: "creative",
        name: "Creative",
        description: "Artistic and unique with creative elements",
        prompt: "creative professional headshot, artistic lighting, interesting background, modern aesthetic",
        preview: "🎨",
    },
];

/// Look a style up by id, case-insensitively.
pub fn find_style(id: &str) -> Option<&'static StyleTemplate> {
    HEADSHOT_STYLES
        .iter()
        .find(|s| s.id.eq_ignore_ascii_case(id.trim()))
}

/// Compose the full generation prompt.
///
/// Custom text is trimmed; whitespace-only text counts as absent.
///
/// ```text
/// "{fragment}, {custom}, professional headshot photography"
/// "{fragment}, professional headshot photography"
/// ```
pub fn compose_prompt(style: &StyleTemplate, custom_text: &str) -> String {
    let custom = custom_text.trim();
    if custom.is_empty() {
        format!("{}, {}", style.prompt, PROMPT_SUFFIX)
    } else {
        format!("{}, {}, {}", style.prompt, custom, PROMPT_SUFFIX)
    }
}
