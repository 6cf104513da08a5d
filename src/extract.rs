//! Markdown-fenced payload extraction
//!
//! Model replies mix free-form commentary with one fenced JSON block.
//! Splitting them never fails: anything that is not a complete fence pair
//! is plain commentary.

/// Opening fence of the embedded payload
pub const START_FENCE: &str = "```json";
/// Closing fence of the embedded payload
pub const END_FENCE: &str = "```";

/// Result of splitting a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedSplit {
    /// Trimmed text between the first start fence and the next end fence
    pub payload: Option<String>,
    /// Everything else
    pub commentary: String,
}

/// Split `raw` into its first fenced payload and the surrounding commentary.
///
/// Without a start fence, or with a start fence that is never closed, the
/// input comes back untouched as commentary. Later fenced regions stay
/// inside the commentary.
pub fn split(raw: &str) -> FencedSplit {
    let unchanged = || FencedSplit {
        payload: None,
        commentary: raw.to_string(),
    };

    let Some((before, rest)) = raw.split_once(START_FENCE) else {
        return unchanged();
    };
    let Some((inner, after)) = rest.split_once(END_FENCE) else {
        return unchanged();
    };

    let before = before.trim();
    let after = after.trim();
    let commentary = match (before.is_empty(), after.is_empty()) {
        (false, false) => format!("{before}\n{after}"),
        (false, true) => before.to_string(),
        (true, false) => after.to_string(),
        (true, true) => String::new(),
    };

    FencedSplit {
        payload: Some(inner.trim().to_string()),
        commentary,
    }
}
