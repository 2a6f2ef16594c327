//! Deterministic chat-title derivation (spec §4.2 post-graph step 3,
//! SPEC_FULL.md §C.3: "external service" in the spec, but the derivation
//! itself is pure and deterministic from the query so it's testable without
//! a network call).

const MAX_LEN: usize = 60;

/// Truncate `query` to at most [`MAX_LEN`] characters, breaking at the last
/// word boundary rather than mid-word, and appending an ellipsis when
/// truncated. Whitespace is collapsed and the result is never empty for a
/// non-empty input.
pub fn derive_title(query: &str) -> String {
    let collapsed: String = query.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        return "New research session".to_string();
    }
    if trimmed.chars().count() <= MAX_LEN {
        return trimmed.to_string();
    }

    let truncated: String = trimmed.chars().take(MAX_LEN).collect();
    let cut = truncated
        .rfind(' ')
        .map(|i| &truncated[..i])
        .unwrap_or(&truncated);
    format!("{cut}…")
}
