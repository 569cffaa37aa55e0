//! Deterministic text summaries used as embedding input.
//!
//! The member summary concatenates a fixed set of labeled fields so that
//! re-embedding the same record always produces the same input text.

/// Maximum embedding input length (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 2048;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Labeled summary of a member profile.
pub fn member_text(name: &str, building: &str, past_work: &str) -> String {
    truncate_content(&format!(
        "Name: {}, currently building: {}, past work: {}",
        name.trim(),
        building.trim(),
        past_work.trim()
    ))
}

/// Embedding input for a build update. Returns `None` when there is nothing
/// to embed (the endpoint rejects empty input).
pub fn update_text(build_goal: &str) -> Option<String> {
    let text = build_goal.trim();
    if text.is_empty() {
        return None;
    }
    Some(truncate_content(text))
}

fn truncate_content(content: &str) -> String {
    // char-based limit so UTF-8 sequences are never split
    if content.chars().count() <= MAX_CONTENT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_text_labels_fields() {
        let text = member_text("Ada", "a compiler", "mathematics");
        assert_eq!(
            text,
            "Name: Ada, currently building: a compiler, past work: mathematics"
        );
    }

    #[test]
    fn test_member_text_is_deterministic() {
        let a = member_text("Ada", "x", "y");
        let b = member_text("Ada", "x", "y");
        assert_eq!(a, b);
    }

    #[test]
    fn test_member_text_empty_fields_keep_labels() {
        let text = member_text("Ada", "", "");
        assert_eq!(text, "Name: Ada, currently building: , past work: ");
    }

    #[test]
    fn test_update_text_empty_is_none() {
        assert!(update_text("").is_none());
        assert!(update_text("   \n").is_none());
    }

    #[test]
    fn test_update_text_trims() {
        assert_eq!(update_text("  ship MVP  "), Some("ship MVP".to_string()));
    }

    #[test]
    fn test_truncation() {
        let long = "x".repeat(MAX_CONTENT_LENGTH * 2);
        let text = member_text(&long, "", "");

        assert!(text.chars().count() <= MAX_CONTENT_LENGTH);
        assert!(text.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        // multibyte input: byte length exceeds the char limit long before
        // the char count does
        let long = "é".repeat(MAX_CONTENT_LENGTH * 2);
        let text = member_text(&long, "", "");

        assert!(text.chars().count() <= MAX_CONTENT_LENGTH);
        assert!(text.ends_with(TRUNCATION_SUFFIX));

        // just under the limit stays untouched
        let short = "é".repeat(MAX_CONTENT_LENGTH / 2);
        assert_eq!(update_text(&short), Some(short));
    }
}
