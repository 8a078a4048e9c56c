//! Deterministic recipe identifiers
//!
//! A recipe's identifier is a name-based UUID (version 5) derived from the
//! normalized title plus an optional source hint. Identical titles collapse to
//! the same identifier; callers that need to keep same-titled recipes apart
//! supply a hint (post id, source URL).

use uuid::Uuid;

/// Generate the deterministic identifier for a recipe.
///
/// Normalization: lower-case, trim, collapse internal whitespace. The hint is
/// normalized the same way; an absent hint contributes the empty string. The
/// result is stable across processes and re-parses of the same title.
pub fn recipe_identifier(title: &str, source_hint: Option<&str>) -> Uuid {
    let title = normalize(title);
    let hint = source_hint.map(normalize).unwrap_or_default();
    let content = format!("{}:{}", title, hint);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, content.as_bytes())
}

/// Identifier for a recipe pulled from the feed, hinted by its post id.
pub fn feed_identifier(title: &str, post_id: &str) -> Uuid {
    let hint = format!("feed:{}", post_id);
    recipe_identifier(title, Some(&hint))
}

/// Normalize a title or hint for identifier derivation.
pub fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_title_same_identifier() {
        let a = recipe_identifier("Chocolate Chip Cookies", None);
        let b = recipe_identifier("Chocolate Chip Cookies", None);
        assert_eq!(a, b);
    }

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        let a = recipe_identifier("  Chocolate   Chip Cookies ", None);
        let b = recipe_identifier("chocolate chip cookies", None);
        assert_eq!(a, b);
    }

    #[test]
    fn different_title_different_identifier() {
        let a = recipe_identifier("Chocolate Chip Cookies", None);
        let b = recipe_identifier("Oatmeal Raisin Cookies", None);
        assert_ne!(a, b);
    }

    #[test]
    fn source_hint_distinguishes_same_title() {
        let a = recipe_identifier("Carbonara", Some("https://example.com/1"));
        let b = recipe_identifier("Carbonara", Some("https://example.com/2"));
        let c = recipe_identifier("Carbonara", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn feed_identifier_uses_post_id_hint() {
        let a = feed_identifier("Carbonara", "t3_abc123");
        let b = recipe_identifier("Carbonara", Some("feed:t3_abc123"));
        assert_eq!(a, b);
    }
}
