//! Slug generation and validation for node identifiers.
//!
//! A slug is the unique, human-readable key a node's output is referenced by
//! in template expressions (`{{slug.field}}`). Slugs are lowercase
//! `[a-z][a-z0-9_]*`, at most 50 characters, and must not collide with the
//! reserved words used elsewhere in flow definitions.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Words that can never be used as a node slug.
pub const RESERVED_SLUGS: [&str; 6] = ["flow", "trigger", "output", "input", "node", "connection"];

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 50;

static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());
static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*?)_\d+$").unwrap());

/// Derive a slug from a display name.
///
/// Lowercases, collapses separators to `_`, strips everything outside
/// `[a-z0-9_]`, collapses repeated `_`, trims leading/trailing `_`, prefixes
/// `node_` when the result does not start with a letter, and truncates to
/// [`MAX_SLUG_LEN`]. An empty or whitespace-only name yields `"node"`.
pub fn to_slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        match ch {
            'a'..='z' | '0'..='9' | '_' => out.push(ch),
            c if c.is_whitespace() || c == '-' || c == '.' || c == '/' || c == ':' => out.push('_'),
            _ => {}
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut prev_underscore = false;
    for ch in out.chars() {
        if ch == '_' {
            if !prev_underscore {
                collapsed.push('_');
            }
            prev_underscore = true;
        } else {
            collapsed.push(ch);
            prev_underscore = false;
        }
    }
    let mut slug = collapsed.trim_matches('_').to_string();

    if slug.is_empty() {
        return "node".to_string();
    }
    if !slug.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        slug = format!("node_{}", slug);
    }
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('_').to_string();
    }
    slug
}

/// Whether `slug` is well-formed and not a reserved word.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.len() <= MAX_SLUG_LEN && SLUG_RE.is_match(slug) && !RESERVED_SLUGS.contains(&slug)
}

/// Derive a slug from `base_name` that is unused in `existing`.
///
/// Appends `_2`, `_3`, ... until the slug is free. Reserved words count as
/// taken, so `generate_unique_slug("node", ..)` yields `node_2`.
pub fn generate_unique_slug(
    base_name: &str,
    existing: &HashSet<String>,
) -> String {
    let base = to_slug(base_name);

    if !existing.contains(&base) && is_valid_slug(&base) {
        return base;
    }

    let mut n: u64 = 2;
    loop {
        let suffix = format!("_{}", n);
        let mut candidate = base.clone();
        if candidate.len() + suffix.len() > MAX_SLUG_LEN {
            candidate.truncate(MAX_SLUG_LEN - suffix.len());
            candidate = candidate.trim_end_matches('_').to_string();
        }
        candidate.push_str(&suffix);

        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Strip a trailing `_N` disambiguator, returning the logical base slug.
pub fn get_base_slug(slug: &str) -> &str {
    match SUFFIX_RE.captures(slug) {
        Some(caps) => {
            let base = caps.get(1).map_or("", |m| m.as_str());
            if base.is_empty() { slug } else { base }
        }
        None => slug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== to_slug tests ====================

    #[test]
    fn test_to_slug_basic() {
        assert_eq!(to_slug("My Cool Node!"), "my_cool_node");
        assert_eq!(to_slug("Search"), "search");
        assert_eq!(to_slug("API call"), "api_call");
    }

    #[test]
    fn test_to_slug_empty_yields_node() {
        assert_eq!(to_slug(""), "node");
        assert_eq!(to_slug("   "), "node");
        assert_eq!(to_slug("!!!"), "node");
    }

    #[test]
    fn test_to_slug_collapses_separators() {
        assert_eq!(to_slug("a - b -- c"), "a_b_c");
        assert_eq!(to_slug("a...b"), "a_b");
        assert_eq!(to_slug("__a__b__"), "a_b");
    }

    #[test]
    fn test_to_slug_prefixes_non_letter_start() {
        assert_eq!(to_slug("42 results"), "node_42_results");
        assert_eq!(to_slug("_hidden"), "hidden");
    }

    #[test]
    fn test_to_slug_truncates() {
        let long = "x".repeat(80);
        let slug = to_slug(&long);
        assert_eq!(slug.len(), MAX_SLUG_LEN);
        assert!(is_valid_slug(&slug));
    }

    #[test]
    fn test_to_slug_always_valid_unless_reserved() {
        for name in ["Hello World", "a", "9 lives", "Ünïcode Nàme", "tabs\tand\nnewlines"] {
            let slug = to_slug(name);
            assert!(is_valid_slug(&slug), "invalid slug {:?} from {:?}", slug, name);
        }
        // reserved collision: valid shape, but the caller must disambiguate
        assert_eq!(to_slug("Trigger"), "trigger");
        assert!(!is_valid_slug("trigger"));
    }

    // ==================== is_valid_slug tests ====================

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("api_call"));
        assert!(is_valid_slug("a"));
        assert!(is_valid_slug("a2_b3"));

        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("2fast"));
        assert!(!is_valid_slug("Upper"));
        assert!(!is_valid_slug("has-dash"));
        assert!(!is_valid_slug("has space"));
        assert!(!is_valid_slug(&"x".repeat(51)));
    }

    #[test]
    fn test_reserved_words_rejected() {
        for word in RESERVED_SLUGS {
            assert!(!is_valid_slug(word), "{} should be reserved", word);
        }
    }

    // ==================== generate_unique_slug tests ====================

    #[test]
    fn test_generate_unique_slug_free() {
        let existing = HashSet::new();
        assert_eq!(generate_unique_slug("Search", &existing), "search");
    }

    #[test]
    fn test_generate_unique_slug_collision() {
        let existing: HashSet<String> = ["search".to_string()].into();
        assert_eq!(generate_unique_slug("Search", &existing), "search_2");

        let existing: HashSet<String> = ["search".to_string(), "search_2".to_string()].into();
        assert_eq!(generate_unique_slug("Search", &existing), "search_3");
    }

    #[test]
    fn test_generate_unique_slug_reserved_base() {
        let existing = HashSet::new();
        assert_eq!(generate_unique_slug("node", &existing), "node_2");
        assert_eq!(generate_unique_slug("", &existing), "node_2");
    }

    #[test]
    fn test_generate_unique_slug_respects_length_bound() {
        let existing: HashSet<String> = [to_slug(&"y".repeat(80))].into();
        let slug = generate_unique_slug(&"y".repeat(80), &existing);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(slug.ends_with("_2"));
    }

    // ==================== get_base_slug tests ====================

    #[test]
    fn test_get_base_slug() {
        assert_eq!(get_base_slug("search_2"), "search");
        assert_eq!(get_base_slug("search_12"), "search");
        assert_eq!(get_base_slug("search"), "search");
        assert_eq!(get_base_slug("api_call_3"), "api_call");
        // no base left after stripping: keep the original
        assert_eq!(get_base_slug("_2"), "_2");
    }
}
