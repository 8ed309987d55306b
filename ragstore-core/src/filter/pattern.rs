//! SQL `LIKE` patterns.
//!
//! `%` matches any run of characters, `_` matches exactly one character and
//! `\` escapes the next character. Patterns are anchored at both ends.

use regex::{Regex, RegexBuilder};

/// Compiles a `LIKE` pattern into an anchored regex.
pub fn compile_like(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut regex_pattern = String::with_capacity(pattern.len() + 8);
    regex_pattern.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex_pattern.push_str(&regex::escape(&escaped.to_string())),
                // trailing backslash matches itself
                None => regex_pattern.push_str(r"\\"),
            },
            other => regex_pattern.push_str(&regex::escape(&other.to_string())),
        }
    }

    regex_pattern.push('$');

    RegexBuilder::new(&regex_pattern)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like(pattern: &str, text: &str) -> bool {
        compile_like(pattern, false).unwrap().is_match(text)
    }

    fn ilike(pattern: &str, text: &str) -> bool {
        compile_like(pattern, true).unwrap().is_match(text)
    }

    #[test]
    fn test_percent_matches_any_run() {
        assert!(like("intro%", "introduction"));
        assert!(like("%tion", "introduction"));
        assert!(like("%", ""));
        assert!(!like("intro%", "an introduction"));
    }

    #[test]
    fn test_underscore_matches_one_char() {
        assert!(like("v_", "v1"));
        assert!(!like("v_", "v10"));
        assert!(!like("v_", "v"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(like("a.b", "a.b"));
        assert!(!like("a.b", "axb"));
        assert!(like("(x)+[y]", "(x)+[y]"));
    }

    #[test]
    fn test_backslash_escapes_wildcards() {
        assert!(like(r"100\%", "100%"));
        assert!(!like(r"100\%", "1000"));
        assert!(like(r"a\_b", "a_b"));
        assert!(!like(r"a\_b", "axb"));
    }

    #[test]
    fn test_case_sensitivity() {
        assert!(!like("Rust%", "rust book"));
        assert!(ilike("Rust%", "rust book"));
        assert!(ilike("%BOOK", "rust book"));
    }

    #[test]
    fn test_multiline_content() {
        assert!(like("a%b", "a\nb"));
    }
}
