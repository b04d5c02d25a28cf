//! Student name comparison used by duplicate warnings, search and autosuggest.
//!
//! Normalisation lower-cases and trims the outer whitespace only. Runs of
//! internal whitespace are kept as typed, so `"Jane  Doe"` and `"Jane Doe"`
//! are different keys.

/// Lower-cased, outer-trimmed matching key for a name.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn matches(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Whether the normalised `needle` occurs anywhere in the normalised `haystack`.
pub fn contains(haystack: &str, needle: &str) -> bool {
    normalize(haystack).contains(&normalize(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outer_whitespace_and_case_are_ignored() {
        assert!(matches("Jane Doe", "  jane doe  "));
        assert!(matches("ROHAN GUPTA", "rohan gupta"));
    }

    #[test]
    fn internal_whitespace_is_significant() {
        assert!(!matches("Jane  Doe", "Jane Doe"));
    }

    #[test]
    fn contains_is_normalized_substring() {
        assert!(contains("Asha Rao", " RAO"));
        assert!(contains("Asha Rao", "sha r"));
        assert!(!contains("Asha Rao", "rao asha"));
    }
}
