//! Text canonicalization for robust chunk/evidence comparison
//!
//! All matching happens over normalized text: NFKC composition, plain
//! quotes, collapsed whitespace, lowercase. Normalization is a fixed point:
//! applying it twice yields the same string as applying it once.

use unicode_normalization::UnicodeNormalization;

/// Canonicalize a string for comparison.
///
/// NFKC-composes, maps curly quotes and the non-breaking space to their
/// plain equivalents, collapses whitespace runs to a single space, trims,
/// and lowercases. Pure function, no side effects.
pub fn normalize(text: &str) -> String {
    let unified: String = text
        .nfkc()
        .map(|c| match c {
            '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{00A0}' => ' ',
            c => c,
        })
        .collect();

    unified
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Remove a leading `user:` / `assistant:` role label if present.
///
/// Case-insensitive, tolerates whitespace around the colon. Anything that
/// is not a leading role label (e.g. "username:") is left untouched.
pub fn strip_speaker_prefix(text: &str) -> &str {
    let trimmed = text.trim_start();
    for role in ["user", "assistant"] {
        let Some(head) = trimmed.get(..role.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(role) {
            continue;
        }
        let rest = trimmed[role.len()..].trim_start();
        if let Some(stripped) = rest.strip_prefix(':') {
            return stripped.trim_start();
        }
    }
    text
}

/// Split a string into word tokens: maximal runs of alphanumeric or `_`
/// characters.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_quotes_and_nbsp() {
        assert_eq!(normalize("It\u{2019}s \u{201C}fine\u{201D}"), "it's \"fine\"");
        assert_eq!(normalize("a\u{00A0}b"), "a b");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Hello\t\n  World  "), "hello world");
    }

    #[test]
    fn test_normalize_nfkc_composition() {
        // Fullwidth digits and the fi ligature fold to their plain forms.
        assert_eq!(normalize("\u{FF11}\u{FF12}"), "12");
        assert_eq!(normalize("o\u{FB01}ce"), "ofice");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "  Mixed \u{201C}Quotes\u{2019}\u{00A0}and\tspace ",
            "\u{FF21}BC  def",
            "User:  Hello THERE",
            "İstanbul",
            "",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_strip_speaker_prefix() {
        assert_eq!(strip_speaker_prefix("User: hello"), "hello");
        assert_eq!(strip_speaker_prefix("ASSISTANT : reply"), "reply");
        assert_eq!(strip_speaker_prefix("  user:greeting"), "greeting");
        // Not a role label: untouched.
        assert_eq!(strip_speaker_prefix("username: bob"), "username: bob");
        assert_eq!(strip_speaker_prefix("no prefix here"), "no prefix here");
    }

    #[test]
    fn test_tokenize_word_runs() {
        assert_eq!(tokenize("the meeting is at 3pm."), vec!["the", "meeting", "is", "at", "3pm"]);
        assert_eq!(tokenize("snake_case stays"), vec!["snake_case", "stays"]);
        assert!(tokenize("  ... !!").is_empty());
    }
}
