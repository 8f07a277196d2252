//! Conversation title derivation

use regex::Regex;
use std::sync::LazyLock;

/// Title given to conversations that have no derived or chosen title yet
pub const DEFAULT_TITLE: &str = "New Chat";

/// Longest title, in characters, that derivation produces
pub const MAX_TITLE_CHARS: usize = 50;

const ELLIPSIS: &str = "...";

static MARKDOWN_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#*`_~\[\]()]").expect("valid markdown punctuation pattern"));

static NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("valid newline pattern"));

/// Derive a conversation title from the first user message.
///
/// Strips markdown punctuation, folds newline runs into one space, trims, and
/// cuts anything over [`MAX_TITLE_CHARS`] down to that length including a
/// trailing ellipsis. Never returns an empty string.
pub fn derive_title(first_message: &str) -> String {
    let stripped = MARKDOWN_PUNCTUATION.replace_all(first_message, "");
    let folded = NEWLINES.replace_all(&stripped, " ");
    let clean = folded.trim();

    if clean.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    if clean.chars().count() > MAX_TITLE_CHARS {
        let keep = MAX_TITLE_CHARS - ELLIPSIS.len();
        let head: String = clean.chars().take(keep).collect();
        format!("{}{}", head, ELLIPSIS)
    } else {
        clean.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_kept() {
        assert_eq!(
            derive_title("Explain quantum computing"),
            "Explain quantum computing"
        );
    }

    #[test]
    fn test_strips_markdown_punctuation() {
        assert_eq!(
            derive_title("# **Fix** the `parse_args` [bug](link)"),
            "Fix the parseargs buglink"
        );
    }

    #[test]
    fn test_collapses_newlines() {
        assert_eq!(derive_title("first line\n\n\nsecond\r\nthird\n"), "first line second third");
    }

    #[test]
    fn test_truncates_to_fifty_chars() {
        let input = "a".repeat(80);
        let title = derive_title(&input);
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
        assert!(title.ends_with("..."));
        assert_eq!(&title[..47], "a".repeat(47));
    }

    #[test]
    fn test_exactly_fifty_chars_not_truncated() {
        let input = "b".repeat(50);
        assert_eq!(derive_title(&input), input);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let input = "é".repeat(60);
        let title = derive_title(&input);
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
        assert!(title.starts_with(&"é".repeat(47)));
    }

    #[test]
    fn test_blank_after_stripping_falls_back() {
        assert_eq!(derive_title("### ***"), DEFAULT_TITLE);
        assert_eq!(derive_title("\n\n"), DEFAULT_TITLE);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let inputs = [
            "Explain quantum computing",
            "## Heading\nwith *emphasis*",
            "What are the key trends in renewable energy adoption across Europe and Asia?",
            "   padded   ",
            "",
        ];
        for input in inputs {
            let once = derive_title(input);
            assert_eq!(derive_title(&once), once, "input: {:?}", input);
            assert!(once.chars().count() <= MAX_TITLE_CHARS);
            assert!(!once.is_empty());
        }
    }

    #[test]
    fn test_deterministic() {
        let input = "Write a Python function to calculate fibonacci numbers";
        assert_eq!(derive_title(input), derive_title(input));
    }
}
