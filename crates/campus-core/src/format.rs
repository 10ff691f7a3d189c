//! Readability cleanup for generated replies

use regex::Regex;
use std::sync::LazyLock;

static NUMBERED_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\s\*\*)").unwrap());
static SENTENCE_THEN_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\.\s)(\d+\.\s)").unwrap());
static CLOSING_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\.\s)(Would you like|Do you need|Is there anything)").unwrap()
});
static EXTRA_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Undo model-side quoting and escaping, then space out lists and closing questions
pub fn clean_response(raw: &str) -> String {
    let text = strip_wrapping_quotes(raw);
    let text = unescape(text);
    format_response(&text)
}

fn strip_wrapping_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

/// Literal escape sequences, replaced in a fixed order
fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
        .replace("\\t", "\t")
}

/// Paragraph breaks before numbered items and closing questions
pub fn format_response(text: &str) -> String {
    let text = NUMBERED_BOLD.replace_all(text, "\n\n$1");
    let text = SENTENCE_THEN_NUMBER.replace_all(&text, "$1\n\n$2");
    let text = CLOSING_QUESTION.replace_all(&text, "$1\n\n$2");
    let text = EXTRA_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_quotes_and_unescapes() {
        assert_eq!(clean_response(r#""Hello\nWorld""#), "Hello\nWorld");
        assert_eq!(clean_response(r#"Say \"hi\"\tnow"#), "Say \"hi\"\tnow");
        assert_eq!(clean_response(r"a\\b"), "a\\b");
    }

    #[test]
    fn test_single_quote_char_untouched() {
        assert_eq!(clean_response("\""), "\"");
        assert_eq!(clean_response("\"open only"), "\"open only");
    }

    #[test]
    fn test_numbered_bold_items_get_paragraphs() {
        let text = "Here are options: 1. **CS320** for ML 2. **STAT210** for stats";
        assert_eq!(
            format_response(text),
            "Here are options: \n\n1. **CS320** for ML \n\n2. **STAT210** for stats"
        );
    }

    #[test]
    fn test_plain_numbered_items_after_sentence() {
        assert_eq!(
            format_response("Two steps. 1. Register 2. Pay"),
            "Two steps. \n\n1. Register 2. Pay"
        );
    }

    #[test]
    fn test_closing_question() {
        assert_eq!(
            format_response("CS320 is a good fit. Would you like more options?"),
            "CS320 is a good fit. \n\nWould you like more options?"
        );
        assert_eq!(
            format_response("Done. Is there anything else?"),
            "Done. \n\nIs there anything else?"
        );
    }

    #[test]
    fn test_collapses_newlines_and_trims() {
        assert_eq!(format_response("\n\nOne\n\n\n\nTwo\n"), "One\n\nTwo");
    }

    #[test]
    fn test_haiku_unchanged() {
        let haiku = "Students gather here\nKnowledge flows like autumn leaves\nWisdom takes its root";
        assert_eq!(clean_response(haiku), haiku);
    }
}
