//! Token count approximation
//!
//! Used when a backend reports no token counts. The estimate is
//! `ceil(chars/4 + punctuation*0.7 + newlines)` clamped to
//! `[word_count, char_count]`.

use unicode_segmentation::UnicodeSegmentation;

/// Approximate the number of model tokens in `text`.
pub fn approximate_token_count(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let char_count = text.graphemes(true).count() as u32;
    let word_count = text.unicode_words().count() as u32;
    let punctuation = text
        .chars()
        .filter(|c| c.is_ascii_punctuation())
        .count() as f64;
    let newlines = text.chars().filter(|&c| c == '\n').count() as f64;

    let raw = (char_count as f64 / 4.0 + punctuation * 0.7 + newlines).ceil() as u32;
    raw.clamp(word_count.min(char_count), char_count.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(approximate_token_count(""), 0);
    }

    #[test]
    fn test_plain_sentence() {
        // 11 chars -> ceil(11/4) = 3, one word min is 2
        let estimate = approximate_token_count("hello world");
        assert!(estimate >= 2);
        assert!(estimate <= 11);
    }

    #[test]
    fn test_punctuation_weighs_in() {
        let plain = approximate_token_count("aaaa aaaa aaaa aaaa");
        let punctuated = approximate_token_count("aaaa,aaaa,aaaa,aaaa!");
        assert!(punctuated > plain);
    }

    #[test]
    fn test_clamped_to_word_count_floor() {
        // Many short words push the word floor above chars/4.
        let text = "a b c d e f g h";
        let estimate = approximate_token_count(text);
        assert!(estimate >= 8);
    }

    #[test]
    fn test_clamped_to_char_count_ceiling() {
        let text = "!!!!!!!!";
        let estimate = approximate_token_count(text);
        assert!(estimate <= 8);
    }
}
