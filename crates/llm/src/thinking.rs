//! Streaming thinking-tag parser
//!
//! A small DFA over incoming text pieces that splits thinking text from
//! content text using a configurable `{open, close}` tag pair. Tags may be
//! split across piece boundaries; the parser owns the partial-match buffer
//! and is re-entrant per generation.

use edgekit_core::{ThinkingTagPair, TokenKind};

/// One classified span of text produced by a `feed` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSpan {
    pub kind: TokenKind,
    pub text: String,
}

/// Parser state between pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Content,
    Thinking,
}

/// Streaming splitter for `<open>…</close>` thinking blocks.
pub struct ThinkingParser {
    tags: ThinkingTagPair,
    mode: ParseMode,
    /// Candidate tag prefix held across piece boundaries
    partial: String,
    /// Text accumulated for the current span
    span: String,
    out: Vec<ClassifiedSpan>,
}

impl ThinkingParser {
    pub fn new(tags: ThinkingTagPair) -> Self {
        Self {
            tags,
            mode: ParseMode::Content,
            partial: String::new(),
            span: String::new(),
            out: Vec::new(),
        }
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Feed one piece; returns the spans completed by it.
    pub fn feed(&mut self, piece: &str) -> Vec<ClassifiedSpan> {
        for ch in piece.chars() {
            self.push_char(ch);
        }
        self.flush_span();
        std::mem::take(&mut self.out)
    }

    /// Flush any partial tag candidate at end of stream; an unterminated
    /// candidate is plain text.
    pub fn finish(&mut self) -> Vec<ClassifiedSpan> {
        if !self.partial.is_empty() {
            let partial = std::mem::take(&mut self.partial);
            self.span.push_str(&partial);
        }
        self.flush_span();
        std::mem::take(&mut self.out)
    }

    fn active_tag(&self) -> &str {
        match self.mode {
            ParseMode::Content => &self.tags.open,
            ParseMode::Thinking => &self.tags.close,
        }
    }

    fn push_char(&mut self, ch: char) {
        self.partial.push(ch);

        let tag = self.active_tag().to_string();
        if tag == self.partial {
            // Complete tag: close the current span and switch modes.
            self.partial.clear();
            self.flush_span();
            self.mode = match self.mode {
                ParseMode::Content => ParseMode::Thinking,
                ParseMode::Thinking => ParseMode::Content,
            };
            return;
        }

        if tag.starts_with(&self.partial) {
            // Still a viable prefix, keep buffering.
            return;
        }

        // Mismatch: the first buffered char is plain text; the rest must be
        // re-examined because a new tag may start inside the buffer.
        let buffered = std::mem::take(&mut self.partial);
        let mut chars = buffered.chars();
        if let Some(first) = chars.next() {
            self.span.push(first);
        }
        for rest in chars {
            self.push_char(rest);
        }
    }

    fn flush_span(&mut self) {
        if self.span.is_empty() {
            return;
        }
        let kind = match self.mode {
            ParseMode::Content => TokenKind::Content,
            ParseMode::Thinking => TokenKind::Thinking,
        };
        self.out.push(ClassifiedSpan {
            kind,
            text: std::mem::take(&mut self.span),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ThinkingParser {
        ThinkingParser::new(ThinkingTagPair::new("<think>", "</think>"))
    }

    fn feed_all(parser: &mut ThinkingParser, pieces: &[&str]) -> Vec<ClassifiedSpan> {
        let mut spans = Vec::new();
        for piece in pieces {
            spans.extend(parser.feed(piece));
        }
        spans.extend(parser.finish());
        spans
    }

    #[test]
    fn test_plain_content_passes_through() {
        let mut p = parser();
        let spans = feed_all(&mut p, &["Hello", " world"]);
        assert_eq!(
            spans,
            vec![
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: "Hello".into()
                },
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: " world".into()
                },
            ]
        );
    }

    #[test]
    fn test_whole_tags_in_single_pieces() {
        let mut p = parser();
        let spans = feed_all(&mut p, &["<think>", "plan", "</think>", "Hello"]);
        assert_eq!(
            spans,
            vec![
                ClassifiedSpan {
                    kind: TokenKind::Thinking,
                    text: "plan".into()
                },
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: "Hello".into()
                },
            ]
        );
    }

    #[test]
    fn test_tag_split_across_pieces() {
        let mut p = parser();
        let spans = feed_all(&mut p, &["<th", "ink>inner</th", "ink>out"]);
        assert_eq!(
            spans,
            vec![
                ClassifiedSpan {
                    kind: TokenKind::Thinking,
                    text: "inner".into()
                },
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: "out".into()
                },
            ]
        );
    }

    #[test]
    fn test_false_prefix_is_plain_text() {
        let mut p = parser();
        let spans = feed_all(&mut p, &["<thundering herd"]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, TokenKind::Content);
        assert_eq!(spans[0].text, "<thundering herd");
    }

    #[test]
    fn test_tag_restart_inside_false_prefix() {
        // "<th<think>" contains a failed prefix that itself starts a real tag.
        let mut p = parser();
        let spans = feed_all(&mut p, &["<th<think>idea</think>"]);
        assert_eq!(
            spans,
            vec![
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: "<th".into()
                },
                ClassifiedSpan {
                    kind: TokenKind::Thinking,
                    text: "idea".into()
                },
            ]
        );
    }

    #[test]
    fn test_unterminated_partial_flushes_as_text() {
        let mut p = parser();
        let mut spans = p.feed("tail<thi");
        spans.extend(p.finish());
        assert_eq!(
            spans,
            vec![
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: "tail".into()
                },
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: "<thi".into()
                },
            ]
        );
    }

    #[test]
    fn test_mode_tracking() {
        let mut p = parser();
        assert_eq!(p.mode(), ParseMode::Content);
        p.feed("<think>");
        assert_eq!(p.mode(), ParseMode::Thinking);
        p.feed("</think>");
        assert_eq!(p.mode(), ParseMode::Content);
    }

    #[test]
    fn test_custom_tag_pair() {
        let mut p = ThinkingParser::new(ThinkingTagPair::new("[[", "]]"));
        let spans = feed_all(&mut p, &["a[[b]]c"]);
        assert_eq!(
            spans,
            vec![
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: "a".into()
                },
                ClassifiedSpan {
                    kind: TokenKind::Thinking,
                    text: "b".into()
                },
                ClassifiedSpan {
                    kind: TokenKind::Content,
                    text: "c".into()
                },
            ]
        );
    }
}
