//! Stop-sequence matching over the content stream
//!
//! Sequences are matched on the concatenated content text only; thinking
//! tokens never participate in the match window.

/// Incremental matcher holding a sliding window of recent content text.
pub struct StopMatcher {
    sequences: Vec<String>,
    window: String,
    window_cap: usize,
    matched: Option<String>,
}

impl StopMatcher {
    pub fn new(sequences: Vec<String>) -> Self {
        let longest = sequences.iter().map(|s| s.len()).max().unwrap_or(0);
        Self {
            sequences,
            window: String::new(),
            // Enough to catch a sequence split across two pushes.
            window_cap: longest.saturating_mul(2).max(16),
            matched: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Append content text; returns `true` the first time any sequence
    /// matches.
    pub fn push(&mut self, content: &str) -> bool {
        if self.matched.is_some() {
            return true;
        }
        if self.sequences.is_empty() {
            return false;
        }

        self.window.push_str(content);
        if self.window.len() > self.window_cap {
            let excess = self.window.len() - self.window_cap;
            // Trim at a char boundary.
            let mut cut = excess;
            while cut < self.window.len() && !self.window.is_char_boundary(cut) {
                cut += 1;
            }
            self.window.drain(..cut);
        }

        for sequence in &self.sequences {
            if !sequence.is_empty() && self.window.contains(sequence.as_str()) {
                self.matched = Some(sequence.clone());
                return true;
            }
        }
        false
    }

    /// Sequence that stopped the stream, if any.
    pub fn matched(&self) -> Option<&str> {
        self.matched.as_deref()
    }
}

/// Strip a trailing stop sequence from the final text.
pub fn trim_stop_suffix(text: &str, matched: Option<&str>) -> String {
    match matched {
        Some(stop) if !stop.is_empty() => match text.rfind(stop) {
            Some(pos) => text[..pos].to_string(),
            None => text.to_string(),
        },
        _ => text.to_string(),
    }
}
