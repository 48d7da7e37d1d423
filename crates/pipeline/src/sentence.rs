//! Sentence buffering between the LLM stream and TTS
//!
//! Content tokens buffer until a sentence boundary (terminator followed by
//! whitespace) or a token cap, whichever comes first; each flushed span is
//! one TTS synthesis unit. The span queue never blocks the LLM and never
//! drops text: past the cap, new spans coalesce into the newest entry so
//! synthesis falls behind gracefully while delivery stays lossless.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Buffers content tokens into sentence-sized spans.
pub struct SentenceBuffer {
    buf: String,
    tokens_since_flush: usize,
    max_tokens_per_span: usize,
}

impl SentenceBuffer {
    pub fn new(max_tokens_per_span: usize) -> Self {
        Self {
            buf: String::new(),
            tokens_since_flush: 0,
            max_tokens_per_span: max_tokens_per_span.max(1),
        }
    }

    /// Append one token; returns a completed span when a boundary is hit.
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.buf.push_str(token);
        self.tokens_since_flush += 1;

        if self.at_sentence_boundary() || self.tokens_since_flush >= self.max_tokens_per_span {
            return self.flush();
        }
        None
    }

    /// Take whatever is buffered, boundary or not.
    pub fn flush(&mut self) -> Option<String> {
        self.tokens_since_flush = 0;
        if self.buf.trim().is_empty() {
            self.buf.clear();
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }

    /// Period, exclamation, or question mark followed by whitespace.
    fn at_sentence_boundary(&self) -> bool {
        let mut chars = self.buf.chars().rev();
        let Some(last) = chars.next() else {
            return false;
        };
        if !last.is_whitespace() {
            return false;
        }
        matches!(chars.next(), Some('.') | Some('!') | Some('?'))
    }
}

/// Bounded span queue feeding the TTS task.
///
/// `push` never blocks; past `cap` entries the newest span absorbs the
/// incoming text instead of growing the queue.
pub struct SpanQueue {
    inner: Mutex<SpanQueueInner>,
    notify: Notify,
    cap: usize,
}

struct SpanQueueInner {
    spans: VecDeque<String>,
    closed: bool,
    coalesced: u64,
}

impl SpanQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(SpanQueueInner {
                spans: VecDeque::new(),
                closed: false,
                coalesced: 0,
            }),
            notify: Notify::new(),
            cap: cap.max(1),
        }
    }

    pub fn push(&self, span: String) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            if inner.spans.len() >= self.cap {
                match inner.spans.back_mut() {
                    Some(last) => {
                        last.push_str(&span);
                        inner.coalesced += 1;
                    }
                    None => inner.spans.push_back(span),
                }
            } else {
                inner.spans.push_back(span);
            }
        }
        self.notify.notify_one();
    }

    /// No more spans will arrive; wakes the consumer to drain and exit.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Drop queued spans (cancellation) and close.
    pub fn abort(&self) {
        {
            let mut inner = self.inner.lock();
            inner.spans.clear();
            inner.closed = true;
        }
        self.notify.notify_waiters();
    }

    /// Next span, or `None` once closed and drained.
    pub async fn pop(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(span) = inner.spans.pop_front() {
                    return Some(span);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Spans merged into a neighbor because the queue was at capacity.
    pub fn coalesced(&self) -> u64 {
        self.inner.lock().coalesced
    }

    pub fn len(&self) -> usize {
        self.inner.lock().spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().spans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_boundary_flush() {
        let mut buffer = SentenceBuffer::new(100);
        assert!(buffer.push("Hello").is_none());
        assert!(buffer.push(" there").is_none());
        let span = buffer.push(". ").unwrap();
        assert_eq!(span, "Hello there. ");
    }

    #[test]
    fn test_question_and_exclamation_boundaries() {
        let mut buffer = SentenceBuffer::new(100);
        assert!(buffer.push("Really?").is_none());
        assert_eq!(buffer.push(" ").unwrap(), "Really? ");

        assert!(buffer.push("Wow!").is_none());
        assert_eq!(buffer.push("\n").unwrap(), "Wow!\n");
    }

    #[test]
    fn test_token_cap_flush() {
        let mut buffer = SentenceBuffer::new(3);
        assert!(buffer.push("a").is_none());
        assert!(buffer.push("b").is_none());
        assert_eq!(buffer.push("c").unwrap(), "abc");
    }

    #[test]
    fn test_flush_empty_is_none() {
        let mut buffer = SentenceBuffer::new(10);
        assert!(buffer.flush().is_none());
        buffer.push("   ");
        assert!(buffer.flush().is_none());
    }

    #[tokio::test]
    async fn test_queue_push_pop() {
        let queue = SpanQueue::new(10);
        queue.push("one".into());
        queue.push("two".into());
        assert_eq!(queue.pop().await.unwrap(), "one");
        assert_eq!(queue.pop().await.unwrap(), "two");

        queue.close();
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_queue_coalesces_past_cap_losslessly() {
        let queue = SpanQueue::new(2);
        queue.push("a. ".into());
        queue.push("b. ".into());
        queue.push("c. ".into());
        queue.push("d. ".into());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.coalesced(), 2);

        queue.close();
        let mut text = String::new();
        while let Some(span) = queue.pop().await {
            text.push_str(&span);
        }
        // Every span's text survived coalescing.
        assert_eq!(text, "a. b. c. d. ");
    }

    #[tokio::test]
    async fn test_abort_drops_spans() {
        let queue = SpanQueue::new(10);
        queue.push("unspoken".into());
        queue.abort();
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = std::sync::Arc::new(SpanQueue::new(10));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push("late".into());
        assert_eq!(consumer.await.unwrap().unwrap(), "late");
    }
}
