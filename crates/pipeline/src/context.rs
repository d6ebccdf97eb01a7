//! Per-speaker rolling MT context buffer (§3 ContextWindow, §4.2).

use std::collections::VecDeque;

/// Sentence cap from `original_source/backend/agents/translator_worker.py`'s
/// `update_context_buffer` (`while len(buffer) > 3 or ...`) — fixed, unlike
/// the token cap, which is configurable (`TRANSLATOR_CONTEXT_TOKEN_CAP`).
const MAX_SENTENCES: usize = 3;

/// Bounded rolling window of a speaker's recently confirmed source-language
/// utterances, used as MT prompt conditioning. Eviction drops the oldest
/// sentence while *either* cap is exceeded, matching the Python `while`
/// loop's `or` (decision recorded in `DESIGN.md`).
pub struct ContextWindow {
    sentences: VecDeque<String>,
    max_tokens: usize,
}

impl ContextWindow {
    pub fn new(max_tokens: usize) -> Self {
        ContextWindow { sentences: VecDeque::new(), max_tokens }
    }

    /// Push one committed sentence, then evict oldest entries until both
    /// caps are satisfied.
    pub fn push(&mut self, sentence: impl Into<String>) {
        let sentence = sentence.into();
        if sentence.trim().is_empty() {
            return;
        }
        self.sentences.push_back(sentence);
        while self.sentences.len() > MAX_SENTENCES || self.total_words() > self.max_tokens {
            self.sentences.pop_front();
        }
    }

    fn total_words(&self) -> usize {
        self.sentences.iter().map(|s| s.split_whitespace().count()).sum()
    }

    /// Current sentences joined by single spaces — the MT `context` field.
    pub fn snapshot(&self) -> String {
        self.sentences.iter().cloned().collect::<Vec<_>>().join(" ")
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_sentence_cap_exceeded() {
        let mut window = ContextWindow::new(512);
        window.push("one");
        window.push("two");
        window.push("three");
        window.push("four");
        assert_eq!(window.len(), 3);
        assert_eq!(window.snapshot(), "two three four");
    }

    #[test]
    fn evicts_oldest_once_token_cap_exceeded() {
        let mut window = ContextWindow::new(3);
        window.push("one two");
        window.push("three four");
        assert_eq!(window.len(), 1);
        assert_eq!(window.snapshot(), "three four");
    }

    #[test]
    fn a_single_oversized_sentence_is_evicted_to_empty() {
        let mut window = ContextWindow::new(3);
        window.push("one two three four five");
        assert!(window.is_empty());
        assert_eq!(window.snapshot(), "");
    }

    #[test]
    fn blank_sentences_are_not_pushed() {
        let mut window = ContextWindow::new(512);
        window.push("   ");
        assert!(window.is_empty());
    }

    #[test]
    fn snapshot_joins_with_single_spaces() {
        let mut window = ContextWindow::new(512);
        window.push("hello there");
        window.push("how are you");
        assert_eq!(window.snapshot(), "hello there how are you");
    }
}
