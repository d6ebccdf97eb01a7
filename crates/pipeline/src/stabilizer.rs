//! LocalAgreement-2 hypothesis stabilizer (§4.3).
//!
//! Converts overlapping STT hypotheses for one active utterance window into
//! a monotonically growing sequence of committed words plus a tentative
//! caption-preview tail. Not grounded on `original_source` (the Python
//! worker commits whole STT responses outright, no stabilization) — built
//! from the spec's LocalAgreement-2 description directly, in the style of
//! the rest of this crate's per-speaker state (plain structs, no interior
//! mutability; the pipeline wraps one of these per speaker behind its own
//! lock).

use translator_core::TranscriptHypothesis;

/// A word the stabilizer promises not to retract (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedWord {
    pub text: String,
    pub offset: usize,
    pub language: String,
}

/// Result of feeding one hypothesis into the stabilizer.
#[derive(Debug, Clone, Default)]
pub struct StabilizeOutcome {
    /// Newly committed words this call (may span more than one word when a
    /// hypothesis is final or a language switch forces a flush).
    pub committed: Vec<CommittedWord>,
    /// Current tentative tail, caption-preview only — never fed to MT.
    pub tentative: Vec<String>,
}

impl StabilizeOutcome {
    fn empty() -> Self {
        StabilizeOutcome::default()
    }
}

pub struct Stabilizer {
    language: Option<String>,
    previous_words: Option<Vec<String>>,
    committed: Vec<String>,
    /// Every `(offset, text)` ever shown tentatively in the active window, in
    /// emission order — including offsets later overwritten by a disagreeing
    /// hypothesis. Compared against the final committed text per offset when
    /// the window closes to compute the retraction rate (§4.3 Metric).
    tentative_log: Vec<(usize, String)>,
    tentative_total: u64,
    retracted_total: u64,
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stabilizer {
    pub fn new() -> Self {
        Stabilizer {
            language: None,
            previous_words: None,
            committed: Vec::new(),
            tentative_log: Vec::new(),
            tentative_total: 0,
            retracted_total: 0,
        }
    }

    /// Fraction of words ever shown as tentative whose final committed text
    /// (at the same offset) differed or never arrived (§4.3 Metric).
    pub fn retraction_rate(&self) -> f64 {
        if self.tentative_total == 0 {
            0.0
        } else {
            self.retracted_total as f64 / self.tentative_total as f64
        }
    }

    pub fn push(&mut self, hypothesis: &TranscriptHypothesis) -> StabilizeOutcome {
        if hypothesis.is_empty() {
            self.reset_window();
            return StabilizeOutcome::empty();
        }

        let mut outcome = StabilizeOutcome::empty();

        if let Some(previous_language) = self.language.clone() {
            if previous_language != hypothesis.language {
                outcome.committed.extend(self.flush_window());
            }
        }
        self.language = Some(hypothesis.language.clone());

        let words: Vec<String> = hypothesis.text.split_whitespace().map(str::to_string).collect();

        let agree_len = if hypothesis.is_final {
            words.len()
        } else {
            match &self.previous_words {
                Some(previous) => common_prefix_len(previous, &words),
                None => 0,
            }
        };

        let start = self.committed.len();
        for offset in start..agree_len.max(start) {
            let text = words[offset].clone();
            self.committed.push(text.clone());
            outcome.committed.push(CommittedWord { text, offset, language: hypothesis.language.clone() });
        }

        for offset in self.committed.len()..words.len() {
            self.tentative_log.push((offset, words[offset].clone()));
            outcome.tentative.push(words[offset].clone());
        }

        self.previous_words = Some(words);

        if hypothesis.is_final {
            self.close_window_accounting();
            self.previous_words = None;
        }

        outcome
    }

    /// Force-finalize the window on a language switch (§4.3 Edge policies):
    /// whatever was pending under the previous hypothesis becomes committed,
    /// then the window resets so the new-language hypothesis starts fresh.
    fn flush_window(&mut self) -> Vec<CommittedWord> {
        let words = self.previous_words.take().unwrap_or_default();
        let language = self.language.clone().unwrap_or_default();
        let start = self.committed.len();
        let mut flushed = Vec::new();
        for offset in start..words.len() {
            let text = words[offset].clone();
            self.committed.push(text.clone());
            flushed.push(CommittedWord { text, offset, language: language.clone() });
        }
        self.close_window_accounting();
        flushed
    }

    /// Silence / empty hypothesis: abandon the tentative tail without
    /// committing it, then start the next utterance's window from scratch.
    fn reset_window(&mut self) {
        self.close_window_accounting();
        self.previous_words = None;
    }

    fn close_window_accounting(&mut self) {
        for (offset, shown) in self.tentative_log.drain(..) {
            self.tentative_total += 1;
            let final_text = self.committed.get(offset).map(|w| w.to_lowercase());
            if final_text.as_deref() != Some(shown.to_lowercase().as_str()) {
                self.retracted_total += 1;
            }
        }
        self.committed.clear();
    }
}

/// Longest common word prefix, case-insensitive, punctuation preserved
/// (§4.3 Algorithm).
fn common_prefix_len(a: &[String], b: &[String]) -> usize {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x.to_lowercase() == y.to_lowercase())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hyp(text: &str, is_final: bool, language: &str) -> TranscriptHypothesis {
        TranscriptHypothesis {
            text: text.to_string(),
            confidence: 0.9,
            language: language.to_string(),
            is_final,
            timestamp: 0.0,
            processing_time_ms: 0.0,
            words: Vec::new(),
        }
    }

    #[test]
    fn commits_only_the_agreed_prefix_across_two_hypotheses() {
        let mut s = Stabilizer::new();
        let first = s.push(&hyp("hello there", false, "en"));
        assert!(first.committed.is_empty());
        assert_eq!(first.tentative, vec!["hello", "there"]);

        let second = s.push(&hyp("hello there friend", false, "en"));
        assert_eq!(second.committed.iter().map(|w| w.text.as_str()).collect::<Vec<_>>(), vec!["hello", "there"]);
        assert_eq!(second.tentative, vec!["friend"]);
    }

    #[test]
    fn final_hypothesis_commits_the_remaining_tail() {
        let mut s = Stabilizer::new();
        s.push(&hyp("hello there", false, "en"));
        let outcome = s.push(&hyp("hello there friend", true, "en"));
        assert_eq!(outcome.committed.iter().map(|w| w.text.as_str()).collect::<Vec<_>>(), vec!["hello", "there", "friend"]);
        assert!(outcome.tentative.is_empty());
    }

    #[test]
    fn committed_offsets_are_immutable_once_emitted() {
        let mut s = Stabilizer::new();
        s.push(&hyp("a b", false, "en"));
        let second = s.push(&hyp("a b c", false, "en"));
        let third = s.push(&hyp("a b c d", true, "en"));
        let total_committed: Vec<&str> =
            second.committed.iter().chain(third.committed.iter()).map(|w| w.text.as_str()).collect();
        assert_eq!(total_committed, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn empty_hypothesis_resets_without_committing() {
        let mut s = Stabilizer::new();
        s.push(&hyp("partial words", false, "en"));
        let outcome = s.push(&hyp("", false, "en"));
        assert!(outcome.committed.is_empty());
        assert!(outcome.tentative.is_empty());

        // Next utterance starts from a clean window.
        let fresh = s.push(&hyp("new utterance", false, "en"));
        assert!(fresh.committed.is_empty());
        assert_eq!(fresh.tentative, vec!["new", "utterance"]);
    }

    #[test]
    fn language_switch_force_finalizes_the_prior_window() {
        let mut s = Stabilizer::new();
        s.push(&hyp("hola amigo", false, "es"));
        let outcome = s.push(&hyp("bonjour", false, "fr"));
        assert_eq!(outcome.committed.iter().map(|w| w.text.as_str()).collect::<Vec<_>>(), vec!["hola", "amigo"]);
        assert_eq!(outcome.tentative, vec!["bonjour"]);
    }

    #[test]
    fn retraction_rate_counts_tentative_words_that_never_confirm() {
        let mut s = Stabilizer::new();
        s.push(&hyp("the cat sat", false, "en"));
        // Second hypothesis disagrees with "sat" -> only "the cat" agrees.
        s.push(&hyp("the cat ran fast", false, "en"));
        s.push(&hyp("the cat ran fast today", true, "en"));
        assert!(s.retraction_rate() > 0.0);
        assert!(s.retraction_rate() <= 1.0);
    }

    #[test]
    fn no_tentative_words_means_zero_retraction_rate() {
        let s = Stabilizer::new();
        assert_eq!(s.retraction_rate(), 0.0);
    }
}
