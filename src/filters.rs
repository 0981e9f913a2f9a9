//! Duplicate and repetition filtering.
//!
//! Two failure modes show up in chunk-overlap transcription: the overlap
//! window re-recognizes speech already emitted by the previous chunk, and the
//! model hallucinates degenerate repetition on silence or noise. Both are
//! handled heuristically per segment before it enters the transcript:
//!
//! - adjacent duplicate words inside a segment are collapsed in place
//!   ("the the the" becomes "the");
//! - a segment where any character repeats more than `max_char_repeat` times
//!   consecutively is discarded outright;
//! - a segment whose word-set Jaccard similarity against the most recently
//!   accepted segment exceeds `dedup_threshold`, or whose distinct-word ratio
//!   falls below `min_distinct_ratio`, is discarded as an overlap artifact.
//!
//! These are tuned thresholds, not exact dedup: genuinely repeated but
//! distinct speech can be a false positive, which is an accepted tradeoff.

use crate::recognizer::RecognizedSegment;
use std::collections::HashSet;

/// Filter thresholds, all source-tuned and overridable
#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    /// Jaccard similarity above which a segment is a cross-chunk duplicate (default: 0.6)
    pub dedup_threshold: f64,
    /// Distinct-word ratio below which a segment is a repeat artifact (default: 0.5)
    pub min_distinct_ratio: f64,
    /// Maximum consecutive repeats of one character before the segment is
    /// discarded as a hallucination (default: 3)
    pub max_char_repeat: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.6,
            min_distinct_ratio: 0.5,
            max_char_repeat: 3,
        }
    }
}

/// Stateful per-transcript filter tracking the last accepted segment
pub struct SegmentFilter {
    config: FilterConfig,
    last_text: Option<String>,
}

impl SegmentFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            last_text: None,
        }
    }

    /// Apply all checks to a candidate segment. Returns true if the segment
    /// should be accepted; the segment's word list may be mutated (adjacent
    /// duplicate words collapsed) even when accepted.
    pub fn admit(&mut self, segment: &mut RecognizedSegment) -> bool {
        collapse_adjacent_duplicates(segment);

        let text = segment.text();
        if text.is_empty() {
            return false;
        }

        if has_excessive_repetition(&text, self.config.max_char_repeat) {
            return false;
        }

        if let Some(last) = &self.last_text {
            if jaccard_similarity(&text, last) > self.config.dedup_threshold {
                return false;
            }
            if distinct_word_ratio(&text) < self.config.min_distinct_ratio {
                return false;
            }
        }

        self.last_text = Some(text);
        true
    }
}

/// Collapse immediately-adjacent duplicate words in place
fn collapse_adjacent_duplicates(segment: &mut RecognizedSegment) {
    segment
        .words
        .dedup_by(|current, previous| current.text == previous.text);
}

/// True if any character repeats more than `max_repeat` times consecutively
pub fn has_excessive_repetition(text: &str, max_repeat: usize) -> bool {
    let mut chars = text.chars();
    let Some(mut prev) = chars.next() else {
        return false;
    };
    let mut run = 1;

    for c in chars {
        if c == prev {
            run += 1;
            if run > max_repeat {
                return true;
            }
        } else {
            run = 1;
            prev = c;
        }
    }
    false
}

/// Word-set Jaccard similarity between two texts
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();

    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Ratio of distinct words to total words
fn distinct_word_ratio(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 1.0;
    }
    let distinct: HashSet<&str> = words.iter().copied().collect();
    distinct.len() as f64 / words.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::Word;

    fn segment(texts: &[&str]) -> RecognizedSegment {
        let words = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Word {
                text: t.to_string(),
                start: i as f64,
                end: i as f64 + 1.0,
                confidence: 0.9,
            })
            .collect();
        RecognizedSegment {
            start: 0.0,
            end: texts.len() as f64,
            words,
        }
    }

    #[test]
    fn test_char_repetition_threshold() {
        // 4 repeats with threshold 3: discarded
        assert!(has_excessive_repetition("aaaa", 3));
        // alternating characters: retained
        assert!(!has_excessive_repetition("abab", 3));
        assert!(!has_excessive_repetition("aaa", 3));
        assert!(!has_excessive_repetition("", 3));
    }

    #[test]
    fn test_repetition_discards_segment() {
        let mut filter = SegmentFilter::new(FilterConfig::default());
        let mut seg = segment(&["aaaa"]);
        assert!(!filter.admit(&mut seg));
    }

    #[test]
    fn test_identical_consecutive_segments_collapse() {
        let mut filter = SegmentFilter::new(FilterConfig::default());
        let mut first = segment(&["hello", "world"]);
        let mut second = segment(&["hello", "world"]);
        assert!(filter.admit(&mut first));
        assert!(!filter.admit(&mut second));
    }

    #[test]
    fn test_distinct_segments_both_kept() {
        let mut filter = SegmentFilter::new(FilterConfig::default());
        let mut first = segment(&["good", "morning", "everyone"]);
        let mut second = segment(&["welcome", "to", "the", "show"]);
        assert!(filter.admit(&mut first));
        assert!(filter.admit(&mut second));
    }

    #[test]
    fn test_adjacent_duplicate_words_collapsed_not_discarded() {
        let mut filter = SegmentFilter::new(FilterConfig::default());
        let mut seg = segment(&["the", "the", "the", "end"]);
        assert!(filter.admit(&mut seg));
        assert_eq!(seg.text(), "the end");
    }

    #[test]
    fn test_first_segment_never_checked_against_previous() {
        let mut filter = SegmentFilter::new(FilterConfig::default());
        // Low distinct ratio, but no previous segment exists yet; adjacent
        // collapse reduces it to distinct words anyway
        let mut seg = segment(&["go", "go", "go", "go"]);
        assert!(filter.admit(&mut seg));
        assert_eq!(seg.text(), "go");
    }

    #[test]
    fn test_low_distinct_ratio_discarded_after_first() {
        let mut filter = SegmentFilter::new(FilterConfig::default());
        let mut first = segment(&["hello", "there"]);
        assert!(filter.admit(&mut first));
        // "yes no yes no yes no" -> 2 distinct / 6 total, below 0.5
        let mut second = segment(&["yes", "no", "yes", "no", "yes", "no"]);
        assert!(!filter.admit(&mut second));
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard_similarity("hello world", "hello world"), 1.0);
        assert_eq!(jaccard_similarity("hello", "world"), 0.0);
        let sim = jaccard_similarity("hello world foo", "hello world bar");
        assert!(sim > 0.4 && sim < 0.8);
        assert_eq!(jaccard_similarity("", ""), 1.0);
    }
}
