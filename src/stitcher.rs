//! Segment stitching across chunk boundaries.
//!
//! Each chunk's segments arrive with chunk-relative timestamps. The stitcher
//! remaps them onto the global timeline and keeps a `last_end_time` watermark
//! so that segment starts never move backward: because chunks overlap, the
//! same speech can be recognized twice at a boundary, and the second copy
//! would otherwise start before the first one ended. Clamping forward plus
//! the downstream duplicate filter resolve this without sequence alignment.

use crate::recognizer::RecognizedSegment;

/// Stitching parameters
#[derive(Debug, Clone, Copy)]
pub struct StitchConfig {
    /// Segments shorter than this after clamping are dropped as timing noise
    pub min_segment_secs: f64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            min_segment_secs: 0.1,
        }
    }
}

/// Remaps chunk-relative segments onto the global timeline.
///
/// Strictly sequential: chunk `i + 1` must not be pushed before chunk `i`,
/// even when recognition itself ran in parallel.
pub struct SegmentStitcher {
    config: StitchConfig,
    last_end_time: f64,
}

impl SegmentStitcher {
    pub fn new(config: StitchConfig) -> Self {
        Self {
            config,
            last_end_time: 0.0,
        }
    }

    /// Current watermark: the end of the last accepted segment
    pub fn last_end_time(&self) -> f64 {
        self.last_end_time
    }

    /// Remap one chunk's segments by `offset_secs` and clamp against the
    /// watermark. Returns the surviving segments in order; degenerate
    /// segments (post-clamp duration below the floor) are dropped.
    pub fn push_chunk(
        &mut self,
        offset_secs: f64,
        segments: Vec<RecognizedSegment>,
    ) -> Vec<RecognizedSegment> {
        let mut accepted = Vec::with_capacity(segments.len());

        for mut segment in segments {
            let start = (segment.start + offset_secs).max(self.last_end_time);
            let end = segment.end + offset_secs;

            if end - start < self.config.min_segment_secs {
                continue;
            }

            segment.start = start;
            segment.end = end;
            for word in &mut segment.words {
                word.start = (word.start + offset_secs).max(self.last_end_time);
                word.end = (word.end + offset_secs).max(word.start);
            }

            self.last_end_time = end;
            accepted.push(segment);
        }

        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::Word;

    fn segment(start: f64, end: f64, texts: &[&str]) -> RecognizedSegment {
        let n = texts.len() as f64;
        let step = (end - start) / n;
        let words = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Word {
                text: t.to_string(),
                start: start + i as f64 * step,
                end: start + (i + 1) as f64 * step,
                confidence: 0.9,
            })
            .collect();
        RecognizedSegment { start, end, words }
    }

    #[test]
    fn test_offset_applied() {
        let mut stitcher = SegmentStitcher::new(StitchConfig::default());
        let out = stitcher.push_chunk(29.0, vec![segment(0.0, 1.0, &["hello"])]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start, 29.0);
        assert_eq!(out[0].end, 30.0);
        assert_eq!(out[0].words[0].start, 29.0);
    }

    #[test]
    fn test_clamp_forward_never_backward() {
        let mut stitcher = SegmentStitcher::new(StitchConfig::default());
        stitcher.push_chunk(0.0, vec![segment(0.0, 5.0, &["a", "b"])]);
        // Overlap re-recognition: starts at global 4.0, before the watermark
        let out = stitcher.push_chunk(0.0, vec![segment(4.0, 7.0, &["c"])]);
        assert_eq!(out[0].start, 5.0);
        assert_eq!(out[0].end, 7.0);
        assert!(out[0].words[0].start >= 5.0);
    }

    #[test]
    fn test_degenerate_segment_dropped() {
        let mut stitcher = SegmentStitcher::new(StitchConfig::default());
        stitcher.push_chunk(0.0, vec![segment(0.0, 6.0, &["a"])]);
        // Clamped start 6.0, end 6.05: duration under the 0.1s floor
        let out = stitcher.push_chunk(0.0, vec![segment(5.9, 6.05, &["b"])]);
        assert!(out.is_empty());
        assert_eq!(stitcher.last_end_time(), 6.0);
    }

    #[test]
    fn test_monotonic_across_chunks() {
        let mut stitcher = SegmentStitcher::new(StitchConfig::default());
        let mut all = Vec::new();
        all.extend(stitcher.push_chunk(0.0, vec![segment(0.0, 10.0, &["one"])]));
        all.extend(stitcher.push_chunk(29.0, vec![segment(0.0, 1.0, &["two"])]));
        all.extend(stitcher.push_chunk(58.0, vec![segment(0.5, 3.0, &["three"])]));

        for pair in all.windows(2) {
            assert!(pair[1].start >= pair[0].end);
        }
        for seg in &all {
            assert!(seg.end >= seg.start);
        }
    }

    #[test]
    fn test_word_behind_watermark_keeps_end_at_or_after_start() {
        let mut stitcher = SegmentStitcher::new(StitchConfig::default());
        stitcher.push_chunk(0.0, vec![segment(0.0, 5.0, &["a"])]);
        // Segment survives the clamp, but its first word lies entirely
        // behind the watermark; its end must be pulled up with its start
        let mut seg = segment(4.0, 7.0, &["b", "c"]);
        seg.words[0].start = 4.0;
        seg.words[0].end = 4.5;
        seg.words[1].start = 4.5;
        seg.words[1].end = 7.0;
        let out = stitcher.push_chunk(0.0, vec![seg]);
        assert_eq!(out.len(), 1);
        for word in &out[0].words {
            assert!(word.end >= word.start, "word end precedes start");
        }
        assert_eq!(out[0].words[0].start, 5.0);
        assert_eq!(out[0].words[0].end, 5.0);
    }

    #[test]
    fn test_negative_duration_after_clamp_dropped() {
        let mut stitcher = SegmentStitcher::new(StitchConfig::default());
        stitcher.push_chunk(0.0, vec![segment(0.0, 8.0, &["a"])]);
        // Entirely behind the watermark: clamped start 8.0 > end 6.0
        let out = stitcher.push_chunk(0.0, vec![segment(5.0, 6.0, &["b"])]);
        assert!(out.is_empty());
    }
}
