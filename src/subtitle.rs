//! Confidence filtering, SRT formatting, and the structured transcript record.
//!
//! The timestamp format (`HH:MM:SS,mmm`, comma separator) and the block layout
//! `{index}\n{start} --> {end}\n{text}\n{annotation}\n\n` are compatibility
//! requirements for subtitle players, byte-exact.

use crate::error::{Error, Result};
use crate::recognizer::RecognizedSegment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default word-confidence threshold
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// One rendered subtitle block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleEntry {
    /// 1-based sequential index
    pub index: usize,
    /// Start of the first retained word, seconds
    pub start: f64,
    /// End of the last retained word, seconds
    pub end: f64,
    /// Space-joined retained words
    pub text: String,
    /// Formatted mean confidence of the retained words
    pub confidence_annotation: String,
}

/// Render seconds as an SRT timestamp, `HH:MM:SS,mmm`
pub fn format_time(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Build subtitle entries from stitched, filtered segments.
///
/// Words below `min_confidence` are dropped; a segment with no surviving
/// words produces no entry. Entries are numbered sequentially from 1.
pub fn build_entries(segments: &[RecognizedSegment], min_confidence: f64) -> Vec<SubtitleEntry> {
    let mut entries = Vec::new();
    let mut index = 1;

    for segment in segments {
        let words: Vec<_> = segment
            .words
            .iter()
            .filter(|w| w.confidence >= min_confidence)
            .collect();
        if words.is_empty() {
            continue;
        }

        let avg_confidence =
            words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64;
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        entries.push(SubtitleEntry {
            index,
            start: words[0].start,
            end: words[words.len() - 1].end,
            text,
            confidence_annotation: format!("[Confidence: {:.2}%]", avg_confidence * 100.0),
        });
        index += 1;
    }

    entries
}

/// Render entries as SRT text
pub fn render_srt(entries: &[SubtitleEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n{}\n\n",
            entry.index,
            format_time(entry.start),
            format_time(entry.end),
            entry.text,
            entry.confidence_annotation
        ));
    }
    out
}

/// Write an SRT file; failures surface as [`Error::FormatWrite`]
pub fn write_srt<P: AsRef<Path>>(path: P, entries: &[SubtitleEntry]) -> Result<()> {
    std::fs::write(path.as_ref(), render_srt(entries)).map_err(|e| {
        Error::FormatWrite(format!("{}: {}", path.as_ref().display(), e))
    })
}

/// Word-confidence aggregates over a transcript
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Compute confidence aggregates across all words; None when there are no words
pub fn confidence_stats(segments: &[RecognizedSegment]) -> Option<ConfidenceStats> {
    let confidences: Vec<f64> = segments
        .iter()
        .flat_map(|s| s.words.iter().map(|w| w.confidence))
        .collect();
    if confidences.is_empty() {
        return None;
    }
    let sum: f64 = confidences.iter().sum();
    Some(ConfidenceStats {
        avg: sum / confidences.len() as f64,
        min: confidences.iter().cloned().fold(f64::INFINITY, f64::min),
        max: confidences.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Aggregate transcription statistics carried in the structured record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionStats {
    pub total_duration: f64,
    pub total_segments: usize,
    pub total_words: usize,
    pub avg_words_per_second: f64,
    pub language: String,
    pub language_confidence: f64,
}

impl TranscriptionStats {
    pub fn from_segments(
        segments: &[RecognizedSegment],
        language: &str,
        language_confidence: f64,
    ) -> Self {
        let total_duration = segments
            .iter()
            .map(|s| s.end)
            .fold(0.0_f64, f64::max);
        let total_words = segments.iter().map(|s| s.words.len()).sum();
        let avg_words_per_second = if total_duration > 0.0 {
            total_words as f64 / total_duration
        } else {
            0.0
        };
        Self {
            total_duration,
            total_segments: segments.len(),
            total_words,
            avg_words_per_second,
            language: language.to_string(),
            language_confidence,
        }
    }
}

/// Structured transcript record, the JSON counterpart of the SRT output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub detected_language: String,
    pub language_confidence: f64,
    pub segments: Vec<RecognizedSegment>,
    pub transcription_stats: TranscriptionStats,
    pub processing_time: DateTime<Utc>,
}

/// Write the structured record as pretty JSON
pub fn write_record<P: AsRef<Path>>(path: P, record: &TranscriptRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path.as_ref(), json).map_err(|e| {
        Error::FormatWrite(format!("{}: {}", path.as_ref().display(), e))
    })
}
