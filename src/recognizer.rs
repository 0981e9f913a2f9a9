//! Recognition adapter boundary.
//!
//! The speech model itself is an external collaborator. This module defines
//! the types it returns and the trait the pipeline and live sessions consume
//! it through, so any backend (HTTP service, in-process model, test double)
//! plugs in behind the same interface.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A single recognized word with timing and confidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    /// The word text
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Per-word correctness probability in [0, 1]
    pub confidence: f64,
}

/// A contiguous run of recognized words.
///
/// Timestamps are chunk-relative when produced by a [`Recognizer`] and
/// global after the stitcher has remapped them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedSegment {
    /// Segment start in seconds
    pub start: f64,
    /// Segment end in seconds
    pub end: f64,
    /// Ordered words in the segment
    pub words: Vec<Word>,
}

impl RecognizedSegment {
    /// Space-joined word texts
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Segment duration in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Output of one recognition call over a single audio window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionOutput {
    /// Ordered segments, timestamps relative to the supplied buffer
    pub segments: Vec<RecognizedSegment>,
    /// Detected (or confirmed) language code
    pub detected_language: String,
    /// Probability of the detected language
    pub language_probability: f64,
}

/// Interface to the speech recognition backend.
///
/// All timestamps in the returned output are relative to the start of the
/// supplied sample buffer. Implementations own whatever connection or model
/// state they need; `&mut self` allows buffered backends.
pub trait Recognizer: Send {
    /// Recognize one window of 16 kHz mono f32 audio.
    ///
    /// `language_hint` forces the decode language; `None` asks the backend
    /// to detect it and report the result in the output.
    fn recognize(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        language_hint: Option<&str>,
    ) -> Result<RecognitionOutput>;
}

/// Factory for creating recognizer instances, one per worker or session
pub type RecognizerFactory = Box<dyn Fn() -> Result<Box<dyn Recognizer>> + Send + Sync>;
