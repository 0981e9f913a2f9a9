//! # subcap-rs
//!
//! Chunked speech transcription with subtitle output and credit-metered
//! live sessions.
//!
//! Audio is split into overlapping fixed-length chunks, each chunk is sent to
//! a speech recognizer, and the per-chunk results are stitched back onto a
//! single monotonic timeline, filtered for overlap artifacts, and rendered as
//! SRT subtitles plus a JSON transcript record.
//!
//! ## Features
//!
//! - 30-second chunks with 1-second overlap, lazily scheduled
//! - Timestamp stitching with a forward-only watermark
//! - Duplicate and repetition filtering across chunk boundaries
//! - Confidence-annotated SRT output and a structured JSON record
//! - Parallel chunk recognition on worker threads
//! - Live WebSocket sessions with per-user credit budgets
//!
//! ## Quick Start
//!
//! ```ignore
//! use subcap_rs::{AsrHttpRecognizer, PipelineConfig, Transcriber};
//!
//! let mut recognizer = AsrHttpRecognizer::new("http://localhost:9000", 120)?;
//! let transcriber = Transcriber::new(PipelineConfig::default());
//! let output = transcriber.process_media("talk.wav", "out", &mut recognizer)?;
//! println!("Wrote {}", output.srt_path.display());
//! ```
//!
//! ## Audio Requirements
//!
//! - Format: WAV
//! - Sample Rate: 16kHz
//! - Channels: Mono (stereo will be converted automatically)
//! - Bit Depth: 16-bit PCM or 32-bit float

pub mod asr_http;
pub mod audio;
pub mod chunker;
mod error;
pub mod filters;
pub mod ledger;
pub mod live;
pub mod pipeline;
pub mod recognizer;
pub mod stitcher;
pub mod subtitle;

pub use error::{Error, Result};

pub use asr_http::AsrHttpRecognizer;
pub use audio::{downmix, f32le_to_samples, load_wav, pcm16_to_samples, SAMPLE_RATE};
pub use chunker::{AudioChunk, ChunkConfig, ChunkScheduler};
pub use filters::{has_excessive_repetition, jaccard_similarity, FilterConfig, SegmentFilter};
pub use ledger::{CreditLedger, InMemoryLedger, UsageRecord};
pub use live::{
    BudgetConfig, ChunkOutcome, LiveSegment, LiveSession, LiveStage, OutboundMessage, Settlement,
    TextOutcome,
};
pub use pipeline::{MediaOutput, PipelineConfig, Transcriber, Transcript};
pub use recognizer::{RecognitionOutput, RecognizedSegment, Recognizer, RecognizerFactory, Word};
pub use stitcher::{SegmentStitcher, StitchConfig};
pub use subtitle::{
    build_entries, confidence_stats, format_time, render_srt, write_record, write_srt,
    ConfidenceStats, SubtitleEntry, TranscriptRecord, TranscriptionStats,
    DEFAULT_MIN_CONFIDENCE,
};
