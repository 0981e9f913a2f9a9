//! Chunk scheduling for batch transcription.
//!
//! Long audio is split into fixed-length overlapping windows. Each window
//! after the first begins `chunk_duration - overlap_duration` seconds after
//! the previous window's start; the final window is truncated to the end of
//! the sample buffer. The overlap exists solely to avoid losing speech at
//! window boundaries; the stitcher and duplicate filter resolve the doubled
//! recognition downstream.

use crate::audio::SAMPLE_RATE;

/// Chunking parameters
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Duration of each chunk in seconds (default: 30.0)
    pub chunk_duration_secs: f64,
    /// Overlap between chunks in seconds (default: 1.0)
    pub overlap_duration_secs: f64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: 30.0,
            overlap_duration_secs: 1.0,
        }
    }
}

impl ChunkConfig {
    /// Seconds between consecutive chunk starts
    pub fn step_secs(&self) -> f64 {
        self.chunk_duration_secs - self.overlap_duration_secs
    }
}

/// A window into the source sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioChunk {
    /// Chunk index (0-based)
    pub index: usize,
    /// First sample of the window
    pub start_sample: usize,
    /// One past the last sample of the window
    pub end_sample: usize,
}

impl AudioChunk {
    /// Offset of this chunk on the global timeline in seconds
    pub fn offset_secs(&self) -> f64 {
        self.start_sample as f64 / SAMPLE_RATE as f64
    }

    /// Window length in samples
    pub fn len(&self) -> usize {
        self.end_sample - self.start_sample
    }

    /// True if the window contains no samples
    pub fn is_empty(&self) -> bool {
        self.end_sample == self.start_sample
    }
}

/// Lazy iterator over overlapping chunks of a sample buffer.
///
/// Stateless aside from the cursor; does not touch the samples themselves,
/// so the same scheduler parameters can be replayed over any buffer.
pub struct ChunkScheduler {
    total_samples: usize,
    chunk_samples: usize,
    step_samples: usize,
    cursor: usize,
    index: usize,
}

impl ChunkScheduler {
    pub fn new(total_samples: usize, config: ChunkConfig) -> Self {
        let chunk_samples = (config.chunk_duration_secs * SAMPLE_RATE as f64) as usize;
        let step_samples = (config.step_secs() * SAMPLE_RATE as f64) as usize;
        Self {
            total_samples,
            chunk_samples,
            step_samples: step_samples.max(1),
            cursor: 0,
            index: 0,
        }
    }
}

impl Iterator for ChunkScheduler {
    type Item = AudioChunk;

    fn next(&mut self) -> Option<AudioChunk> {
        if self.cursor >= self.total_samples {
            return None;
        }
        let chunk = AudioChunk {
            index: self.index,
            start_sample: self.cursor,
            end_sample: (self.cursor + self.chunk_samples).min(self.total_samples),
        };
        self.cursor += self.step_samples;
        self.index += 1;
        Some(chunk)
    }
}
