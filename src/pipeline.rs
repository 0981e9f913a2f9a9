//! Batch transcription pipeline.
//!
//! Orchestrates the full chunk-overlap flow: schedule overlapping windows,
//! recognize each window, stitch results onto the global timeline, filter
//! duplicates and hallucinated repetition, and emit the SRT file plus the
//! structured JSON record.
//!
//! Language is detected on the first chunk (unless configured) and reused for
//! every later chunk. Recognition of the remaining chunks is data-parallel;
//! results are reassembled by chunk index before the strictly sequential
//! stitch. A single chunk's recognition failure aborts the whole run.

use crate::audio::{self, SAMPLE_RATE};
use crate::chunker::{ChunkConfig, ChunkScheduler};
use crate::error::{Error, Result};
use crate::filters::{FilterConfig, SegmentFilter};
use crate::recognizer::{RecognizedSegment, Recognizer, RecognizerFactory};
use crate::stitcher::{SegmentStitcher, StitchConfig};
use crate::subtitle::{self, TranscriptRecord, TranscriptionStats, DEFAULT_MIN_CONFIDENCE};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

/// Configuration for a batch transcription run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk: ChunkConfig,
    pub stitch: StitchConfig,
    pub filter: FilterConfig,
    /// Word-confidence threshold for subtitle output (default: 0.5)
    pub min_confidence: f64,
    /// Worker threads for parallel recognition (default: 4)
    pub num_workers: usize,
    /// Force this language instead of detecting on the first chunk
    pub language: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            stitch: StitchConfig::default(),
            filter: FilterConfig::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            num_workers: 4,
            language: None,
        }
    }
}

/// Final ordered transcript with language metadata
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Segments surviving stitching and all filters, in timeline order
    pub segments: Vec<RecognizedSegment>,
    pub detected_language: String,
    pub language_confidence: f64,
    /// Max of all segment ends, seconds
    pub total_duration: f64,
    pub total_words: usize,
}

/// Paths and stats from a completed media run
#[derive(Debug, Clone)]
pub struct MediaOutput {
    pub srt_path: PathBuf,
    pub json_path: PathBuf,
    pub stats: TranscriptionStats,
    pub detected_language: String,
    pub language_confidence: f64,
}

struct ChunkJob {
    index: usize,
    offset_secs: f64,
    samples: Vec<f32>,
}

struct ChunkOutput {
    index: usize,
    offset_secs: f64,
    segments: Vec<RecognizedSegment>,
}

/// Batch transcriber
pub struct Transcriber {
    config: PipelineConfig,
}

impl Transcriber {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Transcribe a full sample buffer with a single recognizer, sequentially.
    pub fn transcribe_samples(
        &self,
        samples: &[f32],
        recognizer: &mut dyn Recognizer,
    ) -> Result<Transcript> {
        let mut stitcher = SegmentStitcher::new(self.config.stitch);
        let mut filter = SegmentFilter::new(self.config.filter);
        let mut segments = Vec::new();

        let mut detected_language = self.config.language.clone();
        let mut language_confidence = if detected_language.is_some() { 1.0 } else { 0.0 };

        for chunk in ChunkScheduler::new(samples.len(), self.config.chunk) {
            let window = &samples[chunk.start_sample..chunk.end_sample];
            let output = recognizer.recognize(window, SAMPLE_RATE, detected_language.as_deref())?;

            if detected_language.is_none() {
                language_confidence = output.language_probability;
                detected_language = Some(output.detected_language.clone());
            }

            for mut segment in stitcher.push_chunk(chunk.offset_secs(), output.segments) {
                if filter.admit(&mut segment) {
                    segments.push(segment);
                }
            }
        }

        Ok(self.finish(segments, detected_language, language_confidence))
    }

    /// Transcribe with a pool of worker threads, one recognizer per worker.
    ///
    /// The first chunk runs alone to fix the language; remaining chunks are
    /// recognized in parallel and reassembled by index before stitching.
    pub fn transcribe_samples_parallel(
        &self,
        samples: &[f32],
        factory: &RecognizerFactory,
    ) -> Result<Transcript> {
        let chunks: Vec<_> = ChunkScheduler::new(samples.len(), self.config.chunk).collect();
        if chunks.is_empty() {
            return Ok(self.finish(Vec::new(), self.config.language.clone(), 0.0));
        }

        eprintln!(
            "[Batch] Processing {} chunks ({:.1}s audio, {:.0}s windows, {:.0}s overlap)",
            chunks.len(),
            samples.len() as f64 / SAMPLE_RATE as f64,
            self.config.chunk.chunk_duration_secs,
            self.config.chunk.overlap_duration_secs
        );

        // Chunk 0 fixes the language for everything after it
        let mut first_recognizer = factory()?;
        let first = &chunks[0];
        let first_output = first_recognizer.recognize(
            &samples[first.start_sample..first.end_sample],
            SAMPLE_RATE,
            self.config.language.as_deref(),
        )?;
        let detected_language = match &self.config.language {
            Some(lang) => lang.clone(),
            None => first_output.detected_language.clone(),
        };
        let language_confidence = if self.config.language.is_some() {
            1.0
        } else {
            first_output.language_probability
        };
        drop(first_recognizer);

        let mut outputs = vec![ChunkOutput {
            index: 0,
            offset_secs: first.offset_secs(),
            segments: first_output.segments,
        }];

        let rest: Vec<ChunkJob> = chunks[1..]
            .iter()
            .map(|c| ChunkJob {
                index: c.index,
                offset_secs: c.offset_secs(),
                samples: samples[c.start_sample..c.end_sample].to_vec(),
            })
            .collect();

        if !rest.is_empty() {
            outputs.extend(self.recognize_parallel(rest, factory, &detected_language)?);
        }

        outputs.sort_by_key(|o| o.index);

        let mut stitcher = SegmentStitcher::new(self.config.stitch);
        let mut filter = SegmentFilter::new(self.config.filter);
        let mut segments = Vec::new();
        for output in outputs {
            for mut segment in stitcher.push_chunk(output.offset_secs, output.segments) {
                if filter.admit(&mut segment) {
                    segments.push(segment);
                }
            }
        }

        Ok(self.finish(segments, Some(detected_language), language_confidence))
    }

    fn recognize_parallel(
        &self,
        jobs: Vec<ChunkJob>,
        factory: &RecognizerFactory,
        language: &str,
    ) -> Result<Vec<ChunkOutput>> {
        let total = jobs.len();
        let num_workers = self.config.num_workers.max(1).min(total);

        let (job_tx, job_rx) = mpsc::channel::<ChunkJob>();
        let (result_tx, result_rx) = mpsc::channel::<Result<ChunkOutput>>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        thread::scope(|scope| {
            for worker_id in 0..num_workers {
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                let language = language.to_string();

                scope.spawn(move || {
                    let mut recognizer = match factory() {
                        Ok(r) => r,
                        Err(e) => {
                            eprintln!("[Batch Worker {}] Failed to start recognizer: {}", worker_id, e);
                            let _ = result_tx.send(Err(e));
                            return;
                        }
                    };

                    loop {
                        let job = {
                            let rx = job_rx.lock().unwrap();
                            rx.recv()
                        };
                        match job {
                            Ok(job) => {
                                let result = recognizer
                                    .recognize(&job.samples, SAMPLE_RATE, Some(&language))
                                    .map(|out| ChunkOutput {
                                        index: job.index,
                                        offset_secs: job.offset_secs,
                                        segments: out.segments,
                                    });
                                if result_tx.send(result).is_err() {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                });
            }
            drop(result_tx);

            for job in jobs {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);

            let mut outputs = Vec::with_capacity(total);
            let mut first_error = None;
            for result in result_rx {
                match result {
                    Ok(output) => {
                        eprintln!(
                            "[Batch] Completed chunk {} ({}/{})",
                            output.index,
                            outputs.len() + 1,
                            total
                        );
                        outputs.push(output);
                    }
                    Err(e) => {
                        // All-or-nothing: remember the failure, let workers drain
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(outputs),
            }
        })
    }

    fn finish(
        &self,
        segments: Vec<RecognizedSegment>,
        language: Option<String>,
        language_confidence: f64,
    ) -> Transcript {
        let total_duration = segments.iter().map(|s| s.end).fold(0.0_f64, f64::max);
        let total_words = segments.iter().map(|s| s.words.len()).sum();
        Transcript {
            segments,
            detected_language: language.unwrap_or_else(|| "unknown".to_string()),
            language_confidence,
            total_duration,
            total_words,
        }
    }

    /// Transcribe a WAV file and write `<base>.srt` and `<base>.json` into
    /// `output_dir`.
    pub fn process_media<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Q,
        recognizer: &mut dyn Recognizer,
    ) -> Result<MediaOutput> {
        let input_path = input_path.as_ref();
        let samples = audio::load_wav(input_path)?;
        let transcript = self.transcribe_samples(&samples, recognizer)?;
        self.write_outputs(input_path, output_dir.as_ref(), transcript)
    }

    /// Parallel variant of [`process_media`](Self::process_media); one
    /// recognizer per worker thread.
    pub fn process_media_parallel<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Q,
        factory: &RecognizerFactory,
    ) -> Result<MediaOutput> {
        let input_path = input_path.as_ref();
        let samples = audio::load_wav(input_path)?;
        let transcript = self.transcribe_samples_parallel(&samples, factory)?;
        self.write_outputs(input_path, output_dir.as_ref(), transcript)
    }

    fn write_outputs(
        &self,
        input_path: &Path,
        output_dir: &Path,
        transcript: Transcript,
    ) -> Result<MediaOutput> {
        std::fs::create_dir_all(output_dir)?;
        let base = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::InputNotFound(input_path.display().to_string()))?;

        let entries = subtitle::build_entries(&transcript.segments, self.config.min_confidence);
        let srt_path = output_dir.join(format!("{}.srt", base));
        subtitle::write_srt(&srt_path, &entries)?;

        let stats = TranscriptionStats::from_segments(
            &transcript.segments,
            &transcript.detected_language,
            transcript.language_confidence,
        );
        let record = TranscriptRecord {
            detected_language: transcript.detected_language.clone(),
            language_confidence: transcript.language_confidence,
            segments: transcript.segments.clone(),
            transcription_stats: stats.clone(),
            processing_time: Utc::now(),
        };
        let json_path = output_dir.join(format!("{}.json", base));
        subtitle::write_record(&json_path, &record)?;

        eprintln!(
            "[Batch] Wrote {} subtitle entries to {}",
            entries.len(),
            srt_path.display()
        );

        Ok(MediaOutput {
            srt_path,
            json_path,
            stats,
            detected_language: transcript.detected_language,
            language_confidence: transcript.language_confidence,
        })
    }
}
