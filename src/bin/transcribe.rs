/*
Batch Transcription CLI

Transcribes a 16 kHz WAV file through an external ASR HTTP service and writes
SRT subtitles plus a JSON transcript record next to each other.

Usage:
  transcribe talk.wav --asr-url http://localhost:9000
  transcribe talk.wav -o subtitles/ --language en --workers 8
*/

use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use subcap_rs::{
    AsrHttpRecognizer, ChunkConfig, FilterConfig, PipelineConfig, Recognizer, RecognizerFactory,
    StitchConfig, Transcriber,
};

#[derive(Parser)]
#[command(name = "transcribe")]
#[command(about = "Transcribe a WAV file to SRT subtitles and a JSON record")]
struct Args {
    /// Input WAV file (16 kHz, mono or stereo)
    input: PathBuf,

    /// Output directory for the .srt and .json files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Base URL of the ASR HTTP service
    #[arg(long, default_value = "http://localhost:9000")]
    asr_url: String,

    /// Per-request timeout for the ASR service (seconds)
    #[arg(long, default_value = "120")]
    asr_timeout_secs: u64,

    /// Force a language instead of detecting it on the first chunk
    #[arg(short, long)]
    language: Option<String>,

    /// Word-confidence threshold for subtitle output
    #[arg(long, default_value = "0.5")]
    min_confidence: f64,

    /// Worker threads (1 = sequential)
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Chunk window length in seconds
    #[arg(long, default_value = "30")]
    chunk_secs: f64,

    /// Overlap between consecutive windows in seconds
    #[arg(long, default_value = "1")]
    overlap_secs: f64,
}

fn main() {
    let args = Args::parse();

    let config = PipelineConfig {
        chunk: ChunkConfig {
            chunk_duration_secs: args.chunk_secs,
            overlap_duration_secs: args.overlap_secs,
        },
        stitch: StitchConfig::default(),
        filter: FilterConfig::default(),
        min_confidence: args.min_confidence,
        num_workers: args.workers,
        language: args.language.clone(),
    };
    let transcriber = Transcriber::new(config);

    let started = Instant::now();
    let result = if args.workers > 1 {
        let asr_url = args.asr_url.clone();
        let timeout = args.asr_timeout_secs;
        let factory: RecognizerFactory = Box::new(move || {
            let recognizer = AsrHttpRecognizer::new(&asr_url, timeout)?;
            Ok(Box::new(recognizer) as Box<dyn Recognizer>)
        });
        transcriber.process_media_parallel(&args.input, &args.output_dir, &factory)
    } else {
        match AsrHttpRecognizer::new(&args.asr_url, args.asr_timeout_secs) {
            Ok(mut recognizer) => {
                transcriber.process_media(&args.input, &args.output_dir, &mut recognizer)
            }
            Err(e) => Err(e),
        }
    };

    match result {
        Ok(output) => {
            let elapsed = started.elapsed().as_secs_f64();
            eprintln!();
            eprintln!("===========================================");
            eprintln!("  Transcription complete in {:.1}s", elapsed);
            eprintln!("===========================================");
            eprintln!(
                "Language: {} ({:.0}% confidence)",
                output.detected_language,
                output.language_confidence * 100.0
            );
            eprintln!("Segments: {}", output.stats.total_segments);
            eprintln!("Words: {}", output.stats.total_words);
            eprintln!("Audio duration: {:.1}s", output.stats.total_duration);
            eprintln!("Subtitles: {}", output.srt_path.display());
            eprintln!("Record: {}", output.json_path.display());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
