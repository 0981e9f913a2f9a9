//! Audio loading and PCM conversion.
//!
//! The pipeline operates on 16 kHz mono f32 samples. WAV files are read with
//! hound; stereo input is downmixed by averaging channels. Sample-rate
//! conversion is delegated to ffmpeg upstream, so anything other than 16 kHz
//! is rejected here.

use crate::error::{Error, Result};
use std::path::Path;

/// Sample rate the pipeline and recognition adapter expect
pub const SAMPLE_RATE: u32 = 16000;

/// Load a WAV file as 16 kHz mono f32 samples.
///
/// Supports 16-bit integer and 32-bit float PCM. Multi-channel audio is
/// downmixed to mono by averaging.
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<Vec<f32>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::InputNotFound(path.display().to_string()));
    }

    let mut reader =
        hound::WavReader::open(path).map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();

    if spec.sample_rate != SAMPLE_RATE {
        return Err(Error::Decode(format!(
            "expected {} Hz audio, got {} Hz (convert with ffmpeg first)",
            SAMPLE_RATE, spec.sample_rate
        )));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(e.to_string()))?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(e.to_string()))?,
    };

    Ok(downmix(samples, spec.channels as usize))
}

/// Downmix interleaved multi-channel samples to mono by averaging
pub fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Decode raw little-endian signed 16-bit PCM bytes to f32 samples
pub fn pcm16_to_samples(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "pcm16 frame has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect())
}

/// Decode raw little-endian 32-bit float PCM bytes to f32 samples
pub fn f32le_to_samples(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Decode(format!(
            "f32le frame length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
