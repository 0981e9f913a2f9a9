//! HTTP client for a remote recognition service.
//!
//! The model runs out of process; audio is shipped as base64-encoded f32le
//! samples over a JSON POST. The client is blocking so it can be driven from
//! worker threads without an async runtime of its own.

use crate::error::{Error, Result};
use crate::recognizer::{RecognitionOutput, Recognizer};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body for the recognition service
#[derive(Debug, Serialize)]
struct RecognizeRequest {
    /// Base64-encoded f32le mono samples
    audio_b64: String,
    sample_rate: u32,
    /// Language code, None for auto-detect
    language: Option<String>,
}

/// Response body from the recognition service, mirroring [`RecognitionOutput`]
#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    segments: Vec<crate::recognizer::RecognizedSegment>,
    detected_language: String,
    language_probability: f64,
}

/// Blocking HTTP recognition adapter
pub struct AsrHttpRecognizer {
    client: reqwest::blocking::Client,
    service_url: String,
}

impl AsrHttpRecognizer {
    /// Connect to a recognition service and verify it is reachable.
    ///
    /// Returns [`Error::ModelUnavailable`] if the health check fails, so a
    /// dead backend is caught before any audio is accepted.
    pub fn new(service_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::ModelUnavailable(e.to_string()))?;

        let health_url = format!("{}/health", service_url);
        match client.get(&health_url).send() {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                return Err(Error::ModelUnavailable(format!(
                    "recognition service health check returned {}",
                    resp.status()
                )))
            }
            Err(e) => {
                return Err(Error::ModelUnavailable(format!(
                    "recognition service unreachable: {}",
                    e
                )))
            }
        }

        Ok(Self {
            client,
            service_url: service_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Recognizer for AsrHttpRecognizer {
    fn recognize(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        language_hint: Option<&str>,
    ) -> Result<RecognitionOutput> {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        let request = RecognizeRequest {
            audio_b64: BASE64.encode(&bytes),
            sample_rate,
            language: language_hint.map(|l| l.to_string()),
        };

        let url = format!("{}/recognize", self.service_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| Error::Recognition(format!("recognition request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::Recognition(format!(
                "recognition service returned {}: {}",
                status, body
            )));
        }

        let parsed: RecognizeResponse = response
            .json()
            .map_err(|e| Error::Recognition(format!("bad recognition response: {}", e)))?;

        Ok(RecognitionOutput {
            segments: parsed.segments,
            detected_language: parsed.detected_language,
            language_probability: parsed.language_probability,
        })
    }
}
