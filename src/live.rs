//! Live transcription sessions with credit metering.
//!
//! One session per persistent connection. The protocol handshake delivers a
//! language code and a user id; credits are checked up front, audio is then
//! recognized chunk-by-chunk against a hard time budget, and consumed credits
//! are deducted exactly once when the session ends, no matter how it ends.
//!
//! Stages: `AwaitingLanguage -> AwaitingUserId -> CreditChecked -> Streaming
//! -> Settling -> Closed`. Every termination path (normal completion, client
//! disconnect, budget exhaustion, internal error) passes through `Settling`
//! before `Closed`; the settle-once guard makes repeated teardown triggers
//! harmless.

use crate::audio::SAMPLE_RATE;
use crate::error::{Error, Result};
use crate::ledger::CreditLedger;
use crate::recognizer::Recognizer;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Fallback when the client sends an empty language message
pub const DEFAULT_LANGUAGE: &str = "en";

/// Session lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStage {
    AwaitingLanguage,
    AwaitingUserId,
    CreditChecked,
    Streaming,
    Settling,
    Closed,
}

/// Billing parameters. Source-tuned constants, overridable.
#[derive(Debug, Clone, Copy)]
pub struct BudgetConfig {
    /// Seconds of audio one credit buys (default: 60)
    pub seconds_per_credit: f64,
    /// Remainder past which a started minute bills as a full credit (default: 40)
    pub round_up_after_secs: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            seconds_per_credit: 60.0,
            round_up_after_secs: 40.0,
        }
    }
}

/// Credits consumed by `seconds` of audio: whole minutes, plus one more when
/// the remainder exceeds the round-up cutoff.
pub fn credits_used(seconds: f64, budget: &BudgetConfig) -> u64 {
    let whole = (seconds / budget.seconds_per_credit).floor() as u64;
    let remainder = seconds % budget.seconds_per_credit;
    if remainder > budget.round_up_after_secs {
        whole + 1
    } else {
        whole
    }
}

/// One outbound segment on the live protocol
#[derive(Debug, Clone, Serialize)]
pub struct LiveSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Outbound JSON messages: `{"segments":[...]}` or `{"error":"..."}`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Segments { segments: Vec<LiveSegment> },
    Error { error: String },
}

/// Result of feeding one decoded chunk into the session
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    /// Segments that fit inside the budget, offset to the session timeline
    pub segments: Vec<LiveSegment>,
    /// True when the chunk (or a segment within it) crossed the budget; the
    /// session has moved to `Settling`
    pub budget_exceeded: bool,
}

/// What became of an inbound text protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOutcome {
    /// Consumed as a handshake message
    Handled,
    /// Arrived outside the handshake; skipped, session unaffected
    Ignored,
}

/// Outcome of the once-only settlement
#[derive(Debug, Clone, Copy)]
pub struct Settlement {
    pub credits_used: u64,
    pub credits_remaining: u64,
}

/// Per-connection live transcription session
pub struct LiveSession {
    pub id: String,
    stage: LiveStage,
    language: String,
    user_id: Option<String>,
    credits_at_start: u64,
    max_seconds: f64,
    current_time: f64,
    settled: bool,
    budget: BudgetConfig,
    ledger: Arc<dyn CreditLedger>,
    recognizer: Box<dyn Recognizer>,
}

impl LiveSession {
    pub fn new(
        ledger: Arc<dyn CreditLedger>,
        recognizer: Box<dyn Recognizer>,
        budget: BudgetConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            stage: LiveStage::AwaitingLanguage,
            language: DEFAULT_LANGUAGE.to_string(),
            user_id: None,
            credits_at_start: 0,
            max_seconds: 0.0,
            current_time: 0.0,
            settled: false,
            budget,
            ledger,
            recognizer,
        }
    }

    pub fn stage(&self) -> LiveStage {
        self.stage
    }

    /// Seconds of audio accepted so far; monotonically non-decreasing
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn max_seconds(&self) -> f64 {
        self.max_seconds
    }

    /// First handshake message. An empty string selects the default language.
    pub fn set_language(&mut self, language: &str) -> Result<()> {
        if self.stage != LiveStage::AwaitingLanguage {
            return Err(Error::Session(format!(
                "language message in stage {:?}",
                self.stage
            )));
        }
        self.language = if language.is_empty() {
            DEFAULT_LANGUAGE.to_string()
        } else {
            language.to_string()
        };
        self.stage = LiveStage::AwaitingUserId;
        Ok(())
    }

    /// Second handshake message. Performs the pre-flight credit check and
    /// computes the session's hard time budget.
    pub fn set_user(&mut self, user_id: &str) -> Result<()> {
        if self.stage != LiveStage::AwaitingUserId {
            return Err(Error::Session(format!(
                "user id message in stage {:?}",
                self.stage
            )));
        }

        let credits = self.ledger.get_credits(user_id)?;
        if credits == 0 {
            return Err(Error::CreditExhausted(format!(
                "user {} has no credits",
                user_id
            )));
        }

        self.user_id = Some(user_id.to_string());
        self.credits_at_start = credits;
        self.max_seconds = credits as f64 * self.budget.seconds_per_credit;
        self.stage = LiveStage::CreditChecked;

        eprintln!(
            "[LiveSession {}] user {} ({} credits, {:.0}s budget, language {})",
            self.id, user_id, credits, self.max_seconds, self.language
        );

        // CreditChecked -> Streaming is unconditional
        self.stage = LiveStage::Streaming;
        Ok(())
    }

    /// Route an inbound text message by stage: the first completes the
    /// language step, the second the user step. Text arriving after the
    /// handshake is not a protocol violation worth tearing the session down
    /// for; it is reported as [`TextOutcome::Ignored`].
    pub fn handle_text(&mut self, text: &str) -> Result<TextOutcome> {
        match self.stage {
            LiveStage::AwaitingLanguage => {
                self.set_language(text).map(|_| TextOutcome::Handled)
            }
            LiveStage::AwaitingUserId => self.set_user(text).map(|_| TextOutcome::Handled),
            _ => Ok(TextOutcome::Ignored),
        }
    }

    /// Feed one decoded chunk of 16 kHz mono samples.
    ///
    /// A chunk that would cross the budget is rejected without accruing time;
    /// a segment whose offset end crosses the budget truncates the batch.
    /// Either case moves the session to `Settling`. A recognition failure
    /// propagates; the caller must still route the session through
    /// [`settle`](Self::settle).
    pub fn push_chunk(&mut self, samples: &[f32]) -> Result<ChunkOutcome> {
        if self.stage != LiveStage::Streaming {
            return Err(Error::Session(format!(
                "audio chunk in stage {:?}",
                self.stage
            )));
        }

        let chunk_duration = samples.len() as f64 / SAMPLE_RATE as f64;
        if self.current_time + chunk_duration > self.max_seconds {
            self.stage = LiveStage::Settling;
            return Ok(ChunkOutcome {
                segments: Vec::new(),
                budget_exceeded: true,
            });
        }

        let output = self
            .recognizer
            .recognize(samples, SAMPLE_RATE, Some(&self.language))?;

        let mut segments: Vec<LiveSegment> = Vec::with_capacity(output.segments.len());
        for segment in output.segments {
            let start = segment.start + self.current_time;
            let end = segment.end + self.current_time;
            if end > self.max_seconds {
                // Discard this segment and the rest of the batch
                self.stage = LiveStage::Settling;
                if let Some(last) = segments.last() {
                    self.current_time = self.current_time.max(last.end);
                }
                return Ok(ChunkOutcome {
                    segments,
                    budget_exceeded: true,
                });
            }
            segments.push(LiveSegment {
                start,
                end,
                text: segment.text(),
            });
        }

        self.current_time += chunk_duration;
        Ok(ChunkOutcome {
            segments,
            budget_exceeded: false,
        })
    }

    /// Route the session toward settlement from an external trigger
    /// (client disconnect, idle timeout, internal error).
    pub fn begin_settling(&mut self) {
        if self.stage != LiveStage::Closed {
            self.stage = LiveStage::Settling;
        }
    }

    /// Deduct consumed credits. Runs at most once per session: the second and
    /// later calls return `None`, so overlapping teardown triggers cannot
    /// double-deduct. Always leaves the session `Closed`.
    pub fn settle(&mut self) -> Option<Settlement> {
        if self.settled {
            self.stage = LiveStage::Closed;
            return None;
        }
        self.settled = true;
        self.stage = LiveStage::Settling;

        let used = credits_used(self.current_time, &self.budget);
        let mut remaining = self.credits_at_start.saturating_sub(used);

        if used > 0 {
            if let Some(user_id) = &self.user_id {
                match self.ledger.decrement_credits(user_id, used) {
                    Ok(balance) => remaining = balance,
                    Err(e) => {
                        eprintln!("[LiveSession {}] settlement ledger error: {}", self.id, e);
                    }
                }
                self.ledger.record_usage(
                    user_id,
                    used,
                    &format!("Live transcription session {}", self.id),
                );
            }
        }

        eprintln!(
            "[LiveSession {}] settled: {:.1}s used, {} credits deducted, {} remaining",
            self.id, self.current_time, used, remaining
        );

        self.stage = LiveStage::Closed;
        Some(Settlement {
            credits_used: used,
            credits_remaining: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::recognizer::{RecognitionOutput, RecognizedSegment, Word};

    /// Returns one segment spanning the supplied buffer with fixed text
    struct EchoRecognizer;

    impl Recognizer for EchoRecognizer {
        fn recognize(
            &mut self,
            samples: &[f32],
            sample_rate: u32,
            _language_hint: Option<&str>,
        ) -> Result<RecognitionOutput> {
            let end = samples.len() as f64 / sample_rate as f64;
            Ok(RecognitionOutput {
                segments: vec![RecognizedSegment {
                    start: 0.0,
                    end,
                    words: vec![Word {
                        text: "hello".to_string(),
                        start: 0.0,
                        end,
                        confidence: 0.9,
                    }],
                }],
                detected_language: "en".to_string(),
                language_probability: 1.0,
            })
        }
    }

    fn session_with_credits(credits: u64) -> LiveSession {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_credits("user-1", credits);
        let mut session = LiveSession::new(ledger, Box::new(EchoRecognizer), BudgetConfig::default());
        session.set_language("en").unwrap();
        session.set_user("user-1").unwrap();
        session
    }

    #[test]
    fn test_credit_rounding() {
        let budget = BudgetConfig::default();
        assert_eq!(credits_used(95.0, &budget), 1); // remainder 35 <= 40
        assert_eq!(credits_used(101.0, &budget), 2); // remainder 41 > 40
        assert_eq!(credits_used(120.0, &budget), 2); // remainder 0
        assert_eq!(credits_used(0.0, &budget), 0);
        assert_eq!(credits_used(40.0, &budget), 0); // exactly at the cutoff
        assert_eq!(credits_used(40.5, &budget), 1);
    }

    #[test]
    fn test_empty_language_falls_back() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_credits("u", 1);
        let mut session =
            LiveSession::new(ledger, Box::new(EchoRecognizer), BudgetConfig::default());
        session.set_language("").unwrap();
        assert_eq!(session.stage(), LiveStage::AwaitingUserId);
    }

    #[test]
    fn test_unknown_user_aborts_setup() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mut session =
            LiveSession::new(ledger, Box::new(EchoRecognizer), BudgetConfig::default());
        session.set_language("en").unwrap();
        assert!(matches!(
            session.set_user("ghost"),
            Err(Error::CreditLookup(_))
        ));
    }

    #[test]
    fn test_zero_credits_rejected_preflight() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_credits("broke", 0);
        let mut session =
            LiveSession::new(ledger, Box::new(EchoRecognizer), BudgetConfig::default());
        session.set_language("en").unwrap();
        assert!(matches!(
            session.set_user("broke"),
            Err(Error::CreditExhausted(_))
        ));
    }

    #[test]
    fn test_chunk_accrues_time_and_offsets_segments() {
        let mut session = session_with_credits(10);
        let chunk = vec![0.0f32; SAMPLE_RATE as usize * 5];

        let first = session.push_chunk(&chunk).unwrap();
        assert!(!first.budget_exceeded);
        assert_eq!(first.segments[0].start, 0.0);
        assert_eq!(session.current_time(), 5.0);

        let second = session.push_chunk(&chunk).unwrap();
        assert_eq!(second.segments[0].start, 5.0);
        assert_eq!(second.segments[0].end, 10.0);
        assert_eq!(session.current_time(), 10.0);
    }

    #[test]
    fn test_oversized_chunk_rejected_without_accrual() {
        // 1 credit -> 60s budget; a 70s chunk must bounce
        let mut session = session_with_credits(1);
        let chunk = vec![0.0f32; SAMPLE_RATE as usize * 70];
        let outcome = session.push_chunk(&chunk).unwrap();
        assert!(outcome.budget_exceeded);
        assert!(outcome.segments.is_empty());
        assert_eq!(session.current_time(), 0.0);
        assert_eq!(session.stage(), LiveStage::Settling);
    }

    #[test]
    fn test_segment_overshooting_budget_truncates_batch() {
        // Recognizer reports timestamps past the end of the buffer it was
        // given, so the chunk passes the duration pre-check but the second
        // segment's offset end lands beyond the budget
        struct Overshoot;
        impl Recognizer for Overshoot {
            fn recognize(
                &mut self,
                _samples: &[f32],
                _sample_rate: u32,
                _language_hint: Option<&str>,
            ) -> Result<RecognitionOutput> {
                let seg = |start: f64, end: f64, text: &str| RecognizedSegment {
                    start,
                    end,
                    words: vec![Word {
                        text: text.to_string(),
                        start,
                        end,
                        confidence: 0.9,
                    }],
                };
                Ok(RecognitionOutput {
                    segments: vec![seg(0.0, 30.0, "within"), seg(35.0, 65.0, "beyond")],
                    detected_language: "en".to_string(),
                    language_probability: 1.0,
                })
            }
        }

        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_credits("user-1", 1); // 60s budget
        let mut session =
            LiveSession::new(ledger, Box::new(Overshoot), BudgetConfig::default());
        session.set_language("en").unwrap();
        session.set_user("user-1").unwrap();

        // 50s chunk passes the pre-check (50 <= 60)
        let chunk = vec![0.0f32; SAMPLE_RATE as usize * 50];
        let outcome = session.push_chunk(&chunk).unwrap();

        // The fitting prefix is emitted, the overshooting segment dropped
        assert!(outcome.budget_exceeded);
        assert_eq!(outcome.segments.len(), 1);
        assert_eq!(outcome.segments[0].text, "within");
        assert_eq!(outcome.segments[0].end, 30.0);
        assert_eq!(session.stage(), LiveStage::Settling);
        // Time advances to the last emitted end, not the chunk duration
        assert_eq!(session.current_time(), 30.0);
    }

    #[test]
    fn test_text_after_handshake_is_ignored() {
        let mut session = session_with_credits(2);
        assert_eq!(session.stage(), LiveStage::Streaming);
        assert_eq!(session.handle_text("en").unwrap(), TextOutcome::Ignored);
        assert_eq!(session.stage(), LiveStage::Streaming);

        // The session keeps streaming normally afterwards
        let chunk = vec![0.0f32; SAMPLE_RATE as usize * 5];
        let outcome = session.push_chunk(&chunk).unwrap();
        assert!(!outcome.budget_exceeded);
    }

    #[test]
    fn test_handle_text_routes_handshake_in_order() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_credits("user-1", 1);
        let mut session =
            LiveSession::new(ledger, Box::new(EchoRecognizer), BudgetConfig::default());
        assert_eq!(session.handle_text("fr").unwrap(), TextOutcome::Handled);
        assert_eq!(session.stage(), LiveStage::AwaitingUserId);
        assert_eq!(session.handle_text("user-1").unwrap(), TextOutcome::Handled);
        assert_eq!(session.stage(), LiveStage::Streaming);
    }

    #[test]
    fn test_chunk_after_settling_is_a_session_error() {
        let mut session = session_with_credits(1);
        session.begin_settling();
        let chunk = vec![0.0f32; SAMPLE_RATE as usize];
        assert!(matches!(
            session.push_chunk(&chunk),
            Err(Error::Session(_))
        ));
    }

    #[test]
    fn test_settlement_deducts_once() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_credits("user-1", 10);
        let mut session = LiveSession::new(
            Arc::clone(&ledger) as Arc<dyn CreditLedger>,
            Box::new(EchoRecognizer),
            BudgetConfig::default(),
        );
        session.set_language("en").unwrap();
        session.set_user("user-1").unwrap();

        // 95 seconds of audio -> 1 credit (remainder 35)
        let chunk = vec![0.0f32; SAMPLE_RATE as usize * 95];
        // budget is 600s so this fits
        session.push_chunk(&chunk).unwrap();

        let settlement = session.settle().unwrap();
        assert_eq!(settlement.credits_used, 1);
        assert_eq!(settlement.credits_remaining, 9);
        assert_eq!(ledger.get_credits("user-1").unwrap(), 9);

        // Second settle (error after disconnect) is a no-op
        assert!(session.settle().is_none());
        assert_eq!(ledger.get_credits("user-1").unwrap(), 9);
        assert_eq!(session.stage(), LiveStage::Closed);

        let log = ledger.usage_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].minutes, 1);
    }

    #[test]
    fn test_settlement_without_usage_deducts_nothing() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_credits("user-1", 5);
        let mut session = LiveSession::new(
            Arc::clone(&ledger) as Arc<dyn CreditLedger>,
            Box::new(EchoRecognizer),
            BudgetConfig::default(),
        );
        session.set_language("en").unwrap();
        session.set_user("user-1").unwrap();

        let settlement = session.settle().unwrap();
        assert_eq!(settlement.credits_used, 0);
        assert_eq!(ledger.get_credits("user-1").unwrap(), 5);
        assert!(ledger.usage_log().is_empty());
    }

    #[test]
    fn test_outbound_message_shapes() {
        let msg = OutboundMessage::Segments {
            segments: vec![LiveSegment {
                start: 0.0,
                end: 1.0,
                text: "hi".to_string(),
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, "{\"segments\":[{\"start\":0.0,\"end\":1.0,\"text\":\"hi\"}]}");

        let err = OutboundMessage::Error {
            error: "Could not decode audio.".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            "{\"error\":\"Could not decode audio.\"}"
        );
    }
}
