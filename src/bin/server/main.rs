/*
Live Transcription WebSocket Server with Credit Metering

Uses axum (tokio team's web framework) for the WebSocket endpoint. Each
connection runs the handshake (language, then user id), checks the user's
credit balance, and streams recognition results back as JSON while a hard
time budget is enforced. Consumed credits are deducted exactly once when
the session ends, whichever way it ends.

Recognition is delegated to an external ASR HTTP service; audio frames
arrive as compressed containers (webm/ogg) and are decoded to 16 kHz mono
f32 PCM through an ffmpeg subprocess per frame.

Usage:
  subcap-server --asr-url http://localhost:9000 --credits-file accounts.json

  # Accept raw little-endian f32 PCM frames instead of containers
  subcap-server --asr-url http://localhost:9000 --credits-file accounts.json --raw-f32

WebSocket Protocol (/ws/transcribe):
  Client -> Server, in order:
    - text: language code ("" selects the default)
    - text: user id
    - binary: audio frames
  Server -> Client (JSON):
    - {"segments":[{"start":1.0,"end":2.0,"text":"..."}]}
    - {"error":"..."}
  The server closes the connection after settlement.
*/

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use subcap_rs::{
    f32le_to_samples, AsrHttpRecognizer, BudgetConfig, CreditLedger, InMemoryLedger, LiveSession,
    OutboundMessage, Recognizer, TextOutcome,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

#[derive(Parser)]
#[command(name = "subcap-server")]
#[command(about = "WebSocket server for credit-metered live transcription")]
struct Args {
    /// HTTP/WebSocket server port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Base URL of the ASR HTTP service
    #[arg(long, default_value = "http://localhost:9000")]
    asr_url: String,

    /// Per-request timeout for the ASR service (seconds)
    #[arg(long, default_value = "120")]
    asr_timeout_secs: u64,

    /// JSON file mapping user id -> credit balance
    #[arg(long)]
    credits_file: Option<PathBuf>,

    /// Close a session after this many seconds without an audio frame
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Seconds of audio one credit buys
    #[arg(long, default_value = "60")]
    seconds_per_credit: f64,

    /// Accept raw f32le PCM frames instead of decoding containers via ffmpeg
    #[arg(long)]
    raw_f32: bool,
}

/// Shared application state
struct AppState {
    ledger: Arc<dyn CreditLedger>,
    asr_url: String,
    asr_timeout_secs: u64,
    budget: BudgetConfig,
    idle_timeout: Duration,
    raw_f32: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let ledger: Arc<dyn CreditLedger> = match &args.credits_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let accounts: HashMap<String, u64> = serde_json::from_str(&content)?;
            eprintln!("[Server] Loaded {} accounts from {}", accounts.len(), path.display());
            Arc::new(InMemoryLedger::with_accounts(accounts))
        }
        None => {
            eprintln!("[Server] No credits file given, starting with an empty ledger");
            Arc::new(InMemoryLedger::new())
        }
    };

    let budget = BudgetConfig {
        seconds_per_credit: args.seconds_per_credit,
        ..BudgetConfig::default()
    };

    let state = Arc::new(AppState {
        ledger,
        asr_url: args.asr_url.clone(),
        asr_timeout_secs: args.asr_timeout_secs,
        budget,
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        raw_f32: args.raw_f32,
    });

    let app = Router::new()
        .route("/ws/transcribe", get(ws_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    eprintln!("[Server] Listening on http://{}", addr);
    eprintln!("[Server] WebSocket endpoint: ws://{}/ws/transcribe", addr);
    eprintln!("[Server] ASR service: {}", args.asr_url);
    eprintln!();

    axum::serve(listener, app).await?;

    Ok(())
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Command sent from the socket task to the session worker thread
enum WorkerCmd {
    /// Handshake text message; routed by session stage
    Text(String),
    /// Decoded 16 kHz mono samples
    Audio(Vec<f32>),
    /// Disconnect or idle timeout
    Close,
}

/// Handle one WebSocket connection: decode frames on the async side, run the
/// session (with its blocking recognizer) on a dedicated worker thread.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    eprintln!("[WebSocket] Client connected");

    let (mut sender, mut receiver) = socket.split();

    let recognizer: Box<dyn Recognizer> =
        match AsrHttpRecognizer::new(&state.asr_url, state.asr_timeout_secs) {
            Ok(r) => Box::new(r),
            Err(e) => {
                eprintln!("[WebSocket] Recognizer unavailable: {}", e);
                let msg = OutboundMessage::Error {
                    error: "Recognition service unavailable.".to_string(),
                };
                if let Ok(json) = serde_json::to_string(&msg) {
                    sender.send(Message::Text(json)).await.ok();
                }
                sender.send(Message::Close(None)).await.ok();
                return;
            }
        };

    let session = LiveSession::new(Arc::clone(&state.ledger), recognizer, state.budget);
    let session_id = session.id.clone();

    let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCmd>(32);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let worker_out = out_tx.clone();
    let worker = std::thread::spawn(move || run_session(session, cmd_rx, worker_out));

    // Forward worker output to the client
    let forward = tokio::spawn(async move {
        while let Some(json) = out_rx.recv().await {
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        sender.send(Message::Close(None)).await.ok();
    });

    loop {
        let msg = match tokio::time::timeout(state.idle_timeout, receiver.next()).await {
            Ok(msg) => msg,
            Err(_) => {
                eprintln!("[Session {}] Idle timeout", session_id);
                cmd_tx.send(WorkerCmd::Close).await.ok();
                break;
            }
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                if cmd_tx.send(WorkerCmd::Text(text)).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Binary(frame))) => {
                let samples = if state.raw_f32 {
                    f32le_to_samples(&frame).ok()
                } else {
                    decode_frame(&frame).await
                };
                match samples {
                    Some(samples) => {
                        if cmd_tx.send(WorkerCmd::Audio(samples)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Recoverable: report and keep the session open
                        let msg = OutboundMessage::Error {
                            error: "Could not decode audio.".to_string(),
                        };
                        if let Ok(json) = serde_json::to_string(&msg) {
                            out_tx.send(json).ok();
                        }
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                cmd_tx.send(WorkerCmd::Close).await.ok();
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                eprintln!("[Session {}] Socket error: {}", session_id, e);
                cmd_tx.send(WorkerCmd::Close).await.ok();
                break;
            }
        }
    }

    drop(cmd_tx);
    drop(out_tx);

    if let Err(e) = tokio::task::spawn_blocking(move || worker.join()).await {
        eprintln!("[Session {}] Worker join error: {:?}", session_id, e);
    }
    forward.await.ok();

    eprintln!("[WebSocket] Client disconnected");
}

/// Session worker: owns the state machine and the blocking recognizer.
/// Every exit path settles before returning.
fn run_session(
    mut session: LiveSession,
    mut cmd_rx: mpsc::Receiver<WorkerCmd>,
    out_tx: mpsc::UnboundedSender<String>,
) {
    let send = |msg: &OutboundMessage| {
        if let Ok(json) = serde_json::to_string(msg) {
            out_tx.send(json).ok();
        }
    };

    while let Some(cmd) = cmd_rx.blocking_recv() {
        match cmd {
            WorkerCmd::Text(text) => match session.handle_text(&text) {
                Ok(TextOutcome::Handled) => {}
                Ok(TextOutcome::Ignored) => {
                    eprintln!("[Session {}] Ignoring text frame outside handshake", session.id);
                }
                Err(e) => {
                    send(&OutboundMessage::Error {
                        error: e.to_string(),
                    });
                    break;
                }
            },
            WorkerCmd::Audio(samples) => match session.push_chunk(&samples) {
                Ok(outcome) => {
                    if !outcome.segments.is_empty() {
                        send(&OutboundMessage::Segments {
                            segments: outcome.segments,
                        });
                    }
                    if outcome.budget_exceeded {
                        send(&OutboundMessage::Error {
                            error: "Transcription budget exhausted.".to_string(),
                        });
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("[Session {}] Recognition error: {}", session.id, e);
                    send(&OutboundMessage::Error {
                        error: "Transcription failed.".to_string(),
                    });
                    break;
                }
            },
            WorkerCmd::Close => break,
        }
    }

    session.begin_settling();
    session.settle();
}

/// Decode one compressed audio frame to 16 kHz mono f32 samples via ffmpeg.
/// Returns `None` on any decode failure.
async fn decode_frame(frame: &[u8]) -> Option<Vec<f32>> {
    let mut child = tokio::process::Command::new("ffmpeg")
        .args([
            "-i", "pipe:0", "-f", "f32le", "-acodec", "pcm_f32le", "-ac", "1", "-ar", "16000",
            "pipe:1",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let mut stdin = child.stdin.take()?;
    stdin.write_all(frame).await.ok()?;
    drop(stdin);

    let output = child.wait_with_output().await.ok()?;
    if !output.status.success() || output.stdout.is_empty() {
        return None;
    }
    f32le_to_samples(&output.stdout).ok()
}
