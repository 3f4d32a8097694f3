//! WebSocket front end: one text frame per inbound call, PCM back as binary frames.

use std::time::Instant;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};
use tts_core::{AudioSink, PcmFormat, SinkStatus, TtsError, TtsResult};

use crate::routes::SpeakRequest;
use crate::validation::validate_speak_request;
use crate::AppState;

/// Audio sink writing to the sending half of a WebSocket.
pub struct WsSink {
    sender: SplitSink<WebSocket, Message>,
    max_chunk: usize,
    closed: bool,
}

impl WsSink {
    pub fn new(sender: SplitSink<WebSocket, Message>, max_chunk: usize) -> Self {
        Self {
            sender,
            max_chunk,
            closed: false,
        }
    }

    async fn send_json(&mut self, value: serde_json::Value) -> TtsResult<()> {
        if self.closed {
            return Err(TtsError::Sink("socket closed".into()));
        }
        self.sender
            .send(Message::Text(value.to_string().into()))
            .await
            .map_err(|e| {
                self.closed = true;
                TtsError::Sink(e.to_string())
            })
    }
}

#[async_trait]
impl AudioSink for WsSink {
    async fn start(&mut self, format: PcmFormat) -> TtsResult<()> {
        self.send_json(json!({
            "type": "start",
            "sampleRate": format.sample_rate,
            "bitDepth": format.bit_depth,
            "channels": format.channels,
        }))
        .await
    }

    fn max_buffer_size(&self) -> usize {
        self.max_chunk
    }

    async fn write(&mut self, chunk: &[u8]) -> TtsResult<SinkStatus> {
        if self.closed {
            return Ok(SinkStatus::Stopped);
        }
        match self.sender.send(Message::Binary(chunk.to_vec().into())).await {
            Ok(()) => Ok(SinkStatus::Accepted),
            Err(e) => {
                self.closed = true;
                Err(TtsError::Sink(e.to_string()))
            }
        }
    }

    async fn done(&mut self) -> TtsResult<()> {
        self.send_json(json!({ "type": "done" })).await
    }

    async fn error(&mut self) -> TtsResult<()> {
        self.send_json(json!({ "type": "error" })).await
    }
}

pub async fn speak_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let mut sink = WsSink::new(sender, state.config.sink_chunk_bytes);
    info!("Speech WebSocket connected");

    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "WebSocket receive failed");
                break;
            }
        };

        let request: SpeakRequest = match serde_json::from_str(text.as_str()) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed speak frame");
                let reply = json!({ "type": "error", "error": format!("Invalid request: {e}"), "code": 400 });
                if sink.send_json(reply).await.is_err() {
                    break;
                }
                continue;
            }
        };
        if let Err(e) = validate_speak_request(&request.text) {
            let reply = json!({ "type": "error", "error": e.to_string(), "code": 400 });
            if sink.send_json(reply).await.is_err() {
                break;
            }
            continue;
        }

        state.request_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let started = Instant::now();
        let report = state
            .coordinator
            .handle(&request.text, request.caller_uid, &mut sink)
            .await;
        state
            .metrics
            .record(&report, started.elapsed().as_millis() as u64);

        if sink.closed {
            break;
        }
    }
    info!("Speech WebSocket closed");
}
