use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use translator_core::{transcript::WordConfidence, Result as CoreResult, SpeechToText, TranscriptHypothesis};

use crate::error::{Result, TransportError};
use crate::pending::PendingRegistry;
use crate::session::SessionIdGenerator;
use crate::state::ConnectionState;
use crate::wire::{SttRequestHeader, SttResponseWire};

const TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

struct Inner {
    url: String,
    state: Mutex<ConnectionState>,
    writer: AsyncMutex<Option<WsWriter>>,
    pending: PendingRegistry<Result<SttResponseWire>>,
    sessions: SessionIdGenerator,
}

/// WebSocket client for the streaming STT backend (§4.1, §6).
#[derive(Clone)]
pub struct SttClient(Arc<Inner>);

impl SttClient {
    pub fn new(url: impl Into<String>) -> Self {
        SttClient(Arc::new(Inner {
            url: url.into(),
            state: Mutex::new(ConnectionState::Disconnected),
            writer: AsyncMutex::new(None),
            pending: PendingRegistry::new(),
            sessions: SessionIdGenerator::new("stt"),
        }))
    }

    pub fn state(&self) -> ConnectionState {
        *self.0.state.lock()
    }

    /// Eagerly opens the connection (§4.7 parallel-connect-all-transports
    /// startup); `transcribe` would do this lazily on first call regardless.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_connected().await
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        let mut writer_guard = self.0.writer.lock().await;
        if writer_guard.is_some() {
            return Ok(());
        }
        *self.0.state.lock() = ConnectionState::Connecting;
        let (ws_stream, _) = connect_async(&self.0.url).await.map_err(|e| {
            *self.0.state.lock() = ConnectionState::Disconnected;
            TransportError::WebSocket(e)
        })?;
        let (write, read) = ws_stream.split();
        *writer_guard = Some(write);
        *self.0.state.lock() = ConnectionState::Connected;
        drop(writer_guard);

        let inner = self.0.clone();
        tokio::spawn(async move { Self::read_loop(inner, read).await });
        Ok(())
    }

    async fn read_loop(inner: Arc<Inner>, mut read: SplitStream<WsStream>) {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<SttResponseWire>(&text) {
                    Ok(response) => {
                        let Some(session_id) = response.session_id.clone() else {
                            tracing::warn!("STT response missing session_id, dropping");
                            continue;
                        };
                        if !inner.pending.dispatch(&session_id, Ok(response)) {
                            tracing::warn!(session_id, "STT response for unknown session, dropping");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to parse STT response"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "STT websocket read error");
                    break;
                }
            }
        }

        *inner.state.lock() = ConnectionState::Draining;
        *inner.writer.lock().await = None;
        inner.pending.fail_all(|| Err(TransportError::Disconnected));
        *inner.state.lock() = ConnectionState::Disconnected;
    }

    pub async fn transcribe(&self, audio: &[i16], sample_rate: u32, language_hint: &str) -> Result<TranscriptHypothesis> {
        self.ensure_connected().await?;

        let session_id = self.0.sessions.next();
        let mut rx = self.0.pending.register(session_id.clone());

        let header = SttRequestHeader { session_id: &session_id, sample_rate, language_hint };
        let header_json = serde_json::to_vec(&header)?;
        let mut frame = Vec::with_capacity(4 + header_json.len() + audio.len() * 2);
        frame.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
        frame.extend_from_slice(&header_json);
        for sample in audio {
            frame.extend_from_slice(&sample.to_le_bytes());
        }

        {
            let mut writer_guard = self.0.writer.lock().await;
            let Some(writer) = writer_guard.as_mut() else {
                self.0.pending.remove(&session_id);
                return Err(TransportError::NotConnected("stt"));
            };
            if let Err(e) = writer.send(Message::Binary(frame)).await {
                self.0.pending.remove(&session_id);
                return Err(TransportError::WebSocket(e));
            }
        }

        let response = tokio::time::timeout(TIMEOUT, rx.recv()).await;
        self.0.pending.remove(&session_id);
        match response {
            Ok(Some(Ok(wire))) => Ok(wire_to_hypothesis(wire)),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Err(TransportError::ChannelClosed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

fn wire_to_hypothesis(wire: SttResponseWire) -> TranscriptHypothesis {
    TranscriptHypothesis {
        text: wire.text,
        confidence: wire.confidence,
        language: wire.language,
        is_final: wire.is_final,
        timestamp: wire.timestamp,
        processing_time_ms: wire.processing_time_ms,
        words: wire
            .words
            .into_iter()
            .map(|w| WordConfidence { text: w.text, start: w.start, end: w.end, conf: w.confidence })
            .collect(),
    }
}

#[async_trait]
impl SpeechToText for SttClient {
    async fn transcribe(&self, audio: &[i16], sample_rate: u32, language_hint: &str) -> CoreResult<TranscriptHypothesis> {
        SttClient::transcribe(self, audio, sample_rate, language_hint).await.map_err(Into::into)
    }
}
