use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures::stream::BoxStream;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use translator_core::synthesis::i16_bytes_to_f32;
use translator_core::{PcmChunk, Result as CoreResult, SynthesisResult, TextToSpeech};

use crate::error::{Result, TransportError};
use crate::pending::PendingRegistry;
use crate::session::SessionIdGenerator;
use crate::state::ConnectionState;
use crate::wire::{TtsRequestWire, TtsResponseWire};

const TIMEOUT: Duration = Duration::from_secs(15);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

struct Inner {
    url: String,
    state: Mutex<ConnectionState>,
    writer: AsyncMutex<Option<WsWriter>>,
    pending: PendingRegistry<Result<TtsResponseWire>>,
    sessions: SessionIdGenerator,
}

/// WebSocket client for the streaming TTS backend (§4.1, §6).
///
/// Unlike STT/MT, one request fans into a stream of responses: zero or more
/// chunks carrying nonzero PCM, followed by exactly one final marker. Each
/// wire message becomes one [`SynthesisResult`] with a single chunk, so the
/// pipeline can publish audio as it arrives instead of waiting for the whole
/// utterance (§4.5's early-frame emission).
#[derive(Clone)]
pub struct TtsClient(Arc<Inner>);

impl TtsClient {
    pub fn new(url: impl Into<String>) -> Self {
        TtsClient(Arc::new(Inner {
            url: url.into(),
            state: Mutex::new(ConnectionState::Disconnected),
            writer: AsyncMutex::new(None),
            pending: PendingRegistry::new(),
            sessions: SessionIdGenerator::new("tts"),
        }))
    }

    pub fn state(&self) -> ConnectionState {
        *self.0.state.lock()
    }

    /// Eagerly opens the connection (§4.7 parallel-connect-all-transports
    /// startup); `synthesize` would do this lazily on first call regardless.
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
                Ok(Message::Text(text)) => match serde_json::from_str::<TtsResponseWire>(&text) {
                    Ok(response) => {
                        let Some(session_id) = response.session_id.clone() else {
                            tracing::warn!("TTS response missing session_id, dropping");
                            continue;
                        };
                        let is_final = response.is_final;
                        if !inner.pending.dispatch(&session_id, Ok(response)) {
                            tracing::warn!(session_id, "TTS response for unknown session, dropping");
                        }
                        if is_final {
                            inner.pending.remove(&session_id);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to parse TTS response"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "TTS websocket read error");
                    break;
                }
            }
        }

        *inner.state.lock() = ConnectionState::Draining;
        *inner.writer.lock().await = None;
        inner.pending.fail_all(|| Err(TransportError::Disconnected));
        *inner.state.lock() = ConnectionState::Disconnected;
    }

    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        language: &str,
        speed: f32,
    ) -> Result<BoxStream<'static, Result<SynthesisResult>>> {
        self.ensure_connected().await?;

        let session_id = self.0.sessions.next();
        let rx = self.0.pending.register(session_id.clone());

        let request = TtsRequestWire { session_id: &session_id, text, voice_id, language, stream: true, speed };
        let payload = serde_json::to_string(&request)?;

        {
            let mut writer_guard = self.0.writer.lock().await;
            let Some(writer) = writer_guard.as_mut() else {
                self.0.pending.remove(&session_id);
                return Err(TransportError::NotConnected("tts"));
            };
            if let Err(e) = writer.send(Message::Text(payload.into())).await {
                self.0.pending.remove(&session_id);
                return Err(TransportError::WebSocket(e));
            }
        }

        let deadline = tokio::time::Instant::now() + TIMEOUT;
        let stream = async_stream::stream! {
            let mut rx = rx;
            loop {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(item)) => yield item.map(wire_to_synthesis_result),
                    Ok(None) => break,
                    Err(_) => {
                        yield Err(TransportError::Timeout);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn wire_to_synthesis_result(wire: TtsResponseWire) -> SynthesisResult {
    let samples = wire.audio_chunk.as_deref().map(decode_audio_chunk).unwrap_or_default();
    SynthesisResult {
        voice_id: wire.voice_id,
        language: wire.language,
        processing_time_ms: wire.processing_time_ms,
        ttft_ms: wire.ttft_ms,
        chunks: vec![PcmChunk { samples, sample_rate: wire.sample_rate, is_final: wire.is_final }],
    }
}

fn decode_audio_chunk(b64: &str) -> Vec<f32> {
    match BASE64.decode(b64) {
        Ok(bytes) => i16_bytes_to_f32(&bytes),
        Err(e) => {
            tracing::warn!(error = %e, "failed to base64-decode TTS audio chunk");
            Vec::new()
        }
    }
}

#[async_trait]
impl TextToSpeech for TtsClient {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        language: &str,
        speed: f32,
    ) -> CoreResult<BoxStream<'static, CoreResult<SynthesisResult>>> {
        let stream = TtsClient::synthesize(self, text, voice_id, language, speed).await.map_err(Into::<translator_core::Error>::into)?;
        Ok(Box::pin(stream.map(|item| item.map_err(Into::into))))
    }
}
