//! Per-speaker pipeline orchestration (§4.4): buffer -> gate -> transcribe ->
//! stabilize -> update context -> fan-out -> per-target MT+TTS+publish ->
//! close trace. Grounded on `original_source/backend/agents/translator_worker.py`'s
//! `process_audio_buffer`/`translate_text` for the step order and on the
//! spec's ordering/cancellation rules (§5) for everything Python's
//! single-process asyncio loop didn't have to worry about.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use translator_config::Settings;
use translator_core::{
    AudioChunk, MachineTranslator, Result as CoreResult, RoomAdapter, SpeakerId, SpeechToText, TextToSpeech,
};
use translator_tracer::{TraceGuard, Tracer};

use crate::context::ContextWindow;
use crate::stabilizer::Stabilizer;

const STT_SOFT_TIMEOUT: Duration = Duration::from_secs(5);
const MT_SOFT_TIMEOUT: Duration = Duration::from_secs(2);
const TTS_SOFT_TIMEOUT: Duration = Duration::from_secs(5);

/// One PCM chunk destined for a target-language output track, reserved in
/// commit order before its owning MT/TTS call has even started (§4.4
/// "Tie-breaks and ordering").
struct PublishPayload {
    target_language: String,
    frames: Vec<(Vec<f32>, u32)>,
    caption: CaptionPayload,
}

#[derive(Debug, serde::Serialize)]
struct CaptionPayload {
    #[serde(rename = "type")]
    kind: &'static str,
    original_text: String,
    translated_text: String,
    source_language: String,
    target_language: String,
    confidence: f32,
    latency_ms: f64,
    timestamp: String,
    chunk_id: String,
}

pub struct SpeakerPipeline {
    speaker: SpeakerId,
    settings: Arc<Settings>,
    stt: Arc<dyn SpeechToText>,
    mt: Arc<dyn MachineTranslator>,
    tts: Arc<dyn TextToSpeech>,
    room: Arc<dyn RoomAdapter>,
    tracer: Arc<Tracer>,
    cancel: CancellationToken,

    context: Mutex<ContextWindow>,
    stabilizer: Mutex<Stabilizer>,
    /// One serial publish queue per target language, lazily created. Each
    /// queue carries reservation tokens (oneshot receivers) in commit order;
    /// a dedicated task per target drains them and publishes in that order
    /// even when the underlying MT/TTS calls resolve out of order.
    publishers: Mutex<std::collections::HashMap<String, mpsc::Sender<oneshot::Receiver<PublishPayload>>>>,
}

impl SpeakerPipeline {
    pub fn new(
        speaker: SpeakerId,
        settings: Arc<Settings>,
        stt: Arc<dyn SpeechToText>,
        mt: Arc<dyn MachineTranslator>,
        tts: Arc<dyn TextToSpeech>,
        room: Arc<dyn RoomAdapter>,
        tracer: Arc<Tracer>,
    ) -> Arc<Self> {
        let context_token_cap = settings.context_token_cap;
        Arc::new(SpeakerPipeline {
            speaker,
            settings,
            stt,
            mt,
            tts,
            room,
            tracer,
            cancel: CancellationToken::new(),
            context: Mutex::new(ContextWindow::new(context_token_cap)),
            stabilizer: Mutex::new(Stabilizer::new()),
            publishers: Mutex::new(std::collections::HashMap::new()),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current word retraction rate for this speaker's in-flight utterance
    /// window (§4.3 Metric), surfaced for the worker's `/metrics` gauge.
    pub fn retraction_rate(&self) -> f64 {
        self.stabilizer.lock().retraction_rate()
    }

    /// Spawn the pipeline's task: drains `audio_rx` in ingress order (§5),
    /// gating on `chunk_duration_ms` before each `process_window` call.
    /// `process_window` runs to completion (including every fan-out branch)
    /// before the next chunk is gated, which is what gives per-speaker FIFO
    /// ordering for free.
    pub fn spawn(self: Arc<Self>, mut audio_rx: mpsc::Receiver<AudioChunk>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffered: Vec<AudioChunk> = Vec::new();
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        break;
                    }
                    chunk = audio_rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        buffered.push(chunk);
                        let total_ms: u64 = buffered.iter().map(|c| c.duration_ms()).sum();
                        if total_ms < self.settings.chunk_duration_ms {
                            continue;
                        }
                        let window = std::mem::take(&mut buffered);
                        self.process_window(window).await;
                    }
                }
            }
        })
    }

    async fn process_window(self: &Arc<Self>, window: Vec<AudioChunk>) {
        if self.cancel.is_cancelled() || window.is_empty() {
            return;
        }

        let samples: Vec<i16> = window.iter().flat_map(|c| c.samples.iter().copied()).collect();
        let sample_rate = window[0].sample_rate;
        let trace_id = format!("translation_{}_{}", self.speaker.0, now_ms());
        let guard = TraceGuard::start(self.tracer.clone(), Some(trace_id.clone()));

        let stt_start = Instant::now();
        let hypothesis = match with_soft_timeout(&trace_id, "stt_processing", STT_SOFT_TIMEOUT, self.stt.transcribe(&samples, sample_rate, "auto")).await {
            Ok(h) => h,
            Err(err) => {
                guard.add_span("stt_processing", stt_start, stt_start.elapsed());
                guard.add_error(err.to_string());
                if self.cancel.is_cancelled() {
                    guard.cancel();
                } else {
                    guard.complete();
                }
                return;
            }
        };
        guard.add_span("stt_processing", stt_start, stt_start.elapsed());

        if hypothesis.is_empty() {
            guard.complete();
            return;
        }

        let stt_first_token_start = Instant::now();
        let outcome = self.stabilizer.lock().push(&hypothesis);
        if outcome.committed.is_empty() {
            guard.add_span("stt_first_token", stt_first_token_start, stt_first_token_start.elapsed());
            guard.complete();
            return;
        }
        guard.add_span("stt_first_token", stt_first_token_start, stt_first_token_start.elapsed());

        let delta_text = outcome.committed.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
        for sentence in segment_sentences(&delta_text) {
            self.context.lock().push(sentence);
        }
        let context_snapshot = self.context.lock().snapshot();
        let source_language = hypothesis.language.clone();

        let mut target_languages: Vec<String> =
            self.settings.voice_map.keys().filter(|lang| lang.as_str() != source_language).cloned().collect();
        target_languages.sort();

        if target_languages.is_empty() {
            if self.cancel.is_cancelled() {
                guard.cancel();
            } else {
                guard.complete();
            }
            return;
        }

        let mut fanouts = Vec::with_capacity(target_languages.len());
        for target in target_languages {
            let reservation = self.reserve_publish_slot(&target).await;
            let pipeline = self.clone();
            let trace_id = trace_id.clone();
            let delta_text = delta_text.clone();
            let source_language = source_language.clone();
            let context_snapshot = context_snapshot.clone();
            fanouts.push(tokio::spawn(async move {
                pipeline.translate_and_synthesize(trace_id, target, delta_text, source_language, context_snapshot, reservation).await;
            }));
        }

        for handle in fanouts {
            let _ = handle.await;
        }

        if self.cancel.is_cancelled() {
            guard.cancel();
        } else {
            guard.complete();
        }
    }

    /// Reserve a publish slot for `target` *before* the fan-out task that
    /// will fill it runs, guaranteeing the per-target queue sees reservations
    /// in commit order even though the tasks filling them may resolve out of
    /// order (§4.4 "Tie-breaks and ordering").
    async fn reserve_publish_slot(self: &Arc<Self>, target: &str) -> oneshot::Sender<PublishPayload> {
        let sender = {
            let mut publishers = self.publishers.lock();
            publishers.entry(target.to_string()).or_insert_with(|| self.spawn_publisher(target)).clone()
        };
        let (tx, rx) = oneshot::channel();
        let _ = sender.send(rx).await;
        tx
    }

    fn spawn_publisher(self: &Arc<Self>, target: &str) -> mpsc::Sender<oneshot::Receiver<PublishPayload>> {
        let (tx, mut rx) = mpsc::channel::<oneshot::Receiver<PublishPayload>>(32);
        let room = self.room.clone();
        let target = target.to_string();
        tokio::spawn(async move {
            while let Some(reservation) = rx.recv().await {
                let Ok(payload) = reservation.await else {
                    // The fan-out branch that owned this slot never sent a
                    // payload (MT/TTS failed; already recorded on the trace).
                    continue;
                };
                for (samples, sample_rate) in &payload.frames {
                    if let Err(err) = room.publish_audio(&payload.target_language, samples, *sample_rate).await {
                        tracing::warn!(target = %target, error = %err, "failed to publish translated audio frame");
                    }
                }
                match serde_json::to_vec(&payload.caption) {
                    Ok(bytes) => {
                        if let Err(err) = room.publish_caption(&bytes).await {
                            tracing::debug!(target = %target, error = %err, "caption publish failed (best-effort)");
                        }
                    }
                    Err(err) => tracing::warn!(target = %target, error = %err, "failed to serialize caption"),
                }
            }
        });
        tx
    }

    async fn translate_and_synthesize(
        self: Arc<Self>,
        trace_id: String,
        target: String,
        text: String,
        source_language: String,
        context: String,
        reply: oneshot::Sender<PublishPayload>,
    ) {
        let fanout_start = Instant::now();

        let mt_start = Instant::now();
        let translation = match with_soft_timeout(
            &trace_id,
            "mt_processing",
            MT_SOFT_TIMEOUT,
            self.mt.translate(&text, &source_language, &target, Some(context.as_str())),
        )
        .await
        {
            Ok(t) => t,
            Err(err) => {
                self.tracer.add_span(&trace_id, "mt_processing", mt_start, mt_start.elapsed());
                self.tracer.add_error(&trace_id, format!("mt[{target}]: {err}"));
                return;
            }
        };
        self.tracer.add_span(&trace_id, "mt_processing", mt_start, mt_start.elapsed());

        if translation.is_empty() {
            return;
        }

        let voice_id = self.settings.voice_for(&target);
        let tts_start = Instant::now();
        let mut stream = match with_soft_timeout(
            &trace_id,
            "tts_processing",
            TTS_SOFT_TIMEOUT,
            self.tts.synthesize(&translation.text, &voice_id, &target, 1.0),
        )
        .await
        {
            Ok(s) => s,
            Err(err) => {
                self.tracer.add_error(&trace_id, format!("tts[{target}]: {err}"));
                return;
            }
        };

        let mut frames = Vec::new();
        let mut first_sample_recorded = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(result) => {
                    for chunk in &result.chunks {
                        if chunk.samples.is_empty() {
                            continue;
                        }
                        if !first_sample_recorded {
                            first_sample_recorded = true;
                            self.tracer.add_span(&trace_id, "tts_first_sample", tts_start, tts_start.elapsed());
                        }
                        frames.push((chunk.samples.clone(), chunk.sample_rate));
                    }
                }
                Err(err) => {
                    self.tracer.add_error(&trace_id, format!("tts[{target}] stream: {err}"));
                    break;
                }
            }
        }
        self.tracer.add_span(&trace_id, "tts_processing", tts_start, tts_start.elapsed());

        if frames.is_empty() {
            return;
        }

        let caption = CaptionPayload {
            kind: "translation",
            original_text: text,
            translated_text: translation.text,
            source_language,
            target_language: target.clone(),
            confidence: translation.confidence,
            latency_ms: fanout_start.elapsed().as_secs_f64() * 1000.0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            chunk_id: format!("{trace_id}_{target}"),
        };

        let _ = reply.send(PublishPayload { target_language: target, frames, caption });
    }
}

/// Races `fut` against `soft`; if `soft` elapses first, logs a warning span
/// attribute and keeps awaiting the same future to its real (hard) outcome
/// rather than abandoning it (§5: "Soft timeouts emit a warning span
/// attribute; hard timeouts fail the subtask" — the hard cutoff lives inside
/// each transport client's own connection timeout).
async fn with_soft_timeout<T>(
    trace_id: &str,
    op: &str,
    soft: Duration,
    fut: impl Future<Output = CoreResult<T>>,
) -> CoreResult<T> {
    tokio::pin!(fut);
    tokio::select! {
        res = &mut fut => res,
        _ = tokio::time::sleep(soft) => {
            tracing::warn!(trace_id, op, "soft timeout exceeded, still awaiting hard timeout");
            fut.await
        }
    }
}

/// Splits committed text into sentences on terminal punctuation for context
/// buffer updates (§4.4 step 5). Text with no terminal punctuation becomes
/// one sentence.
fn segment_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trailing = current.trim();
    if !trailing.is_empty() {
        sentences.push(trailing.to_string());
    }
    sentences
}

fn now_ms() -> u128 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use translator_core::{PcmChunk, SynthesisResult, TranscriptHypothesis, TranslationResult};

    struct FakeStt;
    #[async_trait]
    impl SpeechToText for FakeStt {
        async fn transcribe(&self, _audio: &[i16], _sample_rate: u32, _language_hint: &str) -> CoreResult<TranscriptHypothesis> {
            Ok(TranscriptHypothesis {
                text: "hello world".into(),
                confidence: 0.95,
                language: "en".into(),
                is_final: true,
                timestamp: 0.0,
                processing_time_ms: 10.0,
                words: Vec::new(),
            })
        }
    }

    struct FakeMt;
    #[async_trait]
    impl MachineTranslator for FakeMt {
        async fn translate(&self, text: &str, source_language: &str, target_language: &str, _context: Option<&str>) -> CoreResult<TranslationResult> {
            Ok(TranslationResult {
                text: format!("[{target_language}] {text}"),
                confidence: 0.9,
                source_language: source_language.to_string(),
                target_language: target_language.to_string(),
                model_used: Some("fake".into()),
                context_used: true,
            })
        }
    }

    struct FakeTts;
    #[async_trait]
    impl TextToSpeech for FakeTts {
        async fn synthesize(&self, _text: &str, _voice_id: &str, _language: &str, _speed: f32) -> CoreResult<BoxStream<'static, CoreResult<SynthesisResult>>> {
            let result = SynthesisResult {
                voice_id: "v".into(),
                language: "es".into(),
                processing_time_ms: 5.0,
                ttft_ms: Some(5.0),
                chunks: vec![PcmChunk { samples: vec![0.1, 0.2], sample_rate: 16_000, is_final: true }],
            };
            Ok(stream::iter(vec![Ok(result)]).boxed())
        }
    }

    struct FakeRoom {
        audio_calls: AtomicUsize,
        caption_calls: AtomicUsize,
    }
    #[async_trait]
    impl RoomAdapter for FakeRoom {
        fn events(&self) -> BoxStream<'static, translator_core::RoomEvent> {
            stream::empty().boxed()
        }
        fn audio_chunks(&self, _speaker: &SpeakerId) -> BoxStream<'static, AudioChunk> {
            stream::empty().boxed()
        }
        async fn publish_audio(&self, _target_language: &str, _samples: &[f32], _sample_rate: u32) -> CoreResult<()> {
            self.audio_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn publish_caption(&self, _payload: &[u8]) -> CoreResult<()> {
            self.caption_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_settings() -> Arc<Settings> {
        let mut voice_map = std::collections::HashMap::new();
        voice_map.insert("es".to_string(), "es-mx-female-1".to_string());
        voice_map.insert("fr".to_string(), "fr-fr-male-1".to_string());
        Arc::new(Settings {
            stt_url: "ws://localhost:8001".into(),
            mt_url: "ws://localhost:8002".into(),
            tts_url: "ws://localhost:8003".into(),
            livekit_url: "wss://room.example.com".into(),
            livekit_api_key: "key".into(),
            livekit_api_secret: "a".repeat(32),
            voice_map,
            chunk_duration_ms: 250,
            context_token_cap: 512,
            max_concurrent_sessions: 4,
            ttft_target_ms: 450,
            caption_target_ms: 250,
            max_retraction_rate: 0.05,
            log_json: false,
            metrics_port: 9090,
        })
    }

    #[tokio::test]
    async fn one_committed_chunk_fans_out_to_every_non_source_target() {
        let settings = test_settings();
        let room = Arc::new(FakeRoom { audio_calls: AtomicUsize::new(0), caption_calls: AtomicUsize::new(0) });
        let pipeline = SpeakerPipeline::new(
            "alice".into(),
            settings,
            Arc::new(FakeStt),
            Arc::new(FakeMt),
            Arc::new(FakeTts),
            room.clone(),
            Arc::new(Tracer::new()),
        );

        let chunk = AudioChunk { speaker: "alice".into(), timestamp_ms: 0, sample_rate: 16_000, samples: vec![0i16; 16_000] };
        pipeline.process_window(vec![chunk]).await;

        // voice_map has two target languages (es, fr), neither is "en".
        assert_eq!(room.audio_calls.load(Ordering::SeqCst), 2);
        assert_eq!(room.caption_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_window_is_a_no_op() {
        let settings = test_settings();
        let room = Arc::new(FakeRoom { audio_calls: AtomicUsize::new(0), caption_calls: AtomicUsize::new(0) });
        let pipeline = SpeakerPipeline::new(
            "bob".into(),
            settings,
            Arc::new(FakeStt),
            Arc::new(FakeMt),
            Arc::new(FakeTts),
            room.clone(),
            Arc::new(Tracer::new()),
        );
        pipeline.process_window(vec![]).await;
        assert_eq!(room.audio_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn segment_sentences_splits_on_terminal_punctuation() {
        let out = segment_sentences("Hello there. How are you? Fine!");
        assert_eq!(out, vec!["Hello there.", "How are you?", "Fine!"]);
    }

    #[test]
    fn segment_sentences_keeps_trailing_fragment_without_punctuation() {
        let out = segment_sentences("no terminator here");
        assert_eq!(out, vec!["no terminator here"]);
    }
}
