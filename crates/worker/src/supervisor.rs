//! Participant lifecycle supervisor (§4.7).
//!
//! Owns the shared transport clients and room adapter, and launches/tears
//! down one [`SpeakerPipeline`] per subscribed audio track as participants
//! come and go. Grounded on the teacher's `voice-agent-pipeline::orchestrator`
//! event-loop shape (one task draining an event stream, a map of per-entity
//! handles guarded by a single lock), generalized from session events to
//! room events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use translator_config::Settings;
use translator_core::{MachineTranslator, RoomAdapter, RoomEvent, SpeakerId, SpeechToText, TextToSpeech};
use translator_pipeline::SpeakerPipeline;
use translator_tracer::Tracer;

const AUDIO_CHANNEL_CAPACITY: usize = 32;
/// §4.7: "waits up to 5 s for graceful completion" on worker shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

struct PipelineHandle {
    pipeline: Arc<SpeakerPipeline>,
    task: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

pub struct Supervisor {
    settings: Arc<Settings>,
    stt: Arc<dyn SpeechToText>,
    mt: Arc<dyn MachineTranslator>,
    tts: Arc<dyn TextToSpeech>,
    room: Arc<dyn RoomAdapter>,
    tracer: Arc<Tracer>,
    pipelines: Mutex<HashMap<SpeakerId, PipelineHandle>>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        stt: Arc<dyn SpeechToText>,
        mt: Arc<dyn MachineTranslator>,
        tts: Arc<dyn TextToSpeech>,
        room: Arc<dyn RoomAdapter>,
        tracer: Arc<Tracer>,
    ) -> Arc<Self> {
        Arc::new(Supervisor { settings, stt, mt, tts, room, tracer, pipelines: Mutex::new(HashMap::new()) })
    }

    /// Drains room events until the event stream ends (room disconnect).
    pub async fn run(&self) {
        let mut events = self.room.events();
        while let Some(event) = events.next().await {
            match event {
                RoomEvent::ParticipantJoined { speaker } => {
                    tracing::info!(speaker = %speaker, "participant joined");
                }
                RoomEvent::ParticipantLeft { speaker } => {
                    self.teardown_pipeline(&speaker);
                }
                RoomEvent::AudioTrackSubscribed { speaker, sample_rate } => {
                    self.spawn_pipeline(speaker, sample_rate);
                }
            }
        }
        tracing::info!("room event stream ended, supervisor loop exiting");
    }

    fn spawn_pipeline(&self, speaker: SpeakerId, sample_rate: u32) {
        let mut pipelines = self.pipelines.lock();
        if pipelines.contains_key(&speaker) {
            return;
        }

        let pipeline = SpeakerPipeline::new(
            speaker.clone(),
            self.settings.clone(),
            self.stt.clone(),
            self.mt.clone(),
            self.tts.clone(),
            self.room.clone(),
            self.tracer.clone(),
        );

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let mut incoming = self.room.audio_chunks(&speaker);
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = incoming.next().await {
                if audio_tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        let task = pipeline.clone().spawn(audio_rx);
        tracing::info!(speaker = %speaker, sample_rate, "pipeline started");
        pipelines.insert(speaker, PipelineHandle { pipeline, task, forwarder });
    }

    /// §4.7: "cancels the pipeline; any in-flight RPCs complete or time out
    /// normally — their results are discarded."
    fn teardown_pipeline(&self, speaker: &SpeakerId) {
        if let Some(handle) = self.pipelines.lock().remove(speaker) {
            handle.pipeline.cancel();
            handle.forwarder.abort();
            tracing::info!(speaker = %speaker, "pipeline cancelled on participant leave");
        }
    }

    /// §4.7 worker shutdown: cancel every pipeline, wait up to 5 s each for
    /// its task to finish draining, then return so the caller can close the
    /// transport connections.
    pub async fn shutdown(&self) {
        let handles: Vec<PipelineHandle> = self.pipelines.lock().drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.pipeline.cancel();
        }
        let drains = handles.into_iter().map(|handle| async move {
            if tokio::time::timeout(SHUTDOWN_DRAIN, handle.task).await.is_err() {
                tracing::warn!("pipeline did not drain within shutdown window");
            }
            handle.forwarder.abort();
        });
        futures::future::join_all(drains).await;
    }

    pub fn active_speaker_count(&self) -> usize {
        self.pipelines.lock().len()
    }

    /// Mean retraction rate across currently active speakers, for the
    /// `/metrics` gauge; `0.0` when nobody is speaking.
    pub fn aggregate_retraction_rate(&self) -> f64 {
        let pipelines = self.pipelines.lock();
        if pipelines.is_empty() {
            return 0.0;
        }
        let sum: f64 = pipelines.values().map(|h| h.pipeline.retraction_rate()).sum();
        sum / pipelines.len() as f64
    }
}
