//! `RoomAdapter` implementation over the `livekit` Rust SDK (§6 "Room wire
//! protocol"). Grounded on `other_examples/.../voice-manager.rs.rs`'s event
//! loop (`Room::connect`, `RoomEvent::{TrackSubscribed, TrackUnsubscribed,
//! ParticipantConnected, ParticipantDisconnected}`, `NativeAudioStream`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit::{Room, RoomEvent as LiveKitRoomEvent, RoomOptions};
use livekit_api::access_token::{AccessToken, VideoGrants};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

use translator_config::Settings;
use translator_core::{AudioChunk, Result as CoreResult, RoomAdapter, RoomEvent, SpeakerId};

use crate::error::{Result, RoomError};
use crate::track_manager::OutputTrackManager;

/// Ingress sample rate the worker asks LiveKit to resample subscribed
/// tracks to before handing them to the STT client (matches the output
/// track rate, §4.5).
const INGRESS_SAMPLE_RATE: i32 = 16_000;
const INGRESS_CHANNELS: i32 = 1;

pub struct LiveKitAdapter {
    room: Arc<Room>,
    event_rx: SyncMutex<Option<UnboundedReceiver<LiveKitRoomEvent>>>,
    pending_audio: Arc<SyncMutex<HashMap<String, NativeAudioStream>>>,
    tracks: OutputTrackManager,
}

impl LiveKitAdapter {
    /// Mints a LiveKit access token for this worker's own bot identity and
    /// joins `settings.livekit_room_name`. This is the worker minting its
    /// own join credential from its configured API key/secret, not the
    /// user-facing credential-issuance service excluded from scope.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let token = AccessToken::with_api_key(&settings.livekit_api_key, &settings.livekit_api_secret)
            .with_identity(&settings.worker_identity)
            .with_name(&settings.worker_identity)
            .with_grants(VideoGrants {
                room_join: true,
                room: settings.livekit_room_name.clone(),
                ..Default::default()
            })
            .to_jwt()
            .map_err(|e| RoomError::TokenMint(e.to_string()))?;

        let (room, event_rx) = Room::connect(&settings.livekit_url, &token, RoomOptions::default()).await?;
        let room = Arc::new(room);

        Ok(LiveKitAdapter {
            room: room.clone(),
            event_rx: SyncMutex::new(Some(event_rx)),
            pending_audio: Arc::new(SyncMutex::new(HashMap::new())),
            tracks: OutputTrackManager::new(room),
        })
    }
}

#[async_trait]
impl RoomAdapter for LiveKitAdapter {
    fn events(&self) -> BoxStream<'static, RoomEvent> {
        let Some(rx) = self.event_rx.lock().take() else {
            return futures::stream::empty().boxed();
        };
        let pending_audio = self.pending_audio.clone();

        UnboundedReceiverStream::new(rx)
            .filter_map(move |event| {
                let pending_audio = pending_audio.clone();
                async move { translate_event(event, &pending_audio) }
            })
            .boxed()
    }

    fn audio_chunks(&self, speaker: &SpeakerId) -> BoxStream<'static, AudioChunk> {
        let Some(stream) = self.pending_audio.lock().remove(&speaker.0) else {
            return futures::stream::empty().boxed();
        };
        let speaker = speaker.clone();
        let elapsed_ms = Arc::new(AtomicU64::new(0));

        stream
            .map(move |frame| {
                let duration_ms = (frame.samples_per_channel as u64 * 1000) / frame.sample_rate.max(1) as u64;
                let timestamp_ms = elapsed_ms.fetch_add(duration_ms, Ordering::SeqCst);
                AudioChunk { speaker: speaker.clone(), timestamp_ms, sample_rate: frame.sample_rate, samples: frame.data.to_vec() }
            })
            .boxed()
    }

    async fn publish_audio(&self, target_language: &str, samples: &[f32], sample_rate: u32) -> CoreResult<()> {
        self.tracks.publish_frame(target_language, samples, sample_rate).await.map_err(Into::into)
    }

    async fn publish_caption(&self, payload: &[u8]) -> CoreResult<()> {
        use livekit::DataPacket;
        // Best-effort (§4.5): captions are a UX nicety, never worth blocking
        // or retrying the pipeline over, so this goes out unreliable.
        let packet = DataPacket { payload: payload.to_vec(), topic: Some("captions".to_string()), reliable: false, ..Default::default() };
        self.room.local_participant().publish_data(packet).await.map_err(|e| RoomError::PublishData(e).into())
    }
}

/// Translates a raw `livekit` room event into the worker's own event type,
/// stashing the subscribed track's native audio stream for later retrieval
/// by `audio_chunks` (§6 capability (a)/(d)).
fn translate_event(event: LiveKitRoomEvent, pending_audio: &SyncMutex<HashMap<String, NativeAudioStream>>) -> Option<RoomEvent> {
    match event {
        LiveKitRoomEvent::ParticipantConnected(participant) => {
            Some(RoomEvent::ParticipantJoined { speaker: identity_of(&participant).into() })
        }
        LiveKitRoomEvent::ParticipantDisconnected(participant) => {
            Some(RoomEvent::ParticipantLeft { speaker: identity_of(&participant).into() })
        }
        LiveKitRoomEvent::TrackSubscribed { track, participant, .. } => {
            if let livekit::track::RemoteTrack::Audio(audio_track) = track {
                let identity = identity_of(&participant);
                let native = NativeAudioStream::new(audio_track.rtc_track(), INGRESS_SAMPLE_RATE, INGRESS_CHANNELS);
                pending_audio.lock().insert(identity.clone(), native);
                return Some(RoomEvent::AudioTrackSubscribed { speaker: identity.into(), sample_rate: INGRESS_SAMPLE_RATE as u32 });
            }
            None
        }
        LiveKitRoomEvent::TrackUnsubscribed { track, participant, .. } => {
            if matches!(track, livekit::track::RemoteTrack::Audio(_)) {
                pending_audio.lock().remove(&identity_of(&participant));
            }
            None
        }
        _ => None,
    }
}

fn identity_of(participant: &livekit::participant::RemoteParticipant) -> String {
    participant.identity().to_string()
}
