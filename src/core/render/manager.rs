//! Bus-driven orchestration around a renderer adapter.
//!
//! The manager renders messages on demand and translates speech events into
//! renderer capability calls. It owns the lip-sync sampler it starts for
//! buffered audio, so tearing the manager down always tears the sampler down
//! with it.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::base::{RenderResult, Renderer};
use crate::core::audio::{AudioData, AudioHandle, AudioRing};
use crate::core::events::{CharivoEvent, EventBus, EventKind, SubscriptionId};
use crate::core::lipsync::{FFT_SIZE, RmsCallback, RmsSampler, SAMPLE_INTERVAL};
use crate::core::types::{Character, Message, MessageRole};

struct ActiveSampler {
    sampler: RmsSampler,
    feeder_cancel: CancellationToken,
}

/// Wraps a [`Renderer`] with event subscriptions and emotion mapping.
pub struct RenderManager {
    bus: Arc<EventBus>,
    renderer: Arc<dyn Renderer>,
    character: Arc<RwLock<Option<Character>>>,
    sampler: Arc<Mutex<Option<ActiveSampler>>>,
    subscriptions: Vec<SubscriptionId>,
}

impl RenderManager {
    pub fn new(bus: Arc<EventBus>, renderer: Arc<dyn Renderer>) -> Self {
        let character = Arc::new(RwLock::new(None));
        let sampler = Arc::new(Mutex::new(None));
        let mut manager = Self {
            bus,
            renderer,
            character,
            sampler,
            subscriptions: Vec::new(),
        };
        manager.subscribe();
        manager
    }

    fn subscribe(&mut self) {
        // Listeners hold the bus weakly: the bus owns the listeners, and a
        // strong reference back would keep both alive forever.
        let bus_weak = Arc::downgrade(&self.bus);

        let renderer = Arc::clone(&self.renderer);
        let sampler_slot = Arc::clone(&self.sampler);
        let start_bus = Weak::clone(&bus_weak);
        self.subscriptions.push(self.bus.on(
            EventKind::TtsAudioStart,
            Arc::new(move |event| {
                let CharivoEvent::TtsAudioStart { audio } = event else {
                    return;
                };
                if let Some(lip_sync) = renderer.lip_sync() {
                    lip_sync.start_audio(audio);
                }
                if let AudioHandle::Buffer(data) = audio {
                    start_buffer_sampler(&sampler_slot, &start_bus, data.clone());
                }
            }),
        ));

        let renderer = Arc::clone(&self.renderer);
        self.subscriptions.push(self.bus.on(
            EventKind::TtsLipsyncUpdate,
            Arc::new(move |event| {
                if let CharivoEvent::TtsLipsyncUpdate { rms } = event
                    && let Some(lip_sync) = renderer.lip_sync()
                {
                    lip_sync.update_rms(*rms);
                }
            }),
        ));

        let renderer = Arc::clone(&self.renderer);
        let sampler_slot = Arc::clone(&self.sampler);
        self.subscriptions.push(self.bus.on(
            EventKind::TtsAudioEnd,
            Arc::new(move |event| {
                let CharivoEvent::TtsAudioEnd = event else {
                    return;
                };
                stop_active_sampler(&sampler_slot);
                if let Some(lip_sync) = renderer.lip_sync() {
                    lip_sync.finish();
                }
            }),
        ));

        let renderer = Arc::clone(&self.renderer);
        let character = Arc::clone(&self.character);
        self.subscriptions.push(self.bus.on(
            EventKind::RealtimeEmotion,
            Arc::new(move |event| {
                if let CharivoEvent::RealtimeEmotion { emotion } = event
                    && let Some(character) = character.read().as_ref()
                {
                    apply_emotion(renderer.as_ref(), character, emotion);
                }
            }),
        ));
    }

    /// Set the character used for emotion lookups on realtime events.
    pub fn set_character(&self, character: Character) {
        *self.character.write() = Some(character);
    }

    pub async fn initialize(&self) -> RenderResult<()> {
        self.renderer.initialize().await
    }

    /// Present one message. Character messages carrying a mapped emotion tag
    /// trigger the mapped expression/motion first; an unmapped tag plays
    /// nothing.
    pub async fn render(
        &self,
        message: &Message,
        character: Option<&Character>,
    ) -> RenderResult<()> {
        if message.role == MessageRole::Character
            && let (Some(emotion), Some(character)) = (&message.emotion, character)
        {
            apply_emotion(self.renderer.as_ref(), character, emotion);
        }
        self.renderer.render(message, character).await
    }

    /// Follow a screen-space target, when the renderer tracks gaze.
    pub fn look_at(&self, x: f32, y: f32) {
        if let Some(tracking) = self.renderer.mouse_tracking() {
            tracking.look_at(x, y);
        }
    }

    pub fn reset_gaze(&self) {
        if let Some(tracking) = self.renderer.mouse_tracking() {
            tracking.reset();
        }
    }

    pub async fn destroy(&self) -> RenderResult<()> {
        stop_active_sampler(&self.sampler);
        self.renderer.destroy().await
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        stop_active_sampler(&self.sampler);
        for id in self.subscriptions.drain(..) {
            self.bus.off(id);
        }
    }
}

fn apply_emotion(renderer: &dyn Renderer, character: &Character, emotion: &str) {
    let Some(mapping) = character.emotion_mapping(emotion) else {
        trace!(%emotion, "no emotion mapping, playing nothing");
        return;
    };
    let Some(motion) = renderer.motion() else {
        return;
    };
    if let Some(expression) = &mapping.expression {
        motion.play_expression(expression);
    }
    if let Some(motion_ref) = &mapping.motion {
        motion.play_motion(&motion_ref.group, motion_ref.index);
    }
}

/// Start the analyser over a synthesized buffer: a feeder task paces the PCM
/// into a ring at playback rate while the sampler reads it back at ~60 Hz and
/// republishes intensities as `TtsLipsyncUpdate`.
fn start_buffer_sampler(
    slot: &Arc<Mutex<Option<ActiveSampler>>>,
    bus: &Weak<EventBus>,
    audio: AudioData,
) {
    stop_active_sampler(slot);

    let ring = AudioRing::new(FFT_SIZE * 4);
    let feeder_cancel = CancellationToken::new();
    spawn_buffer_feeder(Arc::clone(&ring), audio, feeder_cancel.clone());

    let callback_bus = Weak::clone(bus);
    let callback: RmsCallback = Arc::new(move |rms| {
        if let Some(bus) = callback_bus.upgrade() {
            bus.emit(CharivoEvent::TtsLipsyncUpdate { rms });
        }
    });

    let sampler = RmsSampler::spawn(ring, callback);
    *slot.lock() = Some(ActiveSampler {
        sampler,
        feeder_cancel,
    });
    debug!("buffer lip-sync sampler started");
}

fn stop_active_sampler(slot: &Arc<Mutex<Option<ActiveSampler>>>) {
    let active = slot.lock().take();
    if let Some(active) = active {
        active.feeder_cancel.cancel();
        active.sampler.stop();
    }
}

/// Push PCM into the ring at real-time pace so the sampler's tail window
/// tracks what the listener is currently hearing.
fn spawn_buffer_feeder(ring: Arc<AudioRing>, audio: AudioData, cancel: CancellationToken) {
    tokio::spawn(async move {
        let samples = audio.samples_mono_f32();
        let chunk = (audio.sample_rate as usize / 60).max(1);
        let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        let mut cursor = 0;
        while cursor < samples.len() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let end = (cursor + chunk).min(samples.len());
                    ring.push(&samples[cursor..end]);
                    cursor = end;
                }
            }
        }
    });
}
