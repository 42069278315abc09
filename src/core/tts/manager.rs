//! Session state and event emission around a stateless TTS adapter.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::base::{BaseTts, SpeechOptions, TtsCapability, TtsResult};
use crate::core::audio::{AudioHandle, AudioPlayback};
use crate::core::events::{CharivoEvent, EventBus};
use crate::core::lipsync::{RmsCallback, TextLipSync};

/// Wraps a [`BaseTts`] player with utterance lifecycle and bus events.
///
/// Event ordering per utterance is a contract: `TtsAudioStart` is always
/// emitted before the first `TtsLipsyncUpdate`, and `TtsAudioEnd` closes the
/// utterance exactly once, whether it finished or was stopped.
pub struct TtsManager {
    bus: Arc<EventBus>,
    player: Box<dyn BaseTts>,
    playback: AudioPlayback,
    active: Option<CancellationToken>,
}

impl TtsManager {
    pub fn new(bus: Arc<EventBus>, player: Box<dyn BaseTts>) -> Self {
        Self {
            bus,
            player,
            playback: AudioPlayback::spawn(),
            active: None,
        }
    }

    pub fn capability(&self) -> TtsCapability {
        self.player.capability()
    }

    pub fn set_voice(&mut self, voice_id: &str) -> TtsResult<()> {
        self.player.set_voice(voice_id)
    }

    /// Speak one utterance, stopping any previous one first.
    ///
    /// SelfVoiced players run the text-heuristic lip-sync simulation while
    /// the player voices the text; this resolves when speech finishes.
    /// AudioBuffer players are synthesized up front, played on the output
    /// thread, and analysed by the render layer; this resolves once playback
    /// has started.
    pub async fn speak(&mut self, text: &str, options: &SpeechOptions) -> TtsResult<()> {
        if !self.player.is_supported() {
            warn!("tts player reports no support on this host, skipping utterance");
            return Ok(());
        }
        self.stop().await?;

        match self.player.capability() {
            TtsCapability::SelfVoiced => self.speak_self_voiced(text, options).await,
            TtsCapability::AudioBuffer => self.speak_buffered(text, options).await,
        }
    }

    async fn speak_self_voiced(&mut self, text: &str, options: &SpeechOptions) -> TtsResult<()> {
        self.bus.emit(CharivoEvent::TtsAudioStart {
            audio: AudioHandle::Placeholder,
        });

        let cancel = CancellationToken::new();
        self.active = Some(cancel.clone());

        let simulation = TextLipSync::new(text, options.rate);
        debug!(words = simulation.word_count(), "starting text lip-sync simulation");
        let bus = Arc::clone(&self.bus);
        let emit: RmsCallback =
            Arc::new(move |rms| bus.emit(CharivoEvent::TtsLipsyncUpdate { rms }));
        let simulation_task = tokio::spawn(simulation.run(cancel.clone(), emit));

        let result = self.player.speak(text, options).await;

        // Speech is over (or failed): tear down the word timers before the
        // closing events so no late spike lands after the final zero.
        cancel.cancel();
        let _ = simulation_task.await;
        self.active = None;
        self.bus.emit(CharivoEvent::TtsLipsyncUpdate { rms: 0.0 });
        self.bus.emit(CharivoEvent::TtsAudioEnd);
        result
    }

    async fn speak_buffered(&mut self, text: &str, options: &SpeechOptions) -> TtsResult<()> {
        let audio = self.player.synthesize(text, options).await?;
        let duration = audio.duration();
        debug!(?duration, "synthesized utterance");

        self.bus.emit(CharivoEvent::TtsAudioStart {
            audio: AudioHandle::Buffer(audio.clone()),
        });
        self.playback.play(audio);

        let cancel = CancellationToken::new();
        self.active = Some(cancel.clone());
        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    bus.emit(CharivoEvent::TtsAudioEnd);
                    // Mark the utterance finished so a later stop() stays a
                    // no-op.
                    cancel.cancel();
                }
            }
        });
        Ok(())
    }

    /// Halt playback and clear all pending simulation timers.
    ///
    /// Always safe to call when idle; the closing events are only emitted
    /// when an utterance was actually active.
    pub async fn stop(&mut self) -> TtsResult<()> {
        self.playback.stop();
        self.player.stop().await?;
        if let Some(cancel) = self.active.take()
            && !cancel.is_cancelled()
        {
            cancel.cancel();
            self.bus.emit(CharivoEvent::TtsLipsyncUpdate { rms: 0.0 });
            self.bus.emit(CharivoEvent::TtsAudioEnd);
        }
        Ok(())
    }

    pub fn is_speaking(&self) -> bool {
        self.active.as_ref().is_some_and(|cancel| !cancel.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::AudioData;
    use crate::core::events::EventKind;
    use crate::core::tts::base::TtsError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingPlayer {
        capability_buffer: bool,
        spoken: Arc<Mutex<Vec<String>>>,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BaseTts for RecordingPlayer {
        fn capability(&self) -> TtsCapability {
            if self.capability_buffer {
                TtsCapability::AudioBuffer
            } else {
                TtsCapability::SelfVoiced
            }
        }

        async fn speak(&self, text: &str, _options: &SpeechOptions) -> TtsResult<()> {
            self.spoken.lock().push(text.to_string());
            Ok(())
        }

        async fn synthesize(&self, text: &str, _options: &SpeechOptions) -> TtsResult<AudioData> {
            self.spoken.lock().push(text.to_string());
            // 50ms of silence at 16 kHz.
            Ok(AudioData::from_mono_f32(&vec![0.0; 800], 16000))
        }

        async fn stop(&self) -> TtsResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingPlayer;

    #[async_trait]
    impl BaseTts for FailingPlayer {
        fn capability(&self) -> TtsCapability {
            TtsCapability::AudioBuffer
        }

        async fn synthesize(&self, _text: &str, _options: &SpeechOptions) -> TtsResult<AudioData> {
            Err(TtsError::SynthesisFailed("no voice".to_string()))
        }

        async fn stop(&self) -> TtsResult<()> {
            Ok(())
        }
    }

    fn record_events(bus: &Arc<EventBus>) -> Arc<Mutex<Vec<&'static str>>> {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        for (kind, tag) in [
            (EventKind::TtsAudioStart, "start"),
            (EventKind::TtsLipsyncUpdate, "rms"),
            (EventKind::TtsAudioEnd, "end"),
        ] {
            let log = Arc::clone(&log);
            bus.on(kind, Arc::new(move |_| log.lock().push(tag)));
        }
        log
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_voiced_emits_start_simulation_end() {
        let bus = EventBus::new();
        let log = record_events(&bus);
        let player = RecordingPlayer::default();
        let spoken = Arc::clone(&player.spoken);
        let mut manager = TtsManager::new(Arc::clone(&bus), Box::new(player));

        manager
            .speak("hello there", &SpeechOptions::default())
            .await
            .unwrap();

        assert_eq!(*spoken.lock(), vec!["hello there".to_string()]);
        let events = log.lock();
        assert_eq!(events.first(), Some(&"start"));
        assert_eq!(events.last(), Some(&"end"));
        // The closing zero always precedes the end event.
        assert_eq!(events[events.len() - 2], "rms");
        assert!(!manager.is_speaking());
    }

    #[tokio::test]
    async fn test_buffered_emits_start_then_end_after_duration() {
        let bus = EventBus::new();
        let log = record_events(&bus);
        let player = RecordingPlayer {
            capability_buffer: true,
            ..Default::default()
        };
        let mut manager = TtsManager::new(Arc::clone(&bus), Box::new(player));

        manager
            .speak("hi", &SpeechOptions::default())
            .await
            .unwrap();
        assert!(manager.is_speaking());
        assert_eq!(*log.lock(), vec!["start"]);

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert_eq!(log.lock().last(), Some(&"end"));
    }

    #[tokio::test]
    async fn test_stop_is_safe_when_idle_and_closes_active() {
        let bus = EventBus::new();
        let log = record_events(&bus);
        let player = RecordingPlayer {
            capability_buffer: true,
            ..Default::default()
        };
        let stops = Arc::clone(&player.stops);
        let mut manager = TtsManager::new(Arc::clone(&bus), Box::new(player));

        // Idle stop: player halted, no events.
        manager.stop().await.unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(log.lock().is_empty());

        manager
            .speak("hi", &SpeechOptions::default())
            .await
            .unwrap();
        manager.stop().await.unwrap();
        let events = log.lock();
        assert_eq!(*events, vec!["start", "rms", "end"]);
        assert!(!manager.is_speaking());
    }

    #[tokio::test]
    async fn test_synthesis_failure_emits_nothing() {
        let bus = EventBus::new();
        let log = record_events(&bus);
        let mut manager = TtsManager::new(Arc::clone(&bus), Box::new(FailingPlayer));

        let error = manager
            .speak("hi", &SpeechOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, TtsError::SynthesisFailed(_)));
        assert!(log.lock().is_empty());
        assert!(!manager.is_speaking());
    }
}
