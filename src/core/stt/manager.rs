//! Session state and event emission around a stateless STT adapter.

use std::sync::Arc;

use tracing::warn;

use super::base::{BaseStt, SttError, SttOptions, SttResult};
use crate::core::events::{CharivoEvent, EventBus};

/// Wraps a [`BaseStt`] transcriber with recording state and bus events.
pub struct SttManager {
    bus: Arc<EventBus>,
    transcriber: Box<dyn BaseStt>,
    recording: bool,
}

impl SttManager {
    pub fn new(bus: Arc<EventBus>, transcriber: Box<dyn BaseStt>) -> Self {
        Self {
            bus,
            transcriber,
            recording: false,
        }
    }

    /// Start a recording. Fails fast while one is already in progress.
    pub async fn start_recording(&mut self, options: &SttOptions) -> SttResult<()> {
        if self.recording {
            return Err(SttError::AlreadyRecording);
        }
        self.transcriber.start_recording(options).await?;
        self.recording = true;
        self.bus.emit(CharivoEvent::SttRecordingStarted);
        Ok(())
    }

    /// Stop the recording and publish the transcript.
    ///
    /// The recording flag is reset even when the adapter fails, so a broken
    /// stop never wedges the manager.
    pub async fn stop_recording(&mut self) -> SttResult<String> {
        if !self.recording {
            return Err(SttError::NotRecording);
        }
        self.recording = false;
        self.bus.emit(CharivoEvent::SttRecordingStopped);

        match self.transcriber.stop_recording().await {
            Ok(text) => {
                self.bus.emit(CharivoEvent::SttTranscription { text: text.clone() });
                Ok(text)
            }
            Err(error) => {
                warn!(%error, "transcription failed");
                Err(error)
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedStt {
        starts: Arc<AtomicUsize>,
        transcript: String,
        fail_stop: bool,
        recording: bool,
    }

    #[async_trait]
    impl BaseStt for ScriptedStt {
        async fn start_recording(&mut self, _options: &SttOptions) -> SttResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.recording = true;
            Ok(())
        }

        async fn stop_recording(&mut self) -> SttResult<String> {
            self.recording = false;
            if self.fail_stop {
                Err(SttError::ProviderError("decode failed".to_string()))
            } else {
                Ok(self.transcript.clone())
            }
        }

        fn is_recording(&self) -> bool {
            self.recording
        }
    }

    #[tokio::test]
    async fn test_start_twice_fails_without_touching_adapter() {
        let bus = EventBus::new();
        let adapter = ScriptedStt::default();
        let starts = Arc::clone(&adapter.starts);
        let mut manager = SttManager::new(bus, Box::new(adapter));

        manager.start_recording(&SttOptions::default()).await.unwrap();
        let error = manager
            .start_recording(&SttOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, SttError::AlreadyRecording));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_emits_transcription() {
        let bus = EventBus::new();
        let texts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&texts);
        bus.on(
            EventKind::SttTranscription,
            Arc::new(move |event| {
                if let CharivoEvent::SttTranscription { text } = event {
                    sink.lock().push(text.clone());
                }
            }),
        );

        let mut manager = SttManager::new(
            Arc::clone(&bus),
            Box::new(ScriptedStt {
                transcript: "hello world".to_string(),
                ..Default::default()
            }),
        );
        manager.start_recording(&SttOptions::default()).await.unwrap();
        let text = manager.stop_recording().await.unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(*texts.lock(), vec!["hello world".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_stop_resets_recording_flag() {
        let bus = EventBus::new();
        let mut manager = SttManager::new(
            bus,
            Box::new(ScriptedStt {
                fail_stop: true,
                ..Default::default()
            }),
        );

        manager.start_recording(&SttOptions::default()).await.unwrap();
        assert!(manager.is_recording());
        manager.stop_recording().await.err().unwrap();
        assert!(!manager.is_recording());

        // A fresh recording can start again after the failure.
        manager.start_recording(&SttOptions::default()).await.unwrap();
        assert!(manager.is_recording());
    }

    #[tokio::test]
    async fn test_stop_without_start_fails() {
        let bus = EventBus::new();
        let mut manager = SttManager::new(bus, Box::new(ScriptedStt::default()));
        let error = manager.stop_recording().await.err().unwrap();
        assert!(matches!(error, SttError::NotRecording));
    }
}
