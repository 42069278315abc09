//! Base trait and types for text-to-speech provider adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::audio::AudioData;
use crate::core::types::VoiceSettings;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during TTS operations.
#[derive(Debug, Error)]
pub enum TtsError {
    /// The player does not implement this operation for its capability class.
    #[error("unsupported operation for this player: {0}")]
    Unsupported(&'static str),

    /// Synthesis failed upstream.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Device or player-side playback failed.
    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for TTS operations.
pub type TtsResult<T> = Result<T, TtsError>;

// =============================================================================
// Capability and options
// =============================================================================

/// How a player produces sound, which decides the lip-sync strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsCapability {
    /// The player voices the text itself (web-speech class); no audio buffer
    /// is available to analyse.
    SelfVoiced,
    /// The player produces a playable audio buffer.
    AudioBuffer,
}

/// Per-utterance speech options, usually derived from a character's voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice_id: None,
        }
    }
}

impl SpeechOptions {
    pub fn from_voice(voice: &VoiceSettings) -> Self {
        Self {
            rate: voice.rate,
            pitch: voice.pitch,
            volume: voice.volume,
            voice_id: voice.voice_id.clone(),
        }
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for TTS provider adapters.
///
/// A player implements the method matching its [`TtsCapability`]; the other
/// one keeps its default `Unsupported` body. The manager dispatches by
/// capability and never calls the wrong one.
#[async_trait]
pub trait BaseTts: Send + Sync {
    /// Which lip-sync strategy this player needs.
    fn capability(&self) -> TtsCapability;

    /// Whether the player can run on this host at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Select a provider-specific voice.
    fn set_voice(&mut self, _voice_id: &str) -> TtsResult<()> {
        Ok(())
    }

    /// Voice the text directly (SelfVoiced players). Resolves when speech
    /// has finished.
    async fn speak(&self, _text: &str, _options: &SpeechOptions) -> TtsResult<()> {
        Err(TtsError::Unsupported("speak"))
    }

    /// Produce a playable buffer (AudioBuffer players).
    async fn synthesize(&self, _text: &str, _options: &SpeechOptions) -> TtsResult<AudioData> {
        Err(TtsError::Unsupported("synthesize"))
    }

    /// Halt any in-flight speech. Must be safe to call when idle.
    async fn stop(&self) -> TtsResult<()>;
}

/// Boxed trait object for TTS adapters.
pub type BoxedTts = Box<dyn BaseTts>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_options_from_voice() {
        let voice = VoiceSettings {
            rate: 1.5,
            pitch: 0.8,
            volume: 0.6,
            voice_id: Some("v1".to_string()),
        };
        let options = SpeechOptions::from_voice(&voice);
        assert_eq!(options.rate, 1.5);
        assert_eq!(options.pitch, 0.8);
        assert_eq!(options.volume, 0.6);
        assert_eq!(options.voice_id.as_deref(), Some("v1"));
    }

    #[test]
    fn test_error_display() {
        assert!(
            TtsError::Unsupported("speak")
                .to_string()
                .contains("speak")
        );
    }
}
