//! Base trait and types for speech-to-text provider adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during STT operations.
#[derive(Debug, Error)]
pub enum SttError {
    /// A recording is already in progress.
    #[error("recording already in progress")]
    AlreadyRecording,

    /// No recording to stop.
    #[error("not recording")]
    NotRecording,

    /// Microphone or device failure.
    #[error("media error: {0}")]
    MediaError(String),

    /// The underlying provider call failed.
    #[error("provider error: {0}")]
    ProviderError(String),
}

/// Result type for STT operations.
pub type SttResult<T> = Result<T, SttError>;

// =============================================================================
// Options
// =============================================================================

/// Per-recording options passed through to the transcriber.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SttOptions {
    /// BCP-47 language hint (e.g. "ja-JP").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Emit partial hypotheses while recording, when the provider supports
    /// it.
    #[serde(default)]
    pub interim_results: bool,
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for speech-to-text transcriber adapters.
#[async_trait]
pub trait BaseStt: Send + Sync {
    /// Begin capturing and transcribing microphone audio.
    async fn start_recording(&mut self, options: &SttOptions) -> SttResult<()>;

    /// Stop capturing and return the final transcript.
    async fn stop_recording(&mut self) -> SttResult<String>;

    /// Whether a recording is in flight on the adapter.
    fn is_recording(&self) -> bool;
}

/// Boxed trait object for STT adapters.
pub type BoxedStt = Box<dyn BaseStt>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SttError::AlreadyRecording.to_string(),
            "recording already in progress"
        );
        assert!(
            SttError::MediaError("mic busy".to_string())
                .to_string()
                .contains("mic busy")
        );
    }

    #[test]
    fn test_options_default() {
        let options = SttOptions::default();
        assert!(options.language.is_none());
        assert!(!options.interim_results);
    }
}
