//! Renderer contract with optional capability interfaces.
//!
//! A renderer implements [`Renderer::render`] and opts into extra behavior by
//! returning `Some` from the capability accessors. A missing capability is
//! never an error; callers treat `None` as a silent no-op.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::audio::AudioHandle;
use crate::core::types::{Character, Message};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during render operations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Renderer startup failed.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// Drawing a message failed.
    #[error("render failed: {0}")]
    RenderFailed(String),
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

// =============================================================================
// Capability interfaces
// =============================================================================

/// Mouth-parameter control driven by lip-sync intensity samples.
pub trait LipSyncCapability: Send + Sync {
    /// A new utterance is starting with the given audio handle.
    fn start_audio(&self, audio: &AudioHandle);

    /// One intensity sample in `[0, 1]`.
    fn update_rms(&self, rms: f32);

    /// The utterance is over; the mouth has already been closed by the final
    /// zero sample.
    fn finish(&self);
}

/// Expression and motion playback.
pub trait MotionCapability: Send + Sync {
    fn play_expression(&self, expression: &str);

    fn play_motion(&self, group: &str, index: u32);
}

/// Gaze following a screen-space target.
pub trait MouseTrackingCapability: Send + Sync {
    fn look_at(&self, x: f32, y: f32);

    fn reset(&self);
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for renderer adapters.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn initialize(&self) -> RenderResult<()> {
        Ok(())
    }

    /// Present one message, optionally in the context of a character.
    async fn render(&self, message: &Message, character: Option<&Character>) -> RenderResult<()>;

    async fn destroy(&self) -> RenderResult<()> {
        Ok(())
    }

    /// Lip-sync support, when the renderer has a mouth to move.
    fn lip_sync(&self) -> Option<&dyn LipSyncCapability> {
        None
    }

    /// Expression/motion support.
    fn motion(&self) -> Option<&dyn MotionCapability> {
        None
    }

    /// Gaze tracking support.
    fn mouse_tracking(&self) -> Option<&dyn MouseTrackingCapability> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TextOnlyRenderer;

    #[async_trait]
    impl Renderer for TextOnlyRenderer {
        async fn render(
            &self,
            _message: &Message,
            _character: Option<&Character>,
        ) -> RenderResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_capabilities_default_to_none() {
        let renderer = TextOnlyRenderer;
        assert!(renderer.lip_sync().is_none());
        assert!(renderer.motion().is_none());
        assert!(renderer.mouse_tracking().is_none());
        renderer.initialize().await.unwrap();
        renderer.destroy().await.unwrap();
    }
}
