//! Base traits and types for the realtime voice subsystem.
//!
//! A realtime session is a live, bidirectional voice conversation carried
//! over a WebRTC media + data-channel pair, as opposed to discrete turn-based
//! LLM/TTS calls. The pieces layer as: signaling exchange → peer transport →
//! protocol client → session manager.

use std::sync::Arc;
use std::{fmt, time::Duration};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::protocol::ToolDef;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection establishment failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The signaling endpoint rejected the SDP exchange.
    #[error("signaling failed with status {status}: {body}")]
    SignalingFailed { status: u16, body: String },

    /// Microphone or media pipeline failure.
    #[error("media error: {0}")]
    MediaError(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// The data channel is gone or rejected the payload.
    #[error("data channel closed: {0}")]
    ChannelClosed(String),

    /// A session is already active.
    #[error("a realtime session is already active")]
    SessionActive,

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Provider-reported error.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<serde_json::Error> for RealtimeError {
    fn from(error: serde_json::Error) -> Self {
        RealtimeError::SerializationError(error.to_string())
    }
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// SDP exchange in progress.
    Connecting,
    /// Connected and ready.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Sample rate of remote PCM16 audio deltas.
pub const REMOTE_AUDIO_SAMPLE_RATE: u32 = 24000;

/// Configuration for a realtime session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Signaling endpoint receiving the raw SDP offer.
    pub signaling_url: String,

    /// System instructions for the assistant.
    #[serde(default)]
    pub instructions: Option<String>,

    /// Voice id for audio output.
    #[serde(default)]
    pub voice: Option<String>,

    /// Tool definitions offered to the model.
    #[serde(default)]
    pub tools: Vec<ToolDef>,

    /// HTTP timeout for the signaling exchange, in seconds.
    #[serde(default = "default_signaling_timeout", with = "duration_secs")]
    pub signaling_timeout: Duration,
}

fn default_signaling_timeout() -> Duration {
    Duration::from_secs(10)
}

mod duration_secs {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            signaling_url: String::new(),
            instructions: None,
            voice: None,
            tools: Vec::new(),
            signaling_timeout: default_signaling_timeout(),
        }
    }
}

impl RealtimeConfig {
    /// Fail fast on configurations that cannot possibly connect.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.signaling_url.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "signaling_url is required".to_string(),
            ));
        }
        url::Url::parse(&self.signaling_url).map_err(|error| {
            RealtimeError::InvalidConfiguration(format!(
                "signaling_url is not a valid url: {error}"
            ))
        })?;
        Ok(())
    }
}

// =============================================================================
// Session events and callbacks
// =============================================================================

/// Typed event stream yielded by a connected client.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// The data channel opened; the session is usable.
    Connected,
    /// The session ended.
    Disconnected,
    /// Incremental assistant speech transcript.
    TextDelta(String),
    /// Completed transcription of the user's speech.
    UserTranscript(String),
    /// One lip-sync intensity sample derived from remote audio.
    Rms(f32),
    /// The current response finished.
    ResponseDone,
    /// The model invoked a tool.
    ToolCall { name: String, arguments: Value },
    /// A session-level error that did not kill the connection.
    Error(String),
}

/// A structured function-invocation request from the model.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// Call id to answer with, when present.
    pub call_id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

/// Host hook answering tool calls. The returned value is serialized and sent
/// back as the function-call output before the conversation continues.
pub type ToolHandler = Arc<dyn Fn(ToolCallRequest) -> BoxFuture<'static, Value> + Send + Sync>;
