//! Realtime voice subsystem.
//!
//! A live session runs over a WebRTC media + data-channel pair. The local
//! microphone is published as a G.711 µ-law track; the conversation protocol
//! (JSON events tagged by `type`) rides the data channel; remote speech
//! arrives as PCM16 audio deltas that drive both playback and the lip-sync
//! sampler.
//!
//! # Architecture
//!
//! - [`SignalingClient`]: raw SDP offer/answer exchange over HTTP
//! - [`PeerTransport`] / [`WebRtcTransport`]: peer connection mechanics
//! - [`RealtimeClient`]: protocol state machine yielding [`RealtimeEvent`]s
//! - [`RealtimeManager`]: session lifecycle plus event relay onto the bus

mod base;
mod capture;
mod client;
mod manager;
mod protocol;
mod signaling;
mod transport;
mod webrtc;

pub use base::{
    ConnectionState, REMOTE_AUDIO_SAMPLE_RATE, RealtimeConfig, RealtimeError, RealtimeEvent,
    RealtimeResult, ToolCallRequest, ToolHandler,
};
pub use capture::{CpalMicrophone, MicrophoneSource};
pub use client::RealtimeClient;
pub use manager::{RealtimeManager, SET_EMOTION_TOOL};
pub use protocol::{
    ClientEvent, ContentPart, ConversationItem, ErrorInfo, InputAudioTranscription, OutputItem,
    ResponseInfo, ServerEvent, SessionConfig, SessionInfo, ToolDef,
};
pub use signaling::SignalingClient;
pub use transport::{PeerTransport, TransportEvent};
pub use self::webrtc::WebRtcTransport;
