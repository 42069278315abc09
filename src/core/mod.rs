pub mod audio;
pub mod events;
pub mod lipsync;
pub mod llm;
pub mod realtime;
pub mod render;
pub mod stt;
pub mod tts;
pub mod types;

// Re-export commonly used types for convenience
pub use audio::{AudioData, AudioHandle, AudioPlayback, AudioRing};
pub use events::{CharivoEvent, EventBus, EventKind, Listener, SubscriptionId};
pub use lipsync::{RmsCallback, RmsSampler, SpectrumAnalyzer, TextLipSync};
pub use llm::{BaseLlm, BoxedLlm, ChatMessage, ChatRole, LlmError, LlmManager, LlmResult};
pub use realtime::{
    ConnectionState, CpalMicrophone, MicrophoneSource, PeerTransport, RealtimeClient,
    RealtimeConfig, RealtimeError, RealtimeEvent, RealtimeManager, RealtimeResult,
    SignalingClient, ToolCallRequest, ToolDef, ToolHandler, TransportEvent, WebRtcTransport,
};
pub use render::{
    LipSyncCapability, MotionCapability, MouseTrackingCapability, RenderError, RenderManager,
    RenderResult, Renderer,
};
pub use stt::{BaseStt, BoxedStt, SttError, SttManager, SttOptions, SttResult};
pub use tts::{BaseTts, BoxedTts, SpeechOptions, TtsCapability, TtsError, TtsManager, TtsResult};
pub use types::{Character, EmotionMapping, Message, MessageRole, MotionRef, VoiceSettings};
