//! Charivo: session orchestration and realtime audio/lip-sync engine for
//! animated conversational characters.
//!
//! A host application wires pluggable provider adapters (LLM, TTS, STT,
//! renderer) into a [`Charivo`] session controller. User input flows through
//! the language model, responses drive speech synthesis and lip movement,
//! and a live WebRTC voice session can drive the same character through the
//! same event bus.
//!
//! # Example
//!
//! ```rust,ignore
//! use charivo::{Charivo, Character, LlmManager, TtsManager};
//!
//! let mut charivo = Charivo::new();
//! charivo.attach_llm(LlmManager::new(Box::new(my_llm_client)));
//! charivo.attach_tts(TtsManager::new(charivo.bus(), Box::new(my_player)));
//! charivo.set_character(Character::new("hiyori", "Hiyori"));
//! charivo.user_say("Hello there!").await?;
//! ```

pub mod config;
pub mod core;
pub mod session;

// Re-export commonly used items for convenience
pub use config::{CharivoConfig, ConfigError};
pub use crate::core::*;
pub use session::{Charivo, CharivoError, CharivoResult};

/// Install a `tracing` subscriber honoring `RUST_LOG`, for hosts and
/// examples that do not bring their own.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .try_init();
}
