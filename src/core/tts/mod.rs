//! Text-to-speech subsystem: player adapter trait plus the stateful manager.

mod base;
mod manager;

pub use base::{BaseTts, BoxedTts, SpeechOptions, TtsCapability, TtsError, TtsResult};
pub use manager::TtsManager;
