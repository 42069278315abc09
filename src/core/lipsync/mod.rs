//! Lip-sync intensity derivation.
//!
//! Two real-audio paths share the same frequency-domain analyser: the
//! realtime client feeds remote PCM into an [`crate::core::audio::AudioRing`]
//! sampled by [`RmsSampler`], and the render layer does the same for
//! synthesized TTS buffers. Voices with no analysable signal fall back to the
//! [`TextLipSync`] heuristic. All paths publish through the single
//! `TtsLipsyncUpdate` bus event, so there is exactly one authoritative
//! RMS-to-mouth write per tick.

mod analyzer;
mod sampler;
mod text;

pub use analyzer::{BIN_COUNT, FFT_SIZE, SpectrumAnalyzer};
pub use sampler::{RmsCallback, RmsSampler, SAMPLE_INTERVAL};
pub use text::{BASE_WORD_INTERVAL, TextLipSync, word_intensity};
