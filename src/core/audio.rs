//! Shared audio primitives: PCM buffers, the sampler ring and device playback.
//!
//! All PCM in the engine is 16-bit signed little-endian. [`AudioRing`] is the
//! hand-off point between audio producers (realtime data-channel deltas, the
//! buffer-playback feeder) and the lip-sync sampler; [`AudioPlayback`] owns a
//! dedicated output thread so the `!Send` device stream never touches the
//! async runtime.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

// =============================================================================
// PCM buffers
// =============================================================================

/// A complete playable audio buffer (PCM 16-bit signed little-endian).
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Raw PCM bytes.
    pub data: Bytes,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

impl AudioData {
    pub fn new(data: impl Into<Bytes>, sample_rate: u32, channels: u16) -> Self {
        Self {
            data: data.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Build a mono buffer from f32 samples in `[-1, 1]`.
    pub fn from_mono_f32(samples: &[f32], sample_rate: u32) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            data.extend_from_slice(&value.to_le_bytes());
        }
        Self::new(data, sample_rate, 1)
    }

    /// Decoded i16 samples.
    pub fn samples_i16(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Decoded samples folded to mono f32 in `[-1, 1]`.
    pub fn samples_mono_f32(&self) -> Vec<f32> {
        let channels = self.channels as usize;
        let samples = self.samples_i16();
        samples
            .chunks(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|s| *s as f32 / i16::MAX as f32).sum();
                sum / frame.len() as f32
            })
            .collect()
    }

    /// Wall-clock length of the buffer.
    pub fn duration(&self) -> Duration {
        let frames = self.data.len() as u64 / (2 * self.channels as u64);
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(frames * 1_000_000 / self.sample_rate as u64)
    }
}

/// What the TTS layer hands to the render layer alongside `TtsAudioStart`.
#[derive(Debug, Clone)]
pub enum AudioHandle {
    /// Self-voiced player (web-speech class): there is no audio buffer to
    /// analyse, lip-sync runs on the text heuristic instead.
    Placeholder,
    /// A real buffer the render layer can run the analyser over.
    Buffer(AudioData),
}

// =============================================================================
// Sampler ring
// =============================================================================

/// Bounded mono ring buffer feeding the lip-sync sampler.
///
/// Producers push decoded f32 samples; the sampler reads the newest tail
/// window each tick. Capacity overflow drops the oldest samples.
pub struct AudioRing {
    inner: Mutex<VecDeque<f32>>,
    capacity: usize,
}

impl AudioRing {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        })
    }

    pub fn push(&self, samples: &[f32]) {
        let mut inner = self.inner.lock();
        for sample in samples {
            if inner.len() == self.capacity {
                inner.pop_front();
            }
            inner.push_back(*sample);
        }
    }

    /// Newest `len` samples, zero-padded at the front when fewer are held.
    pub fn tail(&self, len: usize) -> Vec<f32> {
        let inner = self.inner.lock();
        let mut window = vec![0.0; len];
        let available = inner.len().min(len);
        let start = inner.len() - available;
        for (slot, sample) in window[len - available..]
            .iter_mut()
            .zip(inner.iter().skip(start))
        {
            *slot = *sample;
        }
        window
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// =============================================================================
// Device playback
// =============================================================================

enum PlaybackCmd {
    /// Stop whatever is playing and start this buffer.
    Play(AudioData),
    /// Queue this buffer behind the current one (streaming deltas).
    Append(AudioData),
    Stop,
}

/// Handle to the playback thread. Cheap to clone; all clones drive the same
/// output sink. Completion timing is the caller's concern (buffers carry
/// their own [`AudioData::duration`]); playback itself is fire-and-forget.
#[derive(Clone)]
pub struct AudioPlayback {
    cmd_tx: mpsc::Sender<PlaybackCmd>,
}

impl AudioPlayback {
    /// Spawn the playback thread. On hosts without an output device the
    /// thread degrades to a sink that swallows commands, so headless runs
    /// keep working.
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let builder = thread::Builder::new().name("charivo-audio-out".to_string());
        if let Err(error) = builder.spawn(move || playback_thread(cmd_rx)) {
            warn!("failed to spawn audio playback thread: {error}");
        }
        Self { cmd_tx }
    }

    pub fn play(&self, audio: AudioData) {
        let _ = self.cmd_tx.send(PlaybackCmd::Play(audio));
    }

    pub fn append(&self, audio: AudioData) {
        let _ = self.cmd_tx.send(PlaybackCmd::Append(audio));
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(PlaybackCmd::Stop);
    }
}

fn playback_thread(cmd_rx: mpsc::Receiver<PlaybackCmd>) {
    let output = match rodio::OutputStream::try_default() {
        Ok(output) => Some(output),
        Err(error) => {
            warn!("no audio output device, playback disabled: {error}");
            None
        }
    };

    let Some((_stream, handle)) = output else {
        // Drain commands until every sender is gone.
        while cmd_rx.recv().is_ok() {}
        return;
    };

    let mut sink: Option<rodio::Sink> = None;
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            PlaybackCmd::Play(audio) => {
                if let Some(current) = sink.take() {
                    current.stop();
                }
                match rodio::Sink::try_new(&handle) {
                    Ok(new_sink) => {
                        append_buffer(&new_sink, &audio);
                        sink = Some(new_sink);
                    }
                    Err(error) => warn!("failed to open playback sink: {error}"),
                }
            }
            PlaybackCmd::Append(audio) => {
                if sink.is_none() {
                    match rodio::Sink::try_new(&handle) {
                        Ok(new_sink) => sink = Some(new_sink),
                        Err(error) => {
                            warn!("failed to open playback sink: {error}");
                            continue;
                        }
                    }
                }
                if let Some(current) = &sink {
                    append_buffer(current, &audio);
                }
            }
            PlaybackCmd::Stop => {
                if let Some(current) = sink.take() {
                    current.stop();
                }
            }
        }
    }
    debug!("audio playback thread exiting");
}

fn append_buffer(sink: &rodio::Sink, audio: &AudioData) {
    let samples = audio.samples_i16();
    sink.append(rodio::buffer::SamplesBuffer::new(
        audio.channels,
        audio.sample_rate,
        samples,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_data_duration() {
        // 16000 mono frames at 16 kHz = 1 second.
        let audio = AudioData::new(vec![0u8; 32000], 16000, 1);
        assert_eq!(audio.duration(), Duration::from_secs(1));

        let stereo = AudioData::new(vec![0u8; 32000], 16000, 2);
        assert_eq!(stereo.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_pcm_round_trip() {
        let samples = vec![0.0, 0.5, -0.5, 1.0];
        let audio = AudioData::from_mono_f32(&samples, 8000);
        let decoded = audio.samples_mono_f32();
        assert_eq!(decoded.len(), 4);
        for (expected, actual) in samples.iter().zip(decoded.iter()) {
            assert!((expected - actual).abs() < 1e-3);
        }
    }

    #[test]
    fn test_ring_tail_zero_pads() {
        let ring = AudioRing::new(16);
        ring.push(&[1.0, 2.0]);
        let window = ring.tail(4);
        assert_eq!(window, vec![0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_ring_drops_oldest_on_overflow() {
        let ring = AudioRing::new(3);
        ring.push(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.tail(3), vec![2.0, 3.0, 4.0]);
    }
}
