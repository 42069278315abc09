//! Microphone capture feeding the local WebRTC audio track.
//!
//! CPAL streams are `!Send`, so each capture runs on its own dedicated
//! thread; frames cross into the async world over a bounded channel. Device
//! audio is folded to mono and decimated to the track's sample rate before it
//! leaves the thread.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::base::{RealtimeError, RealtimeResult};

/// Frame length forwarded to the track, in milliseconds.
const FRAME_MS: usize = 20;
/// How long to wait for the capture thread to come up.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Source of mono f32 microphone frames at a requested sample rate.
///
/// Abstracted so the transport can run against a scripted source in tests
/// and against CPAL in production.
pub trait MicrophoneSource: Send + Sync {
    /// Begin capturing. Frames are `FRAME_MS`-sized chunks of mono samples
    /// in `[-1, 1]` at `sample_rate`.
    fn start(&mut self, sample_rate: u32) -> RealtimeResult<mpsc::Receiver<Vec<f32>>>;

    /// Stop capturing and release the device.
    fn stop(&mut self);
}

/// CPAL-backed microphone capture on the default input device.
#[derive(Default)]
pub struct CpalMicrophone {
    stop_tx: Option<std_mpsc::Sender<()>>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MicrophoneSource for CpalMicrophone {
    fn start(&mut self, sample_rate: u32) -> RealtimeResult<mpsc::Receiver<Vec<f32>>> {
        self.stop();

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let builder = thread::Builder::new().name("charivo-mic".to_string());
        builder
            .spawn(move || capture_thread(sample_rate, frame_tx, stop_rx, ready_tx))
            .map_err(|error| RealtimeError::MediaError(error.to_string()))?;

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                Ok(frame_rx)
            }
            Ok(Err(error)) => Err(error),
            Err(_) => Err(RealtimeError::MediaError(
                "microphone capture did not start in time".to_string(),
            )),
        }
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            debug!("microphone capture stopped");
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread(
    target_rate: u32,
    frame_tx: mpsc::Sender<Vec<f32>>,
    stop_rx: std_mpsc::Receiver<()>,
    ready_tx: std_mpsc::Sender<RealtimeResult<()>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err(RealtimeError::MediaError(
            "no default input device".to_string(),
        )));
        return;
    };

    let supported = match device.default_input_config() {
        Ok(config) => config,
        Err(error) => {
            let _ = ready_tx.send(Err(RealtimeError::MediaError(error.to_string())));
            return;
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;
    let device_rate = config.sample_rate.0;
    info!(device_rate, channels, target_rate, "opening microphone capture");

    let mut chunker = FrameChunker::new(device_rate, target_rate, channels, frame_tx);
    let error_fn = |error| warn!("microphone stream error: {error}");

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| chunker.push_f32(data),
            error_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> =
                    data.iter().map(|s| *s as f32 / i16::MAX as f32).collect();
                chunker.push_f32(&converted);
            },
            error_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> = data
                    .iter()
                    .map(|s| (*s as f32 - 32768.0) / 32768.0)
                    .collect();
                chunker.push_f32(&converted);
            },
            error_fn,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(RealtimeError::MediaError(format!(
                "unsupported input sample format {other:?}"
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(error) => {
            let _ = ready_tx.send(Err(RealtimeError::MediaError(error.to_string())));
            return;
        }
    };
    if let Err(error) = stream.play() {
        let _ = ready_tx.send(Err(RealtimeError::MediaError(error.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Keep the stream alive until asked to stop or every receiver is gone.
    let _ = stop_rx.recv();
    drop(stream);
    debug!("microphone capture thread exited");
}

/// Folds interleaved device samples to mono, decimates to the target rate and
/// emits fixed-length frames.
struct FrameChunker {
    device_rate: u32,
    target_rate: u32,
    channels: usize,
    accumulator: u32,
    pending: Vec<f32>,
    frame_len: usize,
    frame_tx: mpsc::Sender<Vec<f32>>,
}

impl FrameChunker {
    fn new(
        device_rate: u32,
        target_rate: u32,
        channels: usize,
        frame_tx: mpsc::Sender<Vec<f32>>,
    ) -> Self {
        Self {
            device_rate: device_rate.max(1),
            target_rate,
            channels: channels.max(1),
            accumulator: 0,
            pending: Vec::new(),
            frame_len: (target_rate as usize * FRAME_MS) / 1000,
            frame_tx,
        }
    }

    fn push_f32(&mut self, interleaved: &[f32]) {
        for frame in interleaved.chunks(self.channels) {
            let mono: f32 = frame.iter().sum::<f32>() / frame.len() as f32;
            // Nearest-sample decimation; good enough for an 8 kHz voice
            // track.
            self.accumulator += self.target_rate;
            if self.accumulator >= self.device_rate {
                self.accumulator -= self.device_rate;
                self.pending.push(mono);
            }
        }
        while self.pending.len() >= self.frame_len {
            let frame: Vec<f32> = self.pending.drain(..self.frame_len).collect();
            // Drop frames when the consumer lags; live audio must not back
            // up.
            let _ = self.frame_tx.try_send(frame);
        }
    }
}
