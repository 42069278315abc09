//! Periodic RMS sampling over a shared audio ring.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::analyzer::{FFT_SIZE, SpectrumAnalyzer};
use crate::core::audio::AudioRing;

/// Delivery hook for intensity samples. Invoked from the sampler task.
pub type RmsCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Sampling cadence, ~60 Hz.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(16);

/// Fixed-interval sampling loop deriving lip-sync intensity from the newest
/// window of an [`AudioRing`].
///
/// `stop` cancels the loop in O(1) and always delivers one final intensity of
/// exactly `0.0` so the mouth closes; that delivery is a postcondition, not
/// cleanup best-effort.
pub struct RmsSampler {
    cancel: CancellationToken,
    stopped: Arc<AtomicBool>,
    callback: RmsCallback,
}

impl RmsSampler {
    /// Spawn the sampling task on the current runtime.
    pub fn spawn(ring: Arc<AudioRing>, callback: RmsCallback) -> Self {
        let cancel = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let task_cancel = cancel.clone();
        let task_stopped = Arc::clone(&stopped);
        let task_callback = Arc::clone(&callback);
        tokio::spawn(async move {
            let mut analyzer = SpectrumAnalyzer::new();
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let window = ring.tail(FFT_SIZE);
                        let rms = analyzer.process(&window);
                        if task_stopped.load(Ordering::SeqCst) {
                            break;
                        }
                        task_callback(rms);
                    }
                }
            }
            trace!("rms sampler task exited");
        });

        Self {
            cancel,
            stopped,
            callback,
        }
    }

    /// Cancel the loop and deliver the final zero sample.
    ///
    /// Safe to call more than once; the zero is delivered only on the first
    /// call.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        (self.callback)(0.0);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for RmsSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
