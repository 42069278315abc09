//! Text-heuristic lip-sync for voices with no audio signal.
//!
//! Web-speech class players produce sound the engine cannot analyse, so mouth
//! movement is simulated from the text instead: one intensity spike per word,
//! proportional to its vowel count, followed by a short linear fade.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::sampler::RmsCallback;

/// Base per-word interval before rate scaling.
pub const BASE_WORD_INTERVAL: Duration = Duration::from_millis(120);

/// Number of fade steps after each spike.
const FADE_STEPS: u32 = 3;

/// Spike intensity for one word: `min(0.3 + 0.15 * vowels, 1.0)`.
pub fn word_intensity(word: &str) -> f32 {
    (0.3 + 0.15 * vowel_count(word) as f32).min(1.0)
}

fn vowel_count(word: &str) -> usize {
    word.chars()
        .filter(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
        .count()
}

/// Word-by-word intensity scheduler.
pub struct TextLipSync {
    words: Vec<String>,
    interval: Duration,
}

impl TextLipSync {
    /// Tokenize `text` by whitespace; `rate` scales the word cadence the same
    /// way it scales the player's speech rate.
    pub fn new(text: &str, rate: f32) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            1.0
        };
        Self {
            words: text.split_whitespace().map(str::to_string).collect(),
            interval: BASE_WORD_INTERVAL.div_f32(rate),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Approximate simulated duration (one interval per word).
    pub fn duration(&self) -> Duration {
        self.interval * self.words.len() as u32
    }

    /// Run the schedule: word `k` spikes at `k * interval`, then fades to
    /// zero in [`FADE_STEPS`] sub-steps of `interval / 4` inside its slot.
    ///
    /// Returns early (without further emissions) once `cancel` fires; the
    /// caller owns the closing zero in that case.
    pub async fn run(self, cancel: CancellationToken, emit: RmsCallback) {
        let step = self.interval / (FADE_STEPS + 1);
        // The fade steps consume part of each slot, so every word after the
        // first only waits the remainder before its spike.
        let mut next_delay = self.interval;
        for word in &self.words {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(next_delay) => {}
            }
            let spike = word_intensity(word);
            emit(spike);

            for fade in 1..=FADE_STEPS {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(step) => {}
                }
                emit(spike * (FADE_STEPS - fade) as f32 / FADE_STEPS as f32);
            }
            next_delay = self.interval - step * FADE_STEPS;
        }
    }
}
