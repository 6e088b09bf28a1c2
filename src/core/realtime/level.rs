//! Audio level estimation for presentation.
//!
//! A level monitor samples an [`AudioTap`] once per animation frame and writes
//! a bounded energy estimate into a [`LevelSignal`]. No smoothing is applied;
//! the renderer reads the latest value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::base::AudioTap;

/// Samples read per frame.
pub const LEVEL_WINDOW_SIZE: usize = 256;

/// Frame cadence (60 Hz).
pub const LEVEL_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Mean absolute deviation that maps to a full-scale level.
const FULL_SCALE_DEVIATION: f32 = 40.0;

/// Zero point of unsigned 8-bit samples.
const SAMPLE_ZERO: i16 = 128;

/// Latest level of one speaker, in `[0, 1]`.
///
/// Cloning shares the underlying value. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct LevelSignal(Arc<AtomicU32>);

impl LevelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.0.store(level.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn reset(&self) {
        self.set(0.0);
    }
}

/// Energy estimate of one window: `mean(|s - 128|) / 40`, clamped to `[0, 1]`.
pub fn compute_level(window: &[u8]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: u32 = window
        .iter()
        .map(|&s| (s as i16 - SAMPLE_ZERO).unsigned_abs() as u32)
        .sum();
    let mean = sum as f32 / window.len() as f32;
    (mean / FULL_SCALE_DEVIATION).min(1.0)
}

/// Run a level monitor until the tap reports its stream gone or `cancel` fires.
///
/// The signal is reset to 0 on exit.
pub async fn run_level_monitor(
    tap: Arc<dyn AudioTap>,
    signal: LevelSignal,
    cancel: CancellationToken,
) {
    let mut window = [SAMPLE_ZERO as u8; LEVEL_WINDOW_SIZE];
    let mut ticker = interval(LEVEL_FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !tap.read_window(&mut window) {
                    debug!("Audio tap unavailable, stopping level monitor");
                    break;
                }
                signal.set(compute_level(&window));
            }
        }
    }

    signal.reset();
}
