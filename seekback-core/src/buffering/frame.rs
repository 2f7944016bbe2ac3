//! Frame geometry shared by the device, the ring buffer and the encoder.

use std::time::Duration;

/// One signed 32-bit PCM sample.
pub type Sample = i32;

/// Shape of the frames read from the device: `frame_size` mono samples at
/// `sample_rate` Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub frame_size: usize,
    pub sample_rate: u32,
}

impl FrameSpec {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        Self {
            frame_size,
            sample_rate,
        }
    }

    /// Wall-clock duration covered by `frames` frames.
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let samples = frames as f64 * self.frame_size as f64;
        Duration::from_secs_f64(samples / self.sample_rate as f64)
    }

    /// Wall-clock duration covered by `samples` samples.
    pub fn duration_of_samples(&self, samples: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }
}
