use std::time::{Duration, Instant};

use crate::types::Resolution;

/// Values shown to the user: frames per second over the last complete window
/// and the size of the most recent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub fps: u32,
    pub resolution: Option<Resolution>,
    pub frames_total: u64,
}

/// Rolling frame-rate counter fed with delivery timestamps.
///
/// The first frame opens a window. Each later frame counts towards it; once
/// the window has lasted at least `window`, the rate becomes
/// `frames * 1000 / elapsed_ms` and a new window starts at that frame.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window: Duration,
    window_start: Option<Instant>,
    frames_in_window: u32,
    fps: u32,
    resolution: Option<Resolution>,
    frames_total: u64,
}

impl FrameStats {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            window_start: None,
            frames_in_window: 0,
            fps: 0,
            resolution: None,
            frames_total: 0,
        }
    }

    /// Records a frame delivered at `now`. Returns the new rate when a window closed.
    pub fn record(&mut self, now: Instant, width: u32, height: u32) -> Option<u32> {
        self.frames_total += 1;
        self.resolution = Some(Resolution::new(width, height));

        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };

        self.frames_in_window += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed < self.window {
            return None;
        }

        let elapsed_ms = elapsed.as_millis().max(1);
        self.fps = (u128::from(self.frames_in_window) * 1000 / elapsed_ms) as u32;
        self.frames_in_window = 0;
        self.window_start = Some(now);
        tracing::trace!(fps = self.fps, width, height, "frame rate window closed");
        Some(self.fps)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fps: self.fps,
            resolution: self.resolution,
            frames_total: self.frames_total,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.window);
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
