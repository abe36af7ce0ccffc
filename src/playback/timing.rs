//! Fixed-rate UI poll and position readout.
//!
//! The timing controller runs on wall-clock time, not transport time: it
//! keeps ticking at its rate regardless of tempo. A frame that arrives late
//! yields a single tick and the missed frames are counted, so a stalled UI
//! thread never causes a burst of scheduling passes.

use std::fmt;

use crate::transport::{MusicalPosition, TimeSignature};

/// Default poll rate.
pub const DEFAULT_RATE_HZ: f64 = 60.0;

const EPSILON: f64 = 1e-9;

/// Frame clock for the scheduling poll.
#[derive(Debug, Clone)]
pub struct TimingController {
    interval: f64,
    running: bool,
    next_tick: f64,
    ticks: u64,
    skipped: u64,
}

impl TimingController {
    pub fn new(rate_hz: f64) -> Self {
        let rate = if rate_hz.is_finite() && rate_hz > 0.0 {
            rate_hz
        } else {
            DEFAULT_RATE_HZ
        };
        Self {
            interval: 1.0 / rate,
            running: false,
            next_tick: 0.0,
            ticks: 0,
            skipped: 0,
        }
    }

    /// Start ticking; the first call to [`should_tick`](Self::should_tick)
    /// at or after `now` fires.
    pub fn start(&mut self, now: f64) {
        self.running = true;
        self.next_tick = now;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frame period in seconds.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Frames that were due but missed because a poll came late.
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    /// Whether a frame is due at wall-clock time `now`.
    ///
    /// At most one tick is reported per call; the next deadline is moved past
    /// `now` on the frame grid.
    pub fn should_tick(&mut self, now: f64) -> bool {
        if !self.running || now + EPSILON < self.next_tick {
            return false;
        }
        let late = ((now - self.next_tick) / self.interval + EPSILON).floor().max(0.0) as u64;
        self.skipped += late;
        self.next_tick += (late + 1) as f64 * self.interval;
        self.ticks += 1;
        true
    }

    /// Seconds until the next frame is due, or `None` when stopped.
    pub fn time_until_next(&self, now: f64) -> Option<f64> {
        self.running.then(|| (self.next_tick - now).max(0.0))
    }
}

impl Default for TimingController {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_HZ)
    }
}

/// Position for display: 1-based bar, beat and sixteenth step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionReadout {
    pub bar: u32,
    pub beat: u32,
    pub step: u32,
}

impl PositionReadout {
    pub fn from_beats(beats: f64, signature: TimeSignature) -> Self {
        Self::from(MusicalPosition::from_beats(beats, signature))
    }
}

impl From<MusicalPosition> for PositionReadout {
    fn from(pos: MusicalPosition) -> Self {
        Self {
            bar: pos.bar + 1,
            beat: pos.beat + 1,
            step: pos.sixteenth + 1,
        }
    }
}

impl fmt::Display for PositionReadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.bar, self.beat, self.step)
    }
}
