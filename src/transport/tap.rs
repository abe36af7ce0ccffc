//! Tap-tempo estimation over a short ring buffer of tap timestamps.

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use super::{MAX_TEMPO, MIN_TEMPO};

/// Number of most recent taps kept for the estimate.
pub const TAP_HISTORY: usize = 4;

/// Shortest accepted interval between consecutive taps.
pub const MIN_TAP_INTERVAL_MS: f64 = 200.0;

/// Longest accepted interval between consecutive taps.
pub const MAX_TAP_INTERVAL_MS: f64 = 3000.0;

/// A tap session is forgotten after this much inactivity.
pub const TAP_IDLE_TIMEOUT_MS: f64 = 3000.0;

/// Tap-tempo state: recent tap times (milliseconds) and the last accepted estimate.
pub struct TapTempo {
    taps: HeapRb<f64>,
    estimate: Option<f64>,
}

impl TapTempo {
    pub fn new() -> Self {
        Self {
            taps: HeapRb::new(TAP_HISTORY),
            estimate: None,
        }
    }

    /// Register a tap at `now_ms` and return the estimated BPM, or `fallback_bpm`
    /// when there is no estimate yet.
    ///
    /// A tap arriving too soon or too late after the previous one starts a
    /// fresh session containing only itself.
    pub fn tap(&mut self, now_ms: f64, fallback_bpm: f64) -> f64 {
        self.expire(now_ms);

        if let Some(last) = self.last_tap() {
            let interval = now_ms - last;
            if !(MIN_TAP_INTERVAL_MS..=MAX_TAP_INTERVAL_MS).contains(&interval) {
                self.reset();
            }
        }
        self.taps.push_overwrite(now_ms);

        if let Some(bpm) = self.median_bpm() {
            if (MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
                self.estimate = Some(bpm);
            }
        }
        self.estimate.unwrap_or(fallback_bpm)
    }

    /// Read the current estimate without tapping. Expires an idle session first.
    pub fn estimate(&mut self, now_ms: f64, fallback_bpm: f64) -> f64 {
        self.expire(now_ms);
        self.estimate.unwrap_or(fallback_bpm)
    }

    /// Number of taps in the current session.
    pub fn tap_count(&self) -> usize {
        self.taps.occupied_len()
    }

    /// Forget all taps and the estimate.
    pub fn reset(&mut self) {
        self.taps.clear();
        self.estimate = None;
    }

    fn last_tap(&self) -> Option<f64> {
        self.taps.iter().last().copied()
    }

    fn expire(&mut self, now_ms: f64) {
        if let Some(last) = self.last_tap() {
            if now_ms - last > TAP_IDLE_TIMEOUT_MS {
                self.reset();
            }
        }
    }

    fn median_bpm(&self) -> Option<f64> {
        let times: Vec<f64> = self.taps.iter().copied().collect();
        let mut intervals: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
        if intervals.is_empty() {
            return None;
        }
        intervals.sort_by(f64::total_cmp);
        let mid = intervals.len() / 2;
        let median = if intervals.len() % 2 == 0 {
            (intervals[mid - 1] + intervals[mid]) / 2.0
        } else {
            intervals[mid]
        };
        Some((60_000.0 / median).round())
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIOR: f64 = 100.0;

    #[test]
    fn single_tap_returns_fallback() {
        let mut tap = TapTempo::new();
        assert_eq!(tap.tap(0.0, PRIOR), PRIOR);
        assert_eq!(tap.tap_count(), 1);
    }

    #[test]
    fn three_taps_at_500ms_give_120() {
        let mut tap = TapTempo::new();
        tap.tap(0.0, PRIOR);
        tap.tap(500.0, PRIOR);
        assert_eq!(tap.tap(1000.0, PRIOR), 120.0);
    }

    #[test]
    fn gap_over_timeout_resets_to_prior_tempo() {
        let mut tap = TapTempo::new();
        tap.tap(0.0, PRIOR);
        tap.tap(500.0, PRIOR);
        tap.tap(1000.0, PRIOR);
        assert_eq!(tap.tap(4100.0, PRIOR), PRIOR);
        assert_eq!(tap.tap_count(), 1);
    }

    #[test]
    fn too_fast_tap_starts_new_session() {
        let mut tap = TapTempo::new();
        tap.tap(0.0, PRIOR);
        tap.tap(500.0, PRIOR);
        assert_eq!(tap.tap(550.0, PRIOR), PRIOR);
        assert_eq!(tap.tap_count(), 1);
    }

    #[test]
    fn history_keeps_four_taps() {
        let mut tap = TapTempo::new();
        for i in 0..6 {
            tap.tap(i as f64 * 600.0, PRIOR);
        }
        assert_eq!(tap.tap_count(), TAP_HISTORY);
        assert_eq!(tap.estimate(3000.0, PRIOR), 100.0);
    }

    #[test]
    fn median_ignores_one_sloppy_tap() {
        let mut tap = TapTempo::new();
        tap.tap(0.0, PRIOR);
        tap.tap(500.0, PRIOR);
        tap.tap(1000.0, PRIOR);
        // intervals 500, 500, 800 → median 500
        assert_eq!(tap.tap(1800.0, PRIOR), 120.0);
    }

    #[test]
    fn idle_read_expires_estimate() {
        let mut tap = TapTempo::new();
        tap.tap(0.0, PRIOR);
        tap.tap(500.0, PRIOR);
        assert_eq!(tap.estimate(1000.0, PRIOR), 120.0);
        assert_eq!(tap.estimate(3600.0, PRIOR), PRIOR);
        assert_eq!(tap.tap_count(), 0);
    }
}
