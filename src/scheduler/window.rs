//! Scheduling windows and the mapping from transport beats to content beats.
//!
//! A pass covers a span of unwrapped transport beats. [`WindowMapper`] cuts
//! that span into short segments, each of which maps linearly onto content
//! time. Segments never straddle a loop wrap or a pattern wrap.

use crate::transport::LoopRegion;

/// Tolerance for beat comparisons.
pub const BEAT_EPSILON: f64 = 1e-9;

/// A contiguous slice of content time mapped onto transport time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulingWindow {
    /// Content position where the window starts (inclusive).
    pub start_beats: f64,
    /// Content position where the window ends (exclusive).
    pub end_beats: f64,
    /// Content position of the next mapping discontinuity. Ramps are cut here.
    pub limit_beats: f64,
    /// Transport seconds at `start_beats`.
    pub origin_seconds: f64,
    pub seconds_per_beat: f64,
    /// The window does not continue the previous window of its source.
    pub continuity: bool,
}

impl SchedulingWindow {
    /// Transport seconds at content position `beats`.
    pub fn time_of(&self, beats: f64) -> f64 {
        self.origin_seconds + (beats - self.start_beats) * self.seconds_per_beat
    }

    /// Whether content position `beats` falls inside `[start, end)`.
    ///
    /// Both bounds are shifted by [`BEAT_EPSILON`], so a position on the
    /// boundary between two adjacent windows lands in exactly one of them.
    pub fn contains(&self, beats: f64) -> bool {
        beats >= self.start_beats - BEAT_EPSILON && beats < self.end_beats - BEAT_EPSILON
    }

    pub fn length_beats(&self) -> f64 {
        self.end_beats - self.start_beats
    }

    pub fn seconds(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat
    }
}

/// One linear piece of a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub content_start: f64,
    pub content_end: f64,
    /// Content position of the next discontinuity after `content_start`.
    pub limit: f64,
    pub origin_seconds: f64,
}

/// Position within a repeating cycle, and the room left before it wraps.
pub fn cycle_position(position: f64, cycle: f64) -> (f64, f64) {
    let pos = position.rem_euclid(cycle);
    let room = cycle - pos;
    if room < BEAT_EPSILON {
        (0.0, cycle)
    } else {
        (pos, room)
    }
}

/// Split `[from, to)` at multiples of `cycle`.
///
/// Yields `(offset, position in cycle, length, room)` per piece, with the
/// offset measured from `from`.
pub fn split_cycle(from: f64, to: f64, cycle: f64) -> Vec<(f64, f64, f64, f64)> {
    let mut pieces = Vec::new();
    let mut cur = from;
    while to - cur > BEAT_EPSILON {
        let (pos, room) = cycle_position(cur, cycle);
        let len = (to - cur).min(room);
        pieces.push((cur - from, pos, len, room));
        cur += len;
    }
    pieces
}

/// Maps unwrapped transport beats onto content beats.
#[derive(Debug, Clone, Copy)]
pub struct WindowMapper {
    loop_region: LoopRegion,
    /// Pattern length in pattern mode; `None` for the arrangement timeline.
    cycle: Option<f64>,
    step_beats: f64,
}

impl WindowMapper {
    pub fn new(loop_region: LoopRegion, cycle: Option<f64>, step_beats: f64) -> Self {
        Self {
            loop_region,
            cycle: cycle.filter(|c| *c > BEAT_EPSILON),
            step_beats,
        }
    }

    /// Content position of an unwrapped position and the beats until the
    /// mapping next jumps.
    ///
    /// The loop region is applied first, then the pattern cycle.
    pub fn map(&self, unwrapped: f64) -> (f64, f64) {
        let mut pos = self.loop_region.wrap(unwrapped);
        let mut room = f64::INFINITY;
        if self.loop_region.enabled && pos < self.loop_region.end_beats {
            room = self.loop_region.end_beats - pos;
            if room < BEAT_EPSILON {
                pos = self.loop_region.start_beats;
                room = self.loop_region.length();
            }
        }
        if let Some(cycle) = self.cycle {
            let (in_cycle, cycle_room) = cycle_position(pos, cycle);
            pos = in_cycle;
            room = room.min(cycle_room);
        }
        (pos, room)
    }

    /// Cut `[from, to)` unwrapped beats into linear segments no longer than
    /// one step. `origin_seconds` is the transport time at `from`.
    pub fn segments(&self, from: f64, to: f64, origin_seconds: f64, seconds_per_beat: f64) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut cur = from;
        while to - cur > BEAT_EPSILON {
            let (pos, room) = self.map(cur);
            let len = (to - cur).min(self.step_beats).min(room);
            out.push(Segment {
                content_start: pos,
                content_end: pos + len,
                limit: pos + room,
                origin_seconds: origin_seconds + (cur - from) * seconds_per_beat,
            });
            cur += len;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn looped(start: f64, end: f64) -> LoopRegion {
        LoopRegion {
            enabled: true,
            start_beats: start,
            end_beats: end,
        }
    }

    #[test]
    fn window_time_mapping() {
        let w = SchedulingWindow {
            start_beats: 2.0,
            end_beats: 2.5,
            limit_beats: 4.0,
            origin_seconds: 10.0,
            seconds_per_beat: 0.5,
            continuity: false,
        };
        assert_approx_eq!(w.time_of(2.0), 10.0);
        assert_approx_eq!(w.time_of(2.25), 10.125);
        assert!(w.contains(2.0));
        assert!(!w.contains(2.5));
        assert!(w.contains(2.5 - 1e-6));
    }

    #[test]
    fn cycle_position_snaps_near_boundary() {
        assert_eq!(cycle_position(4.0 - 1e-12, 4.0), (0.0, 4.0));
        let (pos, room) = cycle_position(5.0, 4.0);
        assert_approx_eq!(pos, 1.0);
        assert_approx_eq!(room, 3.0);
    }

    #[test]
    fn split_cycle_breaks_at_wrap() {
        let pieces = split_cycle(3.5, 4.5, 4.0);
        assert_eq!(pieces.len(), 2);
        assert_approx_eq!(pieces[0].1, 3.5);
        assert_approx_eq!(pieces[0].2, 0.5);
        assert_approx_eq!(pieces[1].0, 0.5);
        assert_approx_eq!(pieces[1].1, 0.0);
    }

    #[test]
    fn segments_step_by_sixteenth() {
        let mapper = WindowMapper::new(LoopRegion::default(), Some(16.0), 0.25);
        let segs = mapper.segments(0.0, 1.0, 0.0, 0.5);
        assert_eq!(segs.len(), 4);
        assert_approx_eq!(segs[3].content_start, 0.75);
        assert_approx_eq!(segs[3].origin_seconds, 0.375);
    }

    #[test]
    fn loop_wrap_splits_segment() {
        let mapper = WindowMapper::new(looped(4.0, 12.0), None, 0.25);
        let segs = mapper.segments(11.9, 12.2, 0.0, 0.5);
        assert!(segs.iter().all(|s| s.content_start >= 4.0 && s.content_end <= 12.0 + 1e-9));
        assert_approx_eq!(segs[0].content_end, 12.0);
        assert_approx_eq!(segs[1].content_start, 4.0);
        assert_approx_eq!(segs[1].content_end, 4.2);
    }

    #[test]
    fn loop_then_pattern_cycle() {
        // Loop 4..12 over a 3-beat pattern: unwrapped 12.5 -> loop 4.5 -> pattern 1.5.
        let mapper = WindowMapper::new(looped(4.0, 12.0), Some(3.0), 0.25);
        let (pos, room) = mapper.map(12.5);
        assert_approx_eq!(pos, 1.5);
        assert_approx_eq!(room, 1.5);
    }

    #[test]
    fn pattern_wrap_limits_room() {
        let mapper = WindowMapper::new(LoopRegion::default(), Some(4.0), 0.25);
        let segs = mapper.segments(3.9, 4.1, 0.0, 0.5);
        assert_eq!(segs.len(), 2);
        assert_approx_eq!(segs[0].limit, 4.0);
        assert_approx_eq!(segs[1].content_start, 0.0);
    }
}
