//! Lookahead window scheduler.
//!
//! Each pass schedules everything between the end of the previous pass and
//! `now + schedule_ahead`, so consecutive windows are contiguous: nothing is
//! scheduled twice and nothing falls between two passes. A pass that runs
//! before the previous horizon has been reached does nothing.
//!
//! Times are transport seconds from [`TransportClock::position_seconds`],
//! which freeze while paused. Events still pending when the transport pauses
//! fire after it resumes.

pub mod automation;
pub mod curve;
pub mod track;
pub mod window;

pub use automation::{AutomationEvaluator, Pin, CURVE_SAMPLES_PER_SECOND};
pub use curve::interpolate;
pub use track::{has_solo, is_audible, resolve_audibility, TrackScheduler};
pub use window::{SchedulingWindow, WindowMapper, BEAT_EPSILON};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::content::{ContentLibrary, LaneId, Pattern, PatternId, PlaylistInstance};
use crate::error::SchedulerError;
use crate::event::{EventOwner, EventSink, HandleLedger, PrecisionEventQueue};
use crate::target::TargetRegistry;
use crate::transport::{TransportClock, SIXTEENTH_BEATS};
use window::split_cycle;

/// Default lookahead in seconds.
pub const DEFAULT_SCHEDULE_AHEAD: f64 = 0.1;

/// Tolerance for comparing transport times.
const TIME_EPSILON: f64 = 1e-9;

/// Tolerance for deciding whether a window continues the previous one.
const CONTINUITY_EPSILON: f64 = 1e-6;

/// Which content source drives playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Loop the active pattern.
    #[default]
    Pattern,
    /// Play the arrangement of pattern instances.
    Playlist,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Pattern => write!(f, "pattern"),
            PlaybackMode::Playlist => write!(f, "playlist"),
        }
    }
}

/// A span of transport time already scheduled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// Outcome of one call to [`WindowScheduler::schedule_next_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassReport {
    /// The window scheduled, or `None` when the pass was skipped.
    pub window: Option<TimeRange>,
    pub scheduled: usize,
    /// Track schedulings that failed and were skipped.
    pub skipped_tracks: usize,
    pub segments: usize,
}

impl PassReport {
    pub fn ran(&self) -> bool {
        self.window.is_some()
    }
}

/// Everything one pass reads and writes.
pub struct ScheduleContext<'a> {
    pub clock: &'a TransportClock,
    pub content: &'a ContentLibrary,
    pub mode: PlaybackMode,
    pub queue: &'a mut dyn PrecisionEventQueue,
    pub registry: &'a dyn TargetRegistry,
}

/// Identifies a stream of content for continuity tracking.
///
/// Playlist instances are keyed by what they play and where, so inserting
/// or removing other instances does not move their history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SourceKey {
    Pattern(PatternId),
    Instance { pattern: PatternId, start_bits: u64 },
}

impl SourceKey {
    fn instance(instance: &PlaylistInstance) -> Self {
        SourceKey::Instance {
            pattern: instance.pattern_id,
            start_bits: instance.start_time_beats.to_bits(),
        }
    }
}

/// The lookahead engine.
#[derive(Debug)]
pub struct WindowScheduler {
    schedule_ahead: f64,
    step_beats: f64,
    next_schedule_time: Option<f64>,
    /// Set after a soft reschedule: the next pass continues the content
    /// already heard instead of re-establishing it.
    resuming: bool,
    ranges: Vec<TimeRange>,
    ledger: HandleLedger,
    content_ends: HashMap<SourceKey, f64>,
    automation: AutomationEvaluator,
}

impl WindowScheduler {
    pub fn new(schedule_ahead: f64, step_beats: f64, curve_samples_per_second: f64) -> Self {
        Self {
            schedule_ahead,
            step_beats,
            next_schedule_time: None,
            resuming: false,
            ranges: Vec::new(),
            ledger: HandleLedger::new(),
            content_ends: HashMap::new(),
            automation: AutomationEvaluator::new(curve_samples_per_second),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.schedule_ahead_seconds,
            config.pattern_step_beats,
            config.curve_samples_per_second,
        )
    }

    pub fn schedule_ahead(&self) -> f64 {
        self.schedule_ahead
    }

    /// Transport time the next window starts at, if a pass has run since the last reset.
    pub fn next_schedule_time(&self) -> Option<f64> {
        self.next_schedule_time
    }

    /// Retained scheduled ranges, coalesced.
    pub fn scheduled_ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    /// Handles retained for cancellation.
    pub fn scheduled_event_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn automation(&self) -> &AutomationEvaluator {
        &self.automation
    }

    /// Schedule the next window, if its start has been reached.
    pub fn schedule_next_events(&mut self, ctx: ScheduleContext<'_>) -> Result<PassReport, SchedulerError> {
        let now = ctx.clock.position_seconds();
        self.ledger.prune_fired(&*ctx.queue);
        self.prune_ranges(now);

        let start = match self.next_schedule_time {
            Some(next) if now < next => return Ok(PassReport::default()),
            Some(next) => next,
            None => now,
        };
        let end = now + self.schedule_ahead;

        if let Some(last) = self.ranges.last() {
            if start < last.end - TIME_EPSILON {
                error!(
                    "window [{start:.6}, {end:.6}) overlaps range scheduled up to {:.6}",
                    last.end
                );
                debug_assert!(false, "overlapping scheduling window");
                return Err(SchedulerError::SchedulingConflict {
                    start,
                    end,
                    scheduled_end: last.end,
                });
            }
        }

        let clock = ctx.clock;
        let spb = clock.seconds_per_beat();
        let from = clock.beats_at_seconds(start);
        let to = clock.beats_at_seconds(end);

        let report = {
            let mut pass = Pass {
                sink: EventSink::new(ctx.queue, &mut self.ledger),
                automation: &mut self.automation,
                content_ends: &mut self.content_ends,
                seen: HashSet::new(),
                resuming: self.resuming,
                tracks: TrackScheduler::new(clock.swing(), clock.swing_subdivision()),
                registry: ctx.registry,
                spb,
                report: PassReport {
                    window: Some(TimeRange { start, end }),
                    ..PassReport::default()
                },
            };

            match ctx.mode {
                PlaybackMode::Pattern => {
                    let pattern = ctx
                        .content
                        .active_pattern()
                        .ok_or(SchedulerError::NoActivePattern)?;
                    let mapper = WindowMapper::new(clock.loop_region(), Some(pattern.length_beats), self.step_beats);
                    pass.run_pattern(pattern, &mapper, from, to, start);
                }
                PlaybackMode::Playlist => {
                    if ctx.content.playlist().is_empty() {
                        return Err(SchedulerError::EmptyPlaylist);
                    }
                    let mapper = WindowMapper::new(clock.loop_region(), None, self.step_beats);
                    pass.run_playlist(ctx.content, &mapper, from, to, start);
                }
            }
            pass.report
        };
        self.record_range(start, end);
        self.next_schedule_time = Some(end);
        self.resuming = false;
        trace!(
            "pass [{start:.4}, {end:.4}) beats [{from:.3}, {to:.3}): {} events, {} segments, {} skipped",
            report.scheduled,
            report.segments,
            report.skipped_tracks
        );
        Ok(report)
    }

    /// Cancel every pending event and forget all scheduling progress.
    ///
    /// The next pass starts at the transport's position at that time. A no-op
    /// when nothing is scheduled.
    pub fn clear_scheduled_events(&mut self, queue: &mut dyn PrecisionEventQueue) {
        let cancelled = self.ledger.cancel_all(queue);
        if cancelled > 0 {
            debug!("cleared {cancelled} scheduled events");
        }
        self.ranges.clear();
        self.next_schedule_time = None;
        self.content_ends.clear();
        self.resuming = false;
    }

    /// [`clear_scheduled_events`](Self::clear_scheduled_events) plus dropping live pins.
    pub fn reset(&mut self, queue: &mut dyn PrecisionEventQueue) {
        self.clear_scheduled_events(queue);
        self.automation.clear_pins();
    }

    /// Cancel events from `now` on and schedule again from `now`, continuing
    /// the content already heard. Used when the tempo or loop changes under
    /// a playing transport.
    pub fn reschedule_from(&mut self, now: f64, queue: &mut dyn PrecisionEventQueue) {
        let cancelled = self.ledger.cancel_from(now, queue);
        debug!("rescheduling from {now:.4}s, {cancelled} events withdrawn");
        self.ranges.clear();
        self.next_schedule_time = None;
        self.resuming = true;
    }

    /// Write a live value to a lane's parameter from `time` (default `now`).
    ///
    /// Pending events of that lane from `time` on are cancelled and the value
    /// is pinned until a later programmed point is scheduled.
    #[allow(clippy::too_many_arguments)]
    pub fn update_automation_value(
        &mut self,
        lane_id: LaneId,
        value: f64,
        time: Option<f64>,
        now: f64,
        content: &ContentLibrary,
        queue: &mut dyn PrecisionEventQueue,
        registry: &mut dyn TargetRegistry,
    ) -> Result<(), SchedulerError> {
        let (_, lane) = content
            .lane(lane_id)
            .ok_or_else(|| SchedulerError::missing("lane", lane_id.to_string()))?;
        if !registry.has_parameter(&lane.target) {
            return Err(SchedulerError::missing(lane.target.kind(), lane.target.to_string()));
        }
        let time = time.unwrap_or(now);
        let cancelled = self
            .ledger
            .cancel_owner_from(EventOwner::Lane(lane_id), time, queue);
        self.automation.apply_live_value(lane, value, time, registry)?;
        debug!("{lane_id}: live value {value} at {time:.4}s, {cancelled} events withdrawn");
        Ok(())
    }

    fn record_range(&mut self, start: f64, end: f64) {
        match self.ranges.last_mut() {
            Some(last) if last.end >= start - TIME_EPSILON => last.end = last.end.max(end),
            _ => self.ranges.push(TimeRange { start, end }),
        }
    }

    fn prune_ranges(&mut self, now: f64) {
        let horizon = now - self.schedule_ahead;
        self.ranges.retain(|r| r.end > horizon);
    }
}

impl Default for WindowScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEDULE_AHEAD, SIXTEENTH_BEATS, CURVE_SAMPLES_PER_SECOND)
    }
}

/// State borrowed for the duration of one pass.
struct Pass<'a> {
    sink: EventSink<'a>,
    automation: &'a mut AutomationEvaluator,
    content_ends: &'a mut HashMap<SourceKey, f64>,
    seen: HashSet<SourceKey>,
    resuming: bool,
    tracks: TrackScheduler,
    registry: &'a dyn TargetRegistry,
    spb: f64,
    report: PassReport,
}

impl Pass<'_> {
    fn run_pattern(&mut self, pattern: &Pattern, mapper: &WindowMapper, from: f64, to: f64, origin: f64) {
        let audible = resolve_audibility(&pattern.tracks);
        for seg in mapper.segments(from, to, origin, self.spb) {
            let window = self.window(
                SourceKey::Pattern(pattern.id),
                seg.content_start,
                seg.content_end,
                seg.limit,
                seg.origin_seconds,
            );
            self.run_tracks(pattern, &audible, &window);
        }
    }

    fn run_playlist(&mut self, content: &ContentLibrary, mapper: &WindowMapper, from: f64, to: f64, origin: f64) {
        let instances: Vec<(SourceKey, &PlaylistInstance, &Arc<Pattern>, Vec<bool>)> = content
            .playlist()
            .iter()
            .enumerate()
            .filter_map(|(index, instance)| match content.pattern(instance.pattern_id) {
                Some(pattern) => Some((
                    SourceKey::instance(instance),
                    instance,
                    pattern,
                    resolve_audibility(&pattern.tracks),
                )),
                None => {
                    warn!("playlist entry {index}: {} not found, skipped", instance.pattern_id);
                    None
                }
            })
            .collect();

        for seg in mapper.segments(from, to, origin, self.spb) {
            for (key, instance, pattern, audible) in &instances {
                let Some((a, b)) = instance.overlap(seg.content_start, seg.content_end) else {
                    continue;
                };
                let local_from = a - instance.start_time_beats;
                let local_to = b - instance.start_time_beats;
                let instance_room = instance.end_beats() - a;
                let segment_room = seg.limit - a;
                let origin = seg.origin_seconds + (a - seg.content_start) * self.spb;

                let pieces = if pattern.length_beats > BEAT_EPSILON {
                    split_cycle(local_from, local_to, pattern.length_beats)
                } else {
                    vec![(0.0, local_from, local_to - local_from, f64::INFINITY)]
                };
                for (offset, position, length, room) in pieces {
                    let limit = position + room.min(instance_room - offset).min(segment_room - offset);
                    let window = self.window(
                        *key,
                        position,
                        position + length,
                        limit,
                        origin + offset * self.spb,
                    );
                    self.run_tracks(pattern, audible, &window);
                }
            }
        }
    }

    /// Build the window for a segment and update continuity tracking.
    fn window(&mut self, key: SourceKey, start: f64, end: f64, limit: f64, origin: f64) -> SchedulingWindow {
        let first_in_pass = self.seen.insert(key);
        let continuity = match self.content_ends.get(&key) {
            Some(previous) => {
                (previous - start).abs() > CONTINUITY_EPSILON && !(self.resuming && first_in_pass)
            }
            None => true,
        };
        self.content_ends.insert(key, end);
        SchedulingWindow {
            start_beats: start,
            end_beats: end,
            limit_beats: limit,
            origin_seconds: origin,
            seconds_per_beat: self.spb,
            continuity,
        }
    }

    fn run_tracks(&mut self, pattern: &Pattern, audible: &[bool], window: &SchedulingWindow) {
        for (track, audible) in pattern.tracks.iter().zip(audible) {
            if *audible {
                match self
                    .tracks
                    .schedule_track(track, window, self.registry, &mut self.sink)
                {
                    Ok(n) => self.report.scheduled += n,
                    Err(e) => {
                        warn!("{} {}: {e}", pattern.id, track.id);
                        self.report.skipped_tracks += 1;
                    }
                }
            }
            self.report.scheduled +=
                self.automation
                    .schedule_automation(track, window, self.registry, &mut self.sink);
        }
        self.report.segments += 1;
    }
}
