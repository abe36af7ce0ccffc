//! Automation lanes to parameter instructions.
//!
//! Each automation point starts a segment running to the next point. A point
//! inside the window emits its segment's instruction at the point's time. In a
//! continuity window the segment already in progress is re-established from
//! the window start, unless a live value has been pinned on the lane.

use std::collections::HashMap;

use log::{debug, warn};

use super::curve::{interpolate, sample_count, sample_segment};
use super::window::{SchedulingWindow, BEAT_EPSILON};
use crate::content::{AutomationLane, AutomationPoint, Curve, LaneId, PatternTrack, TrackId};
use crate::error::SchedulerError;
use crate::event::{EventSink, ParamInstruction, ScheduledEvent};
use crate::target::TargetRegistry;

/// Default value-curve resolution.
pub const CURVE_SAMPLES_PER_SECOND: f64 = 100.0;

/// A value written live, overriding the programmed curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pin {
    pub value: f64,
    pub time: f64,
}

#[derive(Debug)]
pub struct AutomationEvaluator {
    samples_per_second: f64,
    pins: HashMap<LaneId, Pin>,
}

impl AutomationEvaluator {
    pub fn new(samples_per_second: f64) -> Self {
        Self {
            samples_per_second,
            pins: HashMap::new(),
        }
    }

    pub fn pin(&self, lane: LaneId) -> Option<Pin> {
        self.pins.get(&lane).copied()
    }

    pub fn clear_pins(&mut self) {
        self.pins.clear();
    }

    /// Schedule every lane of `track` inside `window`.
    ///
    /// Lanes are independent: one whose target cannot be resolved is logged
    /// and skipped. Returns the number of events submitted.
    pub fn schedule_automation(
        &mut self,
        track: &PatternTrack,
        window: &SchedulingWindow,
        registry: &dyn TargetRegistry,
        sink: &mut EventSink<'_>,
    ) -> usize {
        let mut count = 0;
        for lane in &track.automation {
            match self.schedule_lane(track.id, lane, window, registry, sink) {
                Ok(n) => count += n,
                Err(e) => warn!("{} {}: {e}", track.id, lane.id),
            }
        }
        count
    }

    /// Schedule one lane inside `window`.
    pub fn schedule_lane(
        &mut self,
        track: TrackId,
        lane: &AutomationLane,
        window: &SchedulingWindow,
        registry: &dyn TargetRegistry,
        sink: &mut EventSink<'_>,
    ) -> Result<usize, SchedulerError> {
        if !registry.has_parameter(&lane.target) {
            return Err(SchedulerError::missing(lane.target.kind(), lane.target.to_string()));
        }
        let points = lane.sorted_points();
        if points.is_empty() {
            return Ok(0);
        }

        let mut events = Vec::new();

        if window.continuity {
            let before = points
                .iter()
                .rposition(|p| p.time_beats < window.start_beats - BEAT_EPSILON);
            if let Some(i) = before {
                let instruction = match self.pins.get(&lane.id) {
                    Some(pin) => Some(ParamInstruction::SetValue(pin.value)),
                    None => self.segment(&points, i, window.start_beats, window, lane.id),
                };
                if let Some(instruction) = instruction {
                    events.push((window.start_beats, instruction));
                }
            }
        }

        for (i, point) in points.iter().enumerate() {
            if !window.contains(point.time_beats) {
                continue;
            }
            let time = window.time_of(point.time_beats);
            if self.pins.get(&lane.id).is_some_and(|pin| time >= pin.time) {
                debug!("{}: programmed point at {time:.4}s releases pin", lane.id);
                self.pins.remove(&lane.id);
            }
            if let Some(instruction) = self.segment(&points, i, point.time_beats, window, lane.id) {
                events.push((point.time_beats, instruction));
            }
        }

        let count = events.len();
        for (beat, instruction) in events {
            sink.submit(ScheduledEvent::automation(
                window.time_of(beat),
                beat,
                Some(lane.id),
                track,
                lane.target.clone(),
                instruction,
            ));
        }
        Ok(count)
    }

    /// Record a live value for `lane` from `time` on, releasing any pending
    /// programmed values on the resolved parameter.
    pub fn apply_live_value(
        &mut self,
        lane: &AutomationLane,
        value: f64,
        time: f64,
        registry: &mut dyn TargetRegistry,
    ) -> Result<(), SchedulerError> {
        let param = registry
            .parameter_mut(&lane.target)
            .ok_or_else(|| SchedulerError::missing(lane.target.kind(), lane.target.to_string()))?;
        param.cancel_scheduled_values(time);
        param.set_value_at_time(value, time);
        self.pins.insert(lane.id, Pin { value, time });
        Ok(())
    }

    /// Instruction for the segment starting at `points[i]`, played from
    /// content position `from` up to the next point or the window's limit.
    fn segment(
        &self,
        points: &[&AutomationPoint],
        i: usize,
        from: f64,
        window: &SchedulingWindow,
        lane: LaneId,
    ) -> Option<ParamInstruction> {
        let point = points[i];
        let next = match points.get(i + 1) {
            Some(next) if next.time_beats - point.time_beats > BEAT_EPSILON => *next,
            _ => return Some(ParamInstruction::SetValue(point.value)),
        };

        let span = next.time_beats - point.time_beats;
        let to = next.time_beats.min(window.limit_beats);
        if to - from <= BEAT_EPSILON {
            return None;
        }
        let progress = ((from - point.time_beats) / span, (to - point.time_beats) / span);
        let shape = point.shape.as_deref();
        let value_at = |p: f64| interpolate(point.curve, point.value, next.value, p, shape);
        let end_time = window.time_of(to);

        match point.curve {
            Curve::Instant | Curve::Step | Curve::Hold => value_at(progress.0).map(ParamInstruction::SetValue),
            Curve::Linear => Some(ParamInstruction::LinearRamp {
                from: value_at(progress.0)?,
                to: value_at(progress.1)?,
                end_time,
            }),
            Curve::Exponential => match (value_at(progress.0), value_at(progress.1)) {
                (Some(from), Some(to)) => Some(ParamInstruction::ExponentialRamp { from, to, end_time }),
                _ => {
                    debug!("{lane}: exponential segment needs positive values, skipped");
                    None
                }
            },
            Curve::Logarithmic | Curve::Sine | Curve::Cosine | Curve::Custom => {
                let duration = window.seconds(to - from);
                let samples = sample_count(duration, self.samples_per_second);
                match sample_segment(point.curve, point.value, next.value, shape, progress, samples) {
                    Some(values) => Some(ParamInstruction::ValueCurve { values, duration }),
                    None => {
                        debug!("{lane}: {:?} segment needs positive values, skipped", point.curve);
                        None
                    }
                }
            }
        }
    }
}

impl Default for AutomationEvaluator {
    fn default() -> Self {
        Self::new(CURVE_SAMPLES_PER_SECOND)
    }
}
