//! Scheduled events: the value type submitted to a [`PrecisionEventQueue`].
//!
//! A [`ScheduledEvent`] carries its firing time (transport seconds), the
//! content position it was derived from, and an [`EventAction`] naming the
//! target and payload. Nothing here captures closures: the queue resolves the
//! target through a [`TargetRegistry`] only when the event fires.

pub mod ledger;
pub mod queue;

pub use ledger::{EventOwner, EventSink, HandleLedger};
pub use queue::{EventQueue, PrecisionEventQueue};

use crate::content::{AutomationTarget, LaneId, TrackId};
use crate::error::SchedulerError;
use crate::target::{AutomatableParam, TargetRegistry};

/// Opaque handle returned by a queue, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(pub u64);

/// Everything an instrument needs to start an audio region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStart {
    pub sample: String,
    /// Seconds into the sample to start from (non-zero when entering mid-region).
    pub offset_seconds: f64,
    pub duration_seconds: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    pub playback_rate: f64,
}

/// What a trigger event plays.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Attack now, release after `duration` seconds.
    Note {
        note: u8,
        velocity: f32,
        duration: f64,
    },
    Region(RegionStart),
}

/// A parameter instruction, starting at the event's time.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamInstruction {
    SetValue(f64),
    LinearRamp { from: f64, to: f64, end_time: f64 },
    ExponentialRamp { from: f64, to: f64, end_time: f64 },
    /// Evenly spaced values spread over `duration` seconds.
    ValueCurve { values: Vec<f64>, duration: f64 },
}

impl ParamInstruction {
    /// Apply this instruction to a parameter, starting at `time`.
    pub fn apply(&self, param: &mut dyn AutomatableParam, time: f64) {
        match self {
            ParamInstruction::SetValue(value) => param.set_value_at_time(*value, time),
            ParamInstruction::LinearRamp { from, to, end_time } => {
                param.set_value_at_time(*from, time);
                param.linear_ramp_to_value_at_time(*to, *end_time);
            }
            ParamInstruction::ExponentialRamp { from, to, end_time } => {
                param.set_value_at_time(*from, time);
                param.exponential_ramp_to_value_at_time(*to, *end_time);
            }
            ParamInstruction::ValueCurve { values, duration } => {
                param.set_value_curve_at_time(values, time, *duration);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    Trigger {
        track: TrackId,
        instrument: String,
        trigger: Trigger,
    },
    Automation {
        /// The lane this came from; `None` for per-note overrides.
        lane: Option<LaneId>,
        track: TrackId,
        target: AutomationTarget,
        instruction: ParamInstruction,
    },
}

/// A single event on the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    /// When the event fires, in transport seconds.
    pub time: f64,
    /// Content-relative position (pattern beats) the event was derived from.
    pub beat: f64,
    /// Transport seconds of the content slot. Equal to `time` unless the
    /// event was pushed off its grid position by swing.
    pub slot: f64,
    pub action: EventAction,
}

impl ScheduledEvent {
    pub fn trigger(time: f64, beat: f64, track: TrackId, instrument: &str, trigger: Trigger) -> Self {
        Self {
            time,
            beat,
            slot: time,
            action: EventAction::Trigger {
                track,
                instrument: instrument.to_string(),
                trigger,
            },
        }
    }

    pub fn automation(
        time: f64,
        beat: f64,
        lane: Option<LaneId>,
        track: TrackId,
        target: AutomationTarget,
        instruction: ParamInstruction,
    ) -> Self {
        Self {
            time,
            beat,
            slot: time,
            action: EventAction::Automation {
                lane,
                track,
                target,
                instruction,
            },
        }
    }

    /// Fire `offset` seconds after the slot.
    pub fn delayed(mut self, offset: f64) -> Self {
        self.time = self.slot + offset;
        self
    }

    /// Who the event is filed under for targeted cancellation.
    pub fn owner(&self) -> EventOwner {
        match &self.action {
            EventAction::Trigger { track, .. } => EventOwner::Track(*track),
            EventAction::Automation {
                lane: Some(lane), ..
            } => EventOwner::Lane(*lane),
            EventAction::Automation { track, .. } => EventOwner::Track(*track),
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self.action, EventAction::Trigger { .. })
    }

    /// Deliver the event to its target.
    pub fn dispatch(&self, registry: &mut dyn TargetRegistry) -> Result<(), SchedulerError> {
        match &self.action {
            EventAction::Trigger {
                instrument,
                trigger,
                ..
            } => {
                let target = registry
                    .instrument_mut(instrument)
                    .ok_or_else(|| SchedulerError::missing("instrument", instrument.as_str()))?;
                match trigger {
                    Trigger::Note {
                        note,
                        velocity,
                        duration,
                    } => target.trigger_attack_release(*note, *duration, self.time, *velocity),
                    Trigger::Region(region) => target.start_region(region, self.time),
                }
            }
            EventAction::Automation {
                target,
                instruction,
                ..
            } => {
                let param = registry
                    .parameter_mut(target)
                    .ok_or_else(|| SchedulerError::missing(target.kind(), target.to_string()))?;
                instruction.apply(param, self.time);
            }
        }
        Ok(())
    }
}
