//! Playback targets: the instruments and parameters scheduled events reach.
//!
//! The engine never owns audio objects. It resolves an instrument id or an
//! [`AutomationTarget`] through a [`TargetRegistry`] and talks to whatever
//! comes back through the [`Triggerable`] and [`AutomatableParam`] capability
//! traits.

pub mod param;

pub use param::ParamTimeline;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::content::AutomationTarget;
use crate::event::RegionStart;

/// Something that can play notes and audio regions.
pub trait Triggerable: Send {
    /// Attack at `time`, release `duration` seconds later.
    fn trigger_attack_release(&mut self, note: u8, duration: f64, time: f64, velocity: f32);

    /// Start an audio region at `time`.
    fn start_region(&mut self, region: &RegionStart, time: f64);
}

/// A parameter with a sample-accurate automation timeline.
pub trait AutomatableParam: Send {
    fn set_value_at_time(&mut self, value: f64, time: f64);
    fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: f64);
    fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: f64);
    fn set_value_curve_at_time(&mut self, values: &[f64], start_time: f64, duration: f64);
    /// Drop everything scheduled at or after `from`.
    fn cancel_scheduled_values(&mut self, from: f64);
}

/// Resolves instrument ids and automation targets.
pub trait TargetRegistry: Send {
    fn has_instrument(&self, id: &str) -> bool;
    fn has_parameter(&self, target: &AutomationTarget) -> bool;
    fn instrument_mut(&mut self, id: &str) -> Option<&mut dyn Triggerable>;
    fn parameter_mut(&mut self, target: &AutomationTarget) -> Option<&mut dyn AutomatableParam>;
}

fn lock<T>(shared: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<T: Triggerable> Triggerable for Arc<Mutex<T>> {
    fn trigger_attack_release(&mut self, note: u8, duration: f64, time: f64, velocity: f32) {
        lock(self).trigger_attack_release(note, duration, time, velocity);
    }

    fn start_region(&mut self, region: &RegionStart, time: f64) {
        lock(self).start_region(region, time);
    }
}

impl<T: AutomatableParam> AutomatableParam for Arc<Mutex<T>> {
    fn set_value_at_time(&mut self, value: f64, time: f64) {
        lock(self).set_value_at_time(value, time);
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) {
        lock(self).linear_ramp_to_value_at_time(value, end_time);
    }

    fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) {
        lock(self).exponential_ramp_to_value_at_time(value, end_time);
    }

    fn set_value_curve_at_time(&mut self, values: &[f64], start_time: f64, duration: f64) {
        lock(self).set_value_curve_at_time(values, start_time, duration);
    }

    fn cancel_scheduled_values(&mut self, from: f64) {
        lock(self).cancel_scheduled_values(from);
    }
}

/// Instruments and parameters keyed by id and target.
#[derive(Default)]
pub struct Rack {
    instruments: HashMap<String, Box<dyn Triggerable>>,
    parameters: HashMap<AutomationTarget, Box<dyn AutomatableParam>>,
}

impl Rack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument under `id`, replacing any previous one.
    pub fn add_instrument(&mut self, id: &str, instrument: Box<dyn Triggerable>) {
        self.instruments.insert(id.to_string(), instrument);
    }

    pub fn add_parameter(&mut self, target: AutomationTarget, param: Box<dyn AutomatableParam>) {
        self.parameters.insert(target, param);
    }

    pub fn remove_instrument(&mut self, id: &str) -> bool {
        self.instruments.remove(id).is_some()
    }

    /// Registered instrument ids, sorted.
    pub fn instrument_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.instruments.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl TargetRegistry for Rack {
    fn has_instrument(&self, id: &str) -> bool {
        self.instruments.contains_key(id)
    }

    fn has_parameter(&self, target: &AutomationTarget) -> bool {
        self.parameters.contains_key(target)
    }

    fn instrument_mut(&mut self, id: &str) -> Option<&mut dyn Triggerable> {
        match self.instruments.get_mut(id) {
            Some(instrument) => Some(instrument.as_mut()),
            None => None,
        }
    }

    fn parameter_mut(&mut self, target: &AutomationTarget) -> Option<&mut dyn AutomatableParam> {
        match self.parameters.get_mut(target) {
            Some(param) => Some(param.as_mut()),
            None => None,
        }
    }
}

/// A note received by a [`RecordingInstrument`].
#[derive(Debug, Clone, PartialEq)]
pub struct FiredNote {
    pub note: u8,
    pub velocity: f32,
    pub duration: f64,
    pub time: f64,
}

/// Instrument that remembers everything it was asked to play.
#[derive(Debug, Clone, Default)]
pub struct RecordingInstrument {
    notes: Vec<FiredNote>,
    regions: Vec<(RegionStart, f64)>,
}

impl RecordingInstrument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes(&self) -> Vec<FiredNote> {
        self.notes.clone()
    }

    /// Started regions with their start times.
    pub fn regions(&self) -> Vec<(RegionStart, f64)> {
        self.regions.clone()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.regions.clear();
    }
}

impl Triggerable for RecordingInstrument {
    fn trigger_attack_release(&mut self, note: u8, duration: f64, time: f64, velocity: f32) {
        self.notes.push(FiredNote {
            note,
            velocity,
            duration,
            time,
        });
    }

    fn start_region(&mut self, region: &RegionStart, time: f64) {
        self.regions.push((region.clone(), time));
    }
}
