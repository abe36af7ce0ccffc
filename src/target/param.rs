//! Recorded parameter timeline with point evaluation.

use super::AutomatableParam;

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Set { time: f64, value: f64 },
    Linear { end_time: f64, value: f64 },
    Exponential { end_time: f64, value: f64 },
    Curve { start: f64, duration: f64, values: Vec<f64> },
}

impl Entry {
    /// Time the entry is ordered and cancelled by.
    fn key(&self) -> f64 {
        match self {
            Entry::Set { time, .. } => *time,
            Entry::Linear { end_time, .. } | Entry::Exponential { end_time, .. } => *end_time,
            Entry::Curve { start, .. } => *start,
        }
    }
}

/// An [`AutomatableParam`] that keeps its instructions and can be evaluated.
///
/// Ramps run from the previous entry's time and value to their end time, the
/// way an audio-rate parameter would render them.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTimeline {
    default: f64,
    entries: Vec<Entry>,
}

impl ParamTimeline {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            entries: Vec::new(),
        }
    }

    /// Number of instructions still on the timeline.
    pub fn scheduled_len(&self) -> usize {
        self.entries.len()
    }

    /// The parameter value at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        let mut value = self.default;
        let mut since = f64::NEG_INFINITY;
        for entry in &self.entries {
            match entry {
                Entry::Set { time: at, value: v } => {
                    if *at > time {
                        break;
                    }
                    value = *v;
                    since = *at;
                }
                Entry::Linear { end_time, value: v } => {
                    if *end_time <= time {
                        value = *v;
                        since = *end_time;
                    } else {
                        if since.is_finite() {
                            let p = (time - since) / (end_time - since);
                            return value + (v - value) * p;
                        }
                        break;
                    }
                }
                Entry::Exponential { end_time, value: v } => {
                    if *end_time <= time {
                        value = *v;
                        since = *end_time;
                    } else {
                        if since.is_finite() && value > 0.0 && *v > 0.0 {
                            let p = (time - since) / (end_time - since);
                            return value * (v / value).powf(p);
                        }
                        break;
                    }
                }
                Entry::Curve {
                    start,
                    duration,
                    values,
                } => {
                    if *start > time || values.is_empty() {
                        break;
                    }
                    let end = start + duration;
                    if time >= end || values.len() == 1 {
                        value = values[values.len() - 1];
                        since = end;
                        continue;
                    }
                    let pos = (time - start) / duration * (values.len() - 1) as f64;
                    let i = (pos.floor() as usize).min(values.len() - 2);
                    let frac = pos - i as f64;
                    return values[i] + (values[i + 1] - values[i]) * frac;
                }
            }
        }
        value
    }

    fn insert(&mut self, entry: Entry) {
        let key = entry.key();
        let at = self.entries.partition_point(|e| e.key() <= key);
        self.entries.insert(at, entry);
    }
}

impl Default for ParamTimeline {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl AutomatableParam for ParamTimeline {
    fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(Entry::Set { time, value });
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) {
        self.insert(Entry::Linear { end_time, value });
    }

    fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) {
        self.insert(Entry::Exponential { end_time, value });
    }

    fn set_value_curve_at_time(&mut self, values: &[f64], start_time: f64, duration: f64) {
        self.insert(Entry::Curve {
            start: start_time,
            duration,
            values: values.to_vec(),
        });
    }

    fn cancel_scheduled_values(&mut self, from: f64) {
        self.entries.retain(|e| e.key() < from);
    }
}
