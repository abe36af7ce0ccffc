//! Musical position math: time signatures, note values and bar:beat:sixteenth.
//!
//! Positions are measured in quarter-note beats as `f64`. Conversion to seconds
//! happens only at the clock boundary, using the tempo in effect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Sixteenth notes per quarter-note beat.
pub const SIXTEENTHS_PER_BEAT: u32 = 4;

/// Duration of one sixteenth note in beats.
pub const SIXTEENTH_BEATS: f64 = 1.0 / SIXTEENTHS_PER_BEAT as f64;

/// Convert a beat span to seconds at the given tempo.
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    beats * 60.0 / bpm
}

/// Convert a span in seconds to beats at the given tempo.
pub fn seconds_to_beats(seconds: f64, bpm: f64) -> f64 {
    seconds * bpm / 60.0
}

/// Time signature as numerator over denominator (e.g. 6/8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    /// Common time, 4/4.
    pub const COMMON: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// Build a time signature. Both parts must be at least 1.
    pub fn new(numerator: u8, denominator: u8) -> Result<Self, SchedulerError> {
        if numerator < 1 || denominator < 1 {
            return Err(SchedulerError::invalid(
                "time signature",
                format!("{numerator}/{denominator}: both parts must be >= 1"),
            ));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Quarter-note beats in one bar (6/8 → 3.0, 3/4 → 3.0, 7/8 → 3.5).
    pub fn beats_per_bar(self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }

    /// Index of the bar containing `beats` (0-indexed).
    pub fn bar_number(self, beats: f64) -> u64 {
        (beats.max(0.0) / self.beats_per_bar()).floor() as u64
    }

    /// The next bar boundary strictly after `beats`.
    pub fn next_bar_boundary(self, beats: f64) -> f64 {
        (self.bar_number(beats) + 1) as f64 * self.beats_per_bar()
    }

    /// Whether `beats` sits on a bar boundary (within float tolerance).
    pub fn is_on_bar_boundary(self, beats: f64) -> bool {
        let per_bar = self.beats_per_bar();
        let rem = beats.rem_euclid(per_bar);
        rem < 1e-9 || per_bar - rem < 1e-9
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

/// Rhythmic note values used for step grids and swing subdivisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    EighthTriplet,
    SixteenthTriplet,
}

impl NoteValue {
    /// Length in quarter-note beats.
    pub fn beats(self) -> f64 {
        match self {
            NoteValue::Whole => 4.0,
            NoteValue::Half => 2.0,
            NoteValue::Quarter => 1.0,
            NoteValue::Eighth => 0.5,
            NoteValue::Sixteenth => 0.25,
            NoteValue::ThirtySecond => 0.125,
            NoteValue::EighthTriplet => 1.0 / 3.0,
            NoteValue::SixteenthTriplet => 1.0 / 6.0,
        }
    }

    /// Length in seconds at the given tempo.
    pub fn to_seconds(self, bpm: f64) -> f64 {
        beats_to_seconds(self.beats(), bpm)
    }
}

/// A position expressed as bar, beat-within-bar and sixteenth-within-beat.
///
/// All fields are 0-indexed, so the downbeat of the first bar is `0:0:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat: u32,
    pub sixteenth: u32,
}

impl MusicalPosition {
    pub const ZERO: MusicalPosition = MusicalPosition {
        bar: 0,
        beat: 0,
        sixteenth: 0,
    };

    /// Decompose a beat position. Fractions below one sixteenth are dropped.
    pub fn from_beats(beats: f64, signature: TimeSignature) -> Self {
        let beats = beats.max(0.0);
        let per_bar = signature.beats_per_bar();
        let bar = (beats / per_bar).floor();
        let in_bar = beats - bar * per_bar;
        let beat = in_bar.floor();
        let sixteenth = ((in_bar - beat) * SIXTEENTHS_PER_BEAT as f64 + 1e-9).floor();
        Self {
            bar: bar as u32,
            beat: beat as u32,
            sixteenth: (sixteenth as u32).min(SIXTEENTHS_PER_BEAT - 1),
        }
    }

    /// Recompose into a beat position.
    pub fn to_beats(self, signature: TimeSignature) -> f64 {
        self.bar as f64 * signature.beats_per_bar()
            + self.beat as f64
            + self.sixteenth as f64 * SIXTEENTH_BEATS
    }

    /// Absolute sixteenth-step index from the start of the timeline.
    pub fn step_index(self, signature: TimeSignature) -> u64 {
        (self.to_beats(signature) * SIXTEENTHS_PER_BEAT as f64).round() as u64
    }
}

impl fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.bar, self.beat, self.sixteenth)
    }
}

impl FromStr for MusicalPosition {
    type Err = SchedulerError;

    /// Parse `bar:beat[:sixteenth]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(SchedulerError::invalid(
                "position",
                format!("'{s}' is not bar:beat[:sixteenth]"),
            ));
        }
        let field = |text: &str| {
            text.trim().parse::<u32>().map_err(|_| {
                SchedulerError::invalid("position", format!("'{text}' in '{s}' is not a number"))
            })
        };
        let sixteenth = match parts.get(2) {
            Some(text) => field(text)?,
            None => 0,
        };
        Ok(Self {
            bar: field(parts[0])?,
            beat: field(parts[1])?,
            sixteenth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn one_beat_at_120_is_half_a_second() {
        assert_approx_eq!(beats_to_seconds(1.0, 120.0), 0.5);
        assert_approx_eq!(seconds_to_beats(0.5, 120.0), 1.0);
    }

    #[test]
    fn beats_per_bar_for_common_signatures() {
        assert_approx_eq!(TimeSignature::COMMON.beats_per_bar(), 4.0);
        assert_approx_eq!(TimeSignature::new(3, 4).unwrap().beats_per_bar(), 3.0);
        assert_approx_eq!(TimeSignature::new(6, 8).unwrap().beats_per_bar(), 3.0);
        assert_approx_eq!(TimeSignature::new(7, 8).unwrap().beats_per_bar(), 3.5);
    }

    #[test]
    fn zero_parts_rejected() {
        assert!(TimeSignature::new(0, 4).is_err());
        assert!(TimeSignature::new(4, 0).is_err());
    }

    #[test]
    fn next_bar_from_boundary_and_mid_bar() {
        let sig = TimeSignature::COMMON;
        assert_approx_eq!(sig.next_bar_boundary(0.0), 4.0);
        assert_approx_eq!(sig.next_bar_boundary(2.0), 4.0);
        assert_approx_eq!(sig.next_bar_boundary(4.0), 8.0);
        assert_approx_eq!(sig.next_bar_boundary(3.999), 4.0);
    }

    #[test]
    fn bar_boundary_detection() {
        let sig = TimeSignature::new(3, 4).unwrap();
        assert!(sig.is_on_bar_boundary(0.0));
        assert!(sig.is_on_bar_boundary(6.0));
        assert!(!sig.is_on_bar_boundary(4.0));
        assert_eq!(sig.bar_number(5.9), 1);
    }

    #[test]
    fn position_from_beats() {
        let pos = MusicalPosition::from_beats(9.75, TimeSignature::COMMON);
        assert_eq!(
            pos,
            MusicalPosition {
                bar: 2,
                beat: 1,
                sixteenth: 3
            }
        );
        assert_approx_eq!(pos.to_beats(TimeSignature::COMMON), 9.75);
        assert_eq!(pos.step_index(TimeSignature::COMMON), 39);
    }

    #[test]
    fn position_in_waltz_time() {
        let sig = TimeSignature::new(3, 4).unwrap();
        let pos = MusicalPosition::from_beats(7.5, sig);
        assert_eq!(pos.to_string(), "2:1:2");
    }

    #[test]
    fn parse_and_display() {
        let pos: MusicalPosition = "3:2:1".parse().unwrap();
        assert_eq!(pos.to_string(), "3:2:1");
        let short: MusicalPosition = "1:3".parse().unwrap();
        assert_eq!(short.sixteenth, 0);
        assert!("banana".parse::<MusicalPosition>().is_err());
        assert!("1:x:0".parse::<MusicalPosition>().is_err());
    }

    #[test]
    fn note_value_lengths() {
        assert_approx_eq!(NoteValue::Sixteenth.beats(), SIXTEENTH_BEATS);
        assert_approx_eq!(NoteValue::Sixteenth.to_seconds(120.0), 0.125);
        assert_approx_eq!(NoteValue::EighthTriplet.beats() * 3.0, 1.0);
    }
}
