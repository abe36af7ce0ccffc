//! Musical content read by the scheduler: patterns, tracks, automation and
//! playlist placements.
//!
//! Content is owned by editing collaborators. The scheduler only ever reads
//! it, through an `Arc` snapshot taken once per scheduling pass.

pub mod store;

pub use store::{ContentLibrary, ContentStore};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::NoteValue;

/// Identifies a pattern in the content library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub u32);

/// Identifies a track within a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

/// Identifies an automation lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(pub u32);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pattern#{}", self.0)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane#{}", self.0)
    }
}

/// One cell of a step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub active: bool,
    /// MIDI note number (0–127).
    pub note: u8,
    /// Velocity in the range 0.0–1.0.
    pub velocity: f32,
}

impl Step {
    pub fn on(note: u8, velocity: f32) -> Self {
        Self {
            active: true,
            note,
            velocity,
        }
    }

    pub fn off() -> Self {
        Self {
            active: false,
            note: 0,
            velocity: 0.0,
        }
    }
}

/// A fixed grid of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSequence {
    pub steps: Vec<Step>,
    pub grid_resolution: NoteValue,
    /// Swing amount in 0.0–1.0; zero defers to the transport swing.
    #[serde(default)]
    pub swing: f32,
}

impl StepSequence {
    pub fn new(steps: Vec<Step>, grid_resolution: NoteValue) -> Self {
        Self {
            steps,
            grid_resolution,
            swing: 0.0,
        }
    }

    /// Beats covered by the grid.
    pub fn length_beats(&self) -> f64 {
        self.steps.len() as f64 * self.grid_resolution.beats()
    }
}

/// A single note in a piano roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub note: u8,
    pub start_beats: f64,
    pub duration_beats: f64,
    pub velocity: f32,
    /// Instrument parameter values applied at the note's start.
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

impl NoteEvent {
    pub fn new(note: u8, start_beats: f64, duration_beats: f64, velocity: f32) -> Self {
        Self {
            note,
            start_beats,
            duration_beats,
            velocity,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, param: &str, value: f64) -> Self {
        self.overrides.insert(param.to_string(), value);
        self
    }

    pub fn end_beats(&self) -> f64 {
        self.start_beats + self.duration_beats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PianoRoll {
    pub notes: Vec<NoteEvent>,
}

/// A sample placed inside a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRegion {
    pub sample: String,
    pub start_offset_beats: f64,
    pub duration_beats: f64,
    /// Fade-in length in seconds.
    #[serde(default)]
    pub fade_in: f64,
    /// Fade-out length in seconds.
    #[serde(default)]
    pub fade_out: f64,
    #[serde(default)]
    pub time_stretch: bool,
    /// Pitch shift in semitones, honoured when `time_stretch` is set.
    #[serde(default)]
    pub pitch: f64,
}

impl AudioRegion {
    pub fn new(sample: &str, start_offset_beats: f64, duration_beats: f64) -> Self {
        Self {
            sample: sample.to_string(),
            start_offset_beats,
            duration_beats,
            fade_in: 0.0,
            fade_out: 0.0,
            time_stretch: false,
            pitch: 0.0,
        }
    }

    pub fn end_beats(&self) -> f64 {
        self.start_offset_beats + self.duration_beats
    }

    /// Playback rate: `2^(pitch/12)` when time-stretch is on, otherwise 1.
    pub fn playback_rate(&self) -> f64 {
        if self.time_stretch {
            2f64.powf(self.pitch / 12.0)
        } else {
            1.0
        }
    }
}

/// What a track plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackContent {
    Steps(StepSequence),
    PianoRoll(PianoRoll),
    Audio(AudioRegion),
}

/// Interpolation shape between an automation point and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    Instant,
    #[default]
    Linear,
    Exponential,
    Logarithmic,
    Sine,
    Cosine,
    Step,
    Hold,
    Custom,
}

/// A programmed value at a point in pattern time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub time_beats: f64,
    pub value: f64,
    #[serde(default)]
    pub curve: Curve,
    /// Normalized 0–1 shape table for [`Curve::Custom`] segments.
    #[serde(default)]
    pub shape: Option<Vec<f32>>,
}

impl AutomationPoint {
    pub fn new(time_beats: f64, value: f64, curve: Curve) -> Self {
        Self {
            time_beats,
            value,
            curve,
            shape: None,
        }
    }

    pub fn custom(time_beats: f64, value: f64, shape: Vec<f32>) -> Self {
        Self {
            time_beats,
            value,
            curve: Curve::Custom,
            shape: Some(shape),
        }
    }
}

/// The parameter an automation lane drives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationTarget {
    Instrument { id: String, param: String },
    Effect { id: String, param: String },
    Mixer { id: String, param: String },
}

impl AutomationTarget {
    pub fn instrument(id: &str, param: &str) -> Self {
        Self::Instrument {
            id: id.to_string(),
            param: param.to_string(),
        }
    }

    pub fn effect(id: &str, param: &str) -> Self {
        Self::Effect {
            id: id.to_string(),
            param: param.to_string(),
        }
    }

    pub fn mixer(id: &str, param: &str) -> Self {
        Self::Mixer {
            id: id.to_string(),
            param: param.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Instrument { .. } => "instrument",
            Self::Effect { .. } => "effect",
            Self::Mixer { .. } => "mixer",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Instrument { id, .. } | Self::Effect { id, .. } | Self::Mixer { id, .. } => id,
        }
    }

    pub fn param(&self) -> &str {
        match self {
            Self::Instrument { param, .. }
            | Self::Effect { param, .. }
            | Self::Mixer { param, .. } => param,
        }
    }
}

impl fmt::Display for AutomationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind(), self.id(), self.param())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLane {
    pub id: LaneId,
    pub target: AutomationTarget,
    pub points: Vec<AutomationPoint>,
}

impl AutomationLane {
    pub fn new(id: LaneId, target: AutomationTarget, points: Vec<AutomationPoint>) -> Self {
        Self { id, target, points }
    }

    /// Points ordered by time. Ties keep their stored order.
    pub fn sorted_points(&self) -> Vec<&AutomationPoint> {
        let mut points: Vec<&AutomationPoint> = self.points.iter().collect();
        points.sort_by(|a, b| a.time_beats.total_cmp(&b.time_beats));
        points
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTrack {
    pub id: TrackId,
    #[serde(default)]
    pub name: String,
    /// Registry id of the instrument that plays this track.
    pub instrument: String,
    pub content: TrackContent,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub automation: Vec<AutomationLane>,
}

impl PatternTrack {
    pub fn new(id: TrackId, instrument: &str, content: TrackContent) -> Self {
        Self {
            id,
            name: String::new(),
            instrument: instrument.to_string(),
            content,
            muted: false,
            solo: false,
            automation: Vec::new(),
        }
    }

    pub fn with_lane(mut self, lane: AutomationLane) -> Self {
        self.automation.push(lane);
        self
    }
}

/// A loopable block of tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    #[serde(default)]
    pub name: String,
    pub tracks: Vec<PatternTrack>,
    pub length_beats: f64,
}

impl Pattern {
    pub fn new(id: PatternId, length_beats: f64) -> Self {
        Self {
            id,
            name: String::new(),
            tracks: Vec::new(),
            length_beats,
        }
    }

    pub fn with_track(mut self, track: PatternTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn track(&self, id: TrackId) -> Option<&PatternTrack> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut PatternTrack> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }
}

/// A pattern placed on the arrangement timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInstance {
    pub pattern_id: PatternId,
    pub start_time_beats: f64,
    pub duration_beats: f64,
}

impl PlaylistInstance {
    pub fn new(pattern_id: PatternId, start_time_beats: f64, duration_beats: f64) -> Self {
        Self {
            pattern_id,
            start_time_beats,
            duration_beats,
        }
    }

    pub fn end_beats(&self) -> f64 {
        self.start_time_beats + self.duration_beats
    }

    /// The part of `[start, end)` this instance covers, if any.
    pub fn overlap(&self, start: f64, end: f64) -> Option<(f64, f64)> {
        let from = start.max(self.start_time_beats);
        let to = end.min(self.end_beats());
        (from < to).then_some((from, to))
    }
}
