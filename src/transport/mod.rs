//! Transport clock: tempo, meter, swing, loop region and musical time.
//!
//! The clock anchors musical time to a [`ClockSource`]. While playing, the
//! unwrapped beat position advances linearly from the last anchor; every tempo
//! change, pause or seek re-anchors so position stays continuous. Transport
//! seconds are the time base for scheduled events: they freeze while paused
//! and never jump on loop wraps.

pub mod position;
pub mod source;
pub mod tap;

pub use position::{
    beats_to_seconds, seconds_to_beats, MusicalPosition, NoteValue, TimeSignature,
    SIXTEENTHS_PER_BEAT, SIXTEENTH_BEATS,
};
pub use source::{ClockSource, ManualClock, SystemClock};
pub use tap::TapTempo;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Slowest accepted tempo.
pub const MIN_TEMPO: f64 = 20.0;

/// Fastest accepted tempo.
pub const MAX_TEMPO: f64 = 999.0;

/// Tempo a fresh clock starts with.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Playback state of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// Loop region in beats. `end_beats > start_beats` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub enabled: bool,
    pub start_beats: f64,
    pub end_beats: f64,
}

impl LoopRegion {
    pub fn length(&self) -> f64 {
        self.end_beats - self.start_beats
    }

    /// Map an unwrapped position into the loop.
    ///
    /// Overshoot past the end carries over from the loop start, so a position
    /// of `end + 0.1` maps to `start + 0.1`.
    pub fn wrap(&self, beats: f64) -> f64 {
        if self.enabled && beats >= self.end_beats {
            self.start_beats + (beats - self.end_beats).rem_euclid(self.length())
        } else {
            beats
        }
    }

    /// Beats from the unwrapped position `beats` until the next wrap, if any.
    pub fn beats_until_wrap(&self, beats: f64) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        Some(self.end_beats - self.wrap(beats))
    }
}

impl Default for LoopRegion {
    fn default() -> Self {
        Self {
            enabled: false,
            start_beats: 0.0,
            end_beats: 16.0,
        }
    }
}

/// A read-only snapshot of the transport settings and position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
    pub swing: f32,
    pub swing_subdivision: NoteValue,
    pub loop_region: LoopRegion,
    pub position_beats: f64,
}

/// Musical transport clock.
pub struct TransportClock {
    source: Arc<dyn ClockSource>,
    state: PlayState,
    tempo_bpm: f64,
    time_signature: TimeSignature,
    swing: f32,
    swing_subdivision: NoteValue,
    loop_region: LoopRegion,
    /// Unwrapped beat position at the anchor.
    anchor_beats: f64,
    /// Transport seconds at the anchor.
    anchor_seconds: f64,
    /// Source time at the anchor.
    anchor_source: f64,
    tap: TapTempo,
}

impl TransportClock {
    /// Create a stopped clock at beat zero, 120 BPM, 4/4.
    pub fn new(source: Arc<dyn ClockSource>) -> Self {
        let anchor_source = source.now();
        Self {
            source,
            state: PlayState::Stopped,
            tempo_bpm: DEFAULT_TEMPO,
            time_signature: TimeSignature::COMMON,
            swing: 0.0,
            swing_subdivision: NoteValue::Sixteenth,
            loop_region: LoopRegion::default(),
            anchor_beats: 0.0,
            anchor_seconds: 0.0,
            anchor_source,
            tap: TapTempo::new(),
        }
    }

    /// Start (or resume) playback, optionally jumping to `at_beats` first.
    pub fn start(&mut self, at_beats: Option<f64>) -> Result<(), SchedulerError> {
        if let Some(beats) = at_beats {
            self.seek(beats)?;
        }
        if self.state != PlayState::Playing {
            self.anchor_source = self.source.now();
            self.state = PlayState::Playing;
        }
        Ok(())
    }

    /// Stop playback and rewind to the start.
    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
        self.anchor_beats = 0.0;
        self.anchor_seconds = 0.0;
        self.anchor_source = self.source.now();
    }

    /// Halt playback, keeping the current position.
    pub fn pause(&mut self) {
        if self.state == PlayState::Playing {
            self.rebase();
            self.state = PlayState::Paused;
        }
    }

    /// Move to `beats` without changing the play state.
    pub fn seek(&mut self, beats: f64) -> Result<(), SchedulerError> {
        if !beats.is_finite() || beats < 0.0 {
            return Err(SchedulerError::invalid(
                "seek position",
                format!("{beats} must be a finite, non-negative beat"),
            ));
        }
        self.anchor_beats = beats;
        self.anchor_seconds = beats_to_seconds(beats, self.tempo_bpm);
        self.anchor_source = self.source.now();
        Ok(())
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), SchedulerError> {
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
            return Err(SchedulerError::invalid(
                "tempo",
                format!("{bpm} is outside {MIN_TEMPO}..={MAX_TEMPO} BPM"),
            ));
        }
        self.rebase();
        self.tempo_bpm = bpm;
        Ok(())
    }

    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) -> Result<(), SchedulerError> {
        self.time_signature = TimeSignature::new(numerator, denominator)?;
        Ok(())
    }

    pub fn set_swing(&mut self, amount: f32) -> Result<(), SchedulerError> {
        if !(0.0..=1.0).contains(&amount) {
            return Err(SchedulerError::invalid(
                "swing",
                format!("{amount} is outside 0..=1"),
            ));
        }
        self.swing = amount;
        Ok(())
    }

    pub fn set_swing_subdivision(&mut self, subdivision: NoteValue) {
        self.swing_subdivision = subdivision;
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_region.enabled = enabled;
    }

    pub fn set_loop_points(&mut self, start_beats: f64, end_beats: f64) -> Result<(), SchedulerError> {
        if !start_beats.is_finite() || !end_beats.is_finite() || start_beats < 0.0 {
            return Err(SchedulerError::invalid(
                "loop points",
                format!("[{start_beats}, {end_beats}) must be finite and start at or after 0"),
            ));
        }
        if end_beats <= start_beats {
            return Err(SchedulerError::invalid(
                "loop points",
                format!("end {end_beats} must be after start {start_beats}"),
            ));
        }
        self.loop_region.start_beats = start_beats;
        self.loop_region.end_beats = end_beats;
        Ok(())
    }

    /// Register a tap and return the estimated tempo, or the current tempo
    /// when no estimate is available. The clock tempo itself is unchanged.
    pub fn tap_tempo(&mut self) -> f64 {
        let now_ms = self.source.now() * 1000.0;
        self.tap.tap(now_ms, self.tempo_bpm)
    }

    /// Read the tap estimate without tapping.
    pub fn tap_estimate(&mut self) -> f64 {
        let now_ms = self.source.now() * 1000.0;
        self.tap.estimate(now_ms, self.tempo_bpm)
    }

    pub fn play_state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn tempo(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn swing(&self) -> f32 {
        self.swing
    }

    pub fn swing_subdivision(&self) -> NoteValue {
        self.swing_subdivision
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    /// Monotonic transport time in seconds. Frozen while paused or stopped.
    pub fn position_seconds(&self) -> f64 {
        self.anchor_seconds + self.elapsed()
    }

    /// Beat position ignoring the loop region.
    pub fn unwrapped_beats(&self) -> f64 {
        self.anchor_beats + seconds_to_beats(self.elapsed(), self.tempo_bpm)
    }

    /// Current musical position, wrapped through the loop region when enabled.
    pub fn position_beats(&self) -> f64 {
        self.loop_region.wrap(self.unwrapped_beats())
    }

    /// Current position as bar:beat:sixteenth.
    pub fn musical_position(&self) -> MusicalPosition {
        MusicalPosition::from_beats(self.position_beats(), self.time_signature)
    }

    /// Unwrapped beat position at transport time `seconds`, at the current tempo.
    pub fn beats_at_seconds(&self, seconds: f64) -> f64 {
        self.anchor_beats + seconds_to_beats(seconds - self.anchor_seconds, self.tempo_bpm)
    }

    /// Transport time at the unwrapped beat position `beats`, at the current tempo.
    pub fn seconds_at_beats(&self, beats: f64) -> f64 {
        self.anchor_seconds + beats_to_seconds(beats - self.anchor_beats, self.tempo_bpm)
    }

    pub fn state(&self) -> TransportState {
        TransportState {
            tempo_bpm: self.tempo_bpm,
            time_signature: self.time_signature,
            swing: self.swing,
            swing_subdivision: self.swing_subdivision,
            loop_region: self.loop_region,
            position_beats: self.position_beats(),
        }
    }

    fn elapsed(&self) -> f64 {
        if self.state == PlayState::Playing {
            (self.source.now() - self.anchor_source).max(0.0)
        } else {
            0.0
        }
    }

    /// Fold elapsed time into the anchor.
    fn rebase(&mut self) {
        let elapsed = self.elapsed();
        self.anchor_beats += seconds_to_beats(elapsed, self.tempo_bpm);
        self.anchor_seconds += elapsed;
        self.anchor_source = self.source.now();
    }
}

impl std::fmt::Debug for TransportClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClock")
            .field("state", &self.state)
            .field("tempo_bpm", &self.tempo_bpm)
            .field("time_signature", &self.time_signature)
            .field("loop_region", &self.loop_region)
            .field("position_beats", &self.position_beats())
            .finish()
    }
}
