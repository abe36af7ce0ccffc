//! Per-track trigger scheduling: step grids, piano rolls and audio regions.

use log::{debug, warn};

use super::window::{SchedulingWindow, BEAT_EPSILON};
use crate::content::{
    AudioRegion, AutomationTarget, PatternTrack, PianoRoll, StepSequence, TrackContent,
};
use crate::error::SchedulerError;
use crate::event::{EventSink, ParamInstruction, RegionStart, ScheduledEvent, Trigger};
use crate::target::TargetRegistry;
use crate::transport::NoteValue;

/// Whether any track in the group is soloed.
pub fn has_solo(tracks: &[PatternTrack]) -> bool {
    tracks.iter().any(|t| t.solo)
}

/// Audibility of a single track given the group's solo state.
///
/// With a solo active only soloed tracks play, whatever their mute flag.
/// Without one, every unmuted track plays.
pub fn is_audible(track: &PatternTrack, any_solo: bool) -> bool {
    if any_solo {
        track.solo
    } else {
        !track.muted
    }
}

/// Audibility of every track in the group, in order.
pub fn resolve_audibility(tracks: &[PatternTrack]) -> Vec<bool> {
    let any_solo = has_solo(tracks);
    tracks.iter().map(|t| is_audible(t, any_solo)).collect()
}

/// Emits trigger events for one track at a time.
#[derive(Debug, Clone, Copy)]
pub struct TrackScheduler {
    transport_swing: f32,
    swing_subdivision: NoteValue,
}

impl TrackScheduler {
    pub fn new(transport_swing: f32, swing_subdivision: NoteValue) -> Self {
        Self {
            transport_swing,
            swing_subdivision,
        }
    }

    /// Schedule a track's triggers inside `window`.
    ///
    /// Fails with `MissingTarget` when the track's instrument is not registered;
    /// nothing is submitted in that case. Returns the number of events submitted.
    pub fn schedule_track(
        &self,
        track: &PatternTrack,
        window: &SchedulingWindow,
        registry: &dyn TargetRegistry,
        sink: &mut EventSink<'_>,
    ) -> Result<usize, SchedulerError> {
        if !registry.has_instrument(&track.instrument) {
            return Err(SchedulerError::missing("instrument", track.instrument.as_str()));
        }

        let mut events = match &track.content {
            TrackContent::Steps(seq) => self.step_events(track, seq, window),
            TrackContent::PianoRoll(roll) => piano_roll_events(track, roll, window, registry),
            TrackContent::Audio(region) => region_events(track, region, window),
        };
        events.sort_by(|a, b| a.time.total_cmp(&b.time));

        let count = events.len();
        for event in events {
            sink.submit(event);
        }
        Ok(count)
    }

    /// Swing applied to a step grid: the sequence's own swing when set,
    /// otherwise the transport swing if the grid matches its subdivision.
    pub fn effective_swing(&self, seq: &StepSequence) -> f64 {
        if seq.swing > 0.0 {
            seq.swing as f64
        } else if seq.grid_resolution == self.swing_subdivision {
            self.transport_swing as f64
        } else {
            0.0
        }
    }

    fn step_events(
        &self,
        track: &PatternTrack,
        seq: &StepSequence,
        window: &SchedulingWindow,
    ) -> Vec<ScheduledEvent> {
        let step_beats = seq.grid_resolution.beats();
        if seq.steps.is_empty() || step_beats <= 0.0 {
            return Vec::new();
        }
        let step_seconds = window.seconds(step_beats);
        let swing = self.effective_swing(seq);

        let mut events = Vec::new();
        let first = ((window.start_beats - BEAT_EPSILON) / step_beats).ceil().max(0.0) as u64;
        let mut index = first;
        loop {
            let position = index as f64 * step_beats;
            if !window.contains(position) {
                if position >= window.end_beats - BEAT_EPSILON {
                    break;
                }
                index += 1;
                continue;
            }
            let step = &seq.steps[(index % seq.steps.len() as u64) as usize];
            if step.active {
                // Odd steps only.
                let swing_offset = if index % 2 == 1 {
                    step_seconds * swing
                } else {
                    0.0
                };
                events.push(
                    ScheduledEvent::trigger(
                        window.time_of(position),
                        position,
                        track.id,
                        &track.instrument,
                        Trigger::Note {
                            note: step.note,
                            velocity: step.velocity,
                            duration: step_seconds,
                        },
                    )
                    .delayed(swing_offset),
                );
            }
            index += 1;
        }
        events
    }
}

fn piano_roll_events(
    track: &PatternTrack,
    roll: &PianoRoll,
    window: &SchedulingWindow,
    registry: &dyn TargetRegistry,
) -> Vec<ScheduledEvent> {
    let mut events = Vec::new();
    for note in &roll.notes {
        let (position, remaining) = if window.contains(note.start_beats) {
            (note.start_beats, note.duration_beats)
        } else if window.continuity
            && note.start_beats < window.start_beats
            && note.end_beats() > window.start_beats + BEAT_EPSILON
        {
            // Already sounding when the window starts.
            (window.start_beats, note.end_beats() - window.start_beats)
        } else {
            continue;
        };

        let time = window.time_of(position);
        events.push(ScheduledEvent::trigger(
            time,
            position,
            track.id,
            &track.instrument,
            Trigger::Note {
                note: note.note,
                velocity: note.velocity,
                duration: window.seconds(remaining),
            },
        ));

        for (param, value) in &note.overrides {
            let target = AutomationTarget::instrument(&track.instrument, param);
            if !registry.has_parameter(&target) {
                warn!("{}: skipping override, no parameter {target}", track.id);
                continue;
            }
            events.push(ScheduledEvent::automation(
                time,
                position,
                None,
                track.id,
                target,
                ParamInstruction::SetValue(*value),
            ));
        }
    }
    events
}

fn region_events(
    track: &PatternTrack,
    region: &AudioRegion,
    window: &SchedulingWindow,
) -> Vec<ScheduledEvent> {
    let position = if window.contains(region.start_offset_beats) {
        region.start_offset_beats
    } else if window.continuity
        && region.start_offset_beats < window.start_beats
        && region.end_beats() > window.start_beats + BEAT_EPSILON
    {
        window.start_beats
    } else {
        return Vec::new();
    };

    let skipped = position - region.start_offset_beats;
    if skipped > 0.0 {
        debug!("{}: entering {} {skipped:.3} beats in", track.id, region.sample);
    }
    vec![ScheduledEvent::trigger(
        window.time_of(position),
        position,
        track.id,
        &track.instrument,
        Trigger::Region(RegionStart {
            sample: region.sample.clone(),
            offset_seconds: window.seconds(skipped),
            duration_seconds: window.seconds(region.duration_beats - skipped),
            fade_in: region.fade_in,
            fade_out: region.fade_out,
            playback_rate: region.playback_rate(),
        }),
    )]
}
