//! Integration tests for automation and track audibility.
//!
//! Content → controller → event queue → parameter timelines, evaluated after
//! the events have fired.

use std::sync::{Arc, Mutex};

use assert_approx_eq::assert_approx_eq;

use lookahead::config::EngineConfig;
use lookahead::content::{
    AutomationLane, AutomationPoint, AutomationTarget, ContentLibrary, Curve, LaneId, NoteEvent,
    Pattern, PatternId, PatternTrack, PianoRoll, Step, StepSequence, TrackContent, TrackId,
};
use lookahead::event::EventQueue;
use lookahead::playback::PlaybackController;
use lookahead::target::{ParamTimeline, Rack, RecordingInstrument};
use lookahead::transport::{ManualClock, NoteValue};

fn cutoff() -> AutomationTarget {
    AutomationTarget::instrument("synth", "cutoff")
}

struct Session {
    source: Arc<ManualClock>,
    synth: Arc<Mutex<RecordingInstrument>>,
    drums: Arc<Mutex<RecordingInstrument>>,
    cutoff: Arc<Mutex<ParamTimeline>>,
    controller: PlaybackController,
}

impl Session {
    fn new(pattern: Pattern) -> Self {
        let source = Arc::new(ManualClock::new());
        let synth = Arc::new(Mutex::new(RecordingInstrument::new()));
        let drums = Arc::new(Mutex::new(RecordingInstrument::new()));
        let cutoff_param = Arc::new(Mutex::new(ParamTimeline::new(0.0)));
        let mut rack = Rack::new();
        rack.add_instrument("synth", Box::new(synth.clone()));
        rack.add_instrument("drums", Box::new(drums.clone()));
        rack.add_parameter(cutoff(), Box::new(cutoff_param.clone()));

        let mut content = ContentLibrary::new();
        content.insert_pattern(pattern);
        let controller = PlaybackController::new(
            &EngineConfig::default(),
            source.clone(),
            EventQueue::new(),
            Box::new(rack),
            Box::new(content),
        )
        .unwrap();
        Self {
            source,
            synth,
            drums,
            cutoff: cutoff_param,
            controller,
        }
    }

    fn run(&mut self, seconds: f64) {
        for _ in 0..(seconds * 60.0).round() as usize {
            self.controller.poll().unwrap();
            self.controller.fire_due_events();
            self.source.advance(1.0 / 60.0);
        }
    }

    fn cutoff_at(&self, time: f64) -> f64 {
        self.cutoff.lock().unwrap().value_at(time)
    }
}

fn synth_track(points: Vec<AutomationPoint>) -> PatternTrack {
    PatternTrack::new(TrackId(0), "synth", TrackContent::PianoRoll(PianoRoll::default()))
        .with_lane(AutomationLane::new(LaneId(1), cutoff(), points))
}

#[test]
fn linear_ramp_then_hold() {
    let pattern = Pattern::new(PatternId(1), 8.0).with_track(synth_track(vec![
        AutomationPoint::new(0.0, 0.0, Curve::Linear),
        AutomationPoint::new(4.0, 1.0, Curve::Hold),
    ]));
    let mut session = Session::new(pattern);
    session.controller.start().unwrap();
    session.run(2.5);

    assert_approx_eq!(session.cutoff_at(0.0), 0.0);
    assert_approx_eq!(session.cutoff_at(1.0), 0.5);
    assert_approx_eq!(session.cutoff_at(2.2), 1.0);
}

#[test]
fn sine_segment_is_sampled() {
    let pattern = Pattern::new(PatternId(1), 8.0).with_track(synth_track(vec![
        AutomationPoint::new(0.0, 0.0, Curve::Sine),
        AutomationPoint::new(2.0, 1.0, Curve::Hold),
    ]));
    let mut session = Session::new(pattern);
    session.controller.start().unwrap();
    session.run(1.5);

    assert_approx_eq!(session.cutoff_at(0.5), 0.5, 0.02);
    assert!(session.cutoff_at(0.25) < 0.25);
    assert_approx_eq!(session.cutoff_at(1.2), 1.0);
}

#[test]
fn exponential_from_zero_is_skipped() {
    let pattern = Pattern::new(PatternId(1), 8.0).with_track(synth_track(vec![
        AutomationPoint::new(0.0, 0.0, Curve::Exponential),
        AutomationPoint::new(2.0, 1.0, Curve::Hold),
    ]));
    let mut session = Session::new(pattern);
    session.controller.start().unwrap();
    session.run(1.5);

    assert_eq!(session.cutoff_at(0.5), 0.0);
    assert_approx_eq!(session.cutoff_at(1.1), 1.0);
}

#[test]
fn live_value_holds_until_next_programmed_point() {
    let pattern = Pattern::new(PatternId(1), 4.0).with_track(synth_track(vec![
        AutomationPoint::new(0.0, 0.2, Curve::Linear),
        AutomationPoint::new(3.0, 0.8, Curve::Hold),
    ]));
    let mut session = Session::new(pattern);
    session.controller.start().unwrap();
    session.run(0.5);

    session.controller.update_automation_value(LaneId(1), 0.6, None).unwrap();
    let pin = session.controller.scheduler().automation().pin(LaneId(1));
    assert_eq!(pin.map(|p| p.value), Some(0.6));

    session.run(1.7);
    assert_approx_eq!(session.cutoff_at(1.0), 0.6);
    assert_approx_eq!(session.cutoff_at(1.6), 0.8);
    assert!(session.controller.scheduler().automation().pin(LaneId(1)).is_none());
    // The pattern wraps at 2 s and the programmed ramp takes over again.
    assert_approx_eq!(session.cutoff_at(2.0), 0.2);
}

#[test]
fn live_value_at_explicit_time() {
    let pattern = Pattern::new(PatternId(1), 8.0).with_track(synth_track(vec![
        AutomationPoint::new(0.0, 0.3, Curve::Instant),
    ]));
    let mut session = Session::new(pattern);
    session.controller.start().unwrap();
    session.run(0.2);
    session
        .controller
        .update_automation_value(LaneId(1), 0.9, Some(0.4))
        .unwrap();
    assert_approx_eq!(session.cutoff_at(0.3), 0.3);
    assert_approx_eq!(session.cutoff_at(0.5), 0.9);
}

#[test]
fn solo_wins_over_mute_and_automation_keeps_running() {
    let kick = |id: u32, note: u8| {
        PatternTrack::new(
            TrackId(id),
            "drums",
            TrackContent::Steps(StepSequence::new(vec![Step::on(note, 1.0)], NoteValue::Quarter)),
        )
    };
    let mut muted = synth_track(vec![AutomationPoint::new(0.0, 0.7, Curve::Instant)]);
    muted.muted = true;
    muted.content = TrackContent::PianoRoll(PianoRoll {
        notes: vec![NoteEvent::new(60, 0.0, 1.0, 0.8)],
    });
    let mut soloed = kick(1, 38);
    soloed.solo = true;
    soloed.muted = true;
    let pattern = Pattern::new(PatternId(1), 4.0)
        .with_track(muted)
        .with_track(soloed)
        .with_track(kick(2, 36));

    let mut session = Session::new(pattern);
    session.controller.start().unwrap();
    session.run(1.0);

    let drums: Vec<u8> = session.drums.lock().unwrap().notes().iter().map(|n| n.note).collect();
    assert_eq!(drums, vec![38, 38]);
    assert!(session.synth.lock().unwrap().notes().is_empty());
    assert_approx_eq!(session.cutoff_at(0.1), 0.7);
}

#[test]
fn note_overrides_set_instrument_parameters() {
    let roll = PianoRoll {
        notes: vec![
            NoteEvent::new(48, 0.0, 0.5, 0.8).with_override("cutoff", 0.25),
            NoteEvent::new(50, 1.0, 0.5, 0.8).with_override("cutoff", 0.75),
        ],
    };
    let pattern = Pattern::new(PatternId(1), 4.0).with_track(PatternTrack::new(
        TrackId(0),
        "synth",
        TrackContent::PianoRoll(roll),
    ));
    let mut session = Session::new(pattern);
    session.controller.start().unwrap();
    session.run(0.8);

    assert_eq!(session.synth.lock().unwrap().notes().len(), 2);
    assert_approx_eq!(session.cutoff_at(0.2), 0.25);
    assert_approx_eq!(session.cutoff_at(0.6), 0.75);
}
