//! Integration tests for the lookahead scheduling path.
//!
//! Tests drive the transport with a manual clock: passes → event queue →
//! recorded triggers. No audio hardware or wall-clock sleeps involved.

use std::sync::{Arc, Mutex, RwLock};

use assert_approx_eq::assert_approx_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use lookahead::config::EngineConfig;
use lookahead::event::PrecisionEventQueue;
use lookahead::content::{
    AutomationLane, AutomationPoint, AutomationTarget, ContentLibrary, Curve, LaneId, NoteEvent,
    Pattern, PatternId, PatternTrack, PianoRoll, PlaylistInstance, Step, StepSequence,
    TrackContent, TrackId,
};
use lookahead::error::SchedulerError;
use lookahead::event::{EventAction, EventQueue, ScheduledEvent, Trigger};
use lookahead::playback::PlaybackController;
use lookahead::scheduler::{PlaybackMode, ScheduleContext, WindowScheduler};
use lookahead::target::{ParamTimeline, Rack, RecordingInstrument};
use lookahead::transport::{ManualClock, NoteValue, PlayState, TransportClock, SIXTEENTH_BEATS};

const SEED: u64 = 42;

/// Hats on every sixteenth, a bass line with a note held across the bar
/// line, and a gain ramp.
fn groove(id: u32) -> Pattern {
    let hats = vec![Step::on(42, 0.6); 16];
    let bass = PianoRoll {
        notes: vec![
            NoteEvent::new(36, 0.0, 0.5, 0.9),
            NoteEvent::new(43, 1.5, 1.0, 0.8),
            NoteEvent::new(41, 3.5, 1.0, 0.8),
        ],
    };
    let ramp = AutomationLane::new(
        LaneId(id),
        AutomationTarget::mixer("keys", "gain"),
        vec![
            AutomationPoint::new(0.0, 0.1, Curve::Linear),
            AutomationPoint::new(2.0, 0.9, Curve::Sine),
            AutomationPoint::new(3.0, 0.5, Curve::Instant),
        ],
    );
    Pattern::new(PatternId(id), 4.0)
        .with_track(PatternTrack::new(
            TrackId(0),
            "kit",
            TrackContent::Steps(StepSequence::new(hats, NoteValue::Sixteenth)),
        ))
        .with_track(PatternTrack::new(TrackId(1), "keys", TrackContent::PianoRoll(bass)).with_lane(ramp))
}

fn rack() -> Rack {
    let mut rack = Rack::new();
    rack.add_instrument("kit", Box::new(RecordingInstrument::new()));
    rack.add_instrument("keys", Box::new(RecordingInstrument::new()));
    rack.add_parameter(AutomationTarget::mixer("keys", "gain"), Box::new(ParamTimeline::new(0.0)));
    rack
}

/// Scheduler, clock and queue wired together without a controller.
struct Engine {
    source: Arc<ManualClock>,
    clock: TransportClock,
    content: ContentLibrary,
    mode: PlaybackMode,
    queue: EventQueue,
    rack: Rack,
    scheduler: WindowScheduler,
}

impl Engine {
    fn new(content: ContentLibrary, mode: PlaybackMode, schedule_ahead: f64) -> Self {
        let source = Arc::new(ManualClock::new());
        Self {
            clock: TransportClock::new(source.clone()),
            source,
            content,
            mode,
            queue: EventQueue::new(),
            rack: rack(),
            scheduler: WindowScheduler::new(schedule_ahead, SIXTEENTH_BEATS, 100.0),
        }
    }

    fn pass(&mut self) {
        self.scheduler
            .schedule_next_events(ScheduleContext {
                clock: &self.clock,
                content: &self.content,
                mode: self.mode,
                queue: &mut self.queue,
                registry: &self.rack,
            })
            .unwrap();
    }

    /// Pending events before `cutoff`, as comparable keys.
    fn events_before(&self, cutoff: f64) -> Vec<(i64, String)> {
        let mut keys: Vec<(i64, String)> = self
            .queue
            .pending()
            .filter(|e| e.time < cutoff)
            .map(key)
            .collect();
        keys.sort();
        keys
    }
}

fn key(event: &ScheduledEvent) -> (i64, String) {
    let label = match &event.action {
        EventAction::Trigger {
            instrument,
            trigger: Trigger::Note { note, .. },
            ..
        } => format!("{instrument}:{note}"),
        EventAction::Trigger {
            instrument,
            trigger: Trigger::Region(region),
            ..
        } => format!("{instrument}:{}", region.sample),
        EventAction::Automation { target, .. } => target.to_string(),
    };
    ((event.time * 1e6).round() as i64, label)
}

/// Schedule `seconds` of playback in one pass, then again with many short
/// passes at jittered intervals, and compare.
fn assert_jitter_matches_single_pass(content: ContentLibrary, mode: PlaybackMode, setup: fn(&mut TransportClock)) {
    let seconds = 6.0;
    let cutoff = seconds - 0.2;

    let mut reference = Engine::new(content.clone(), mode, seconds);
    setup(&mut reference.clock);
    reference.clock.start(None).unwrap();
    reference.pass();
    let expected = reference.events_before(cutoff);
    assert!(!expected.is_empty());

    for seed in SEED..SEED + 8 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut jittered = Engine::new(content.clone(), mode, 0.1);
        setup(&mut jittered.clock);
        jittered.clock.start(None).unwrap();
        while jittered.clock.position_seconds() < seconds {
            jittered.pass();
            jittered.source.advance(rng.gen_range(0.001..0.099));
        }
        assert_eq!(jittered.events_before(cutoff), expected, "seed {seed}");
    }
}

#[test]
fn jittered_passes_schedule_each_event_once_in_pattern_mode() {
    let mut content = ContentLibrary::new();
    content.insert_pattern(groove(1));
    assert_jitter_matches_single_pass(content, PlaybackMode::Pattern, |_| {});
}

#[test]
fn jittered_passes_schedule_each_event_once_across_loop_wraps() {
    let mut content = ContentLibrary::new();
    content.insert_pattern(groove(1));
    assert_jitter_matches_single_pass(content, PlaybackMode::Pattern, |clock| {
        clock.set_loop_points(1.0, 3.5).unwrap();
        clock.set_loop(true);
    });
}

#[test]
fn jittered_passes_schedule_each_event_once_in_playlist_mode() {
    let mut content = ContentLibrary::new();
    content.insert_pattern(groove(1));
    content.insert_pattern(groove(2));
    content.add_instance(PlaylistInstance::new(PatternId(1), 0.0, 6.0));
    content.add_instance(PlaylistInstance::new(PatternId(2), 6.0, 4.0));
    content.add_instance(PlaylistInstance::new(PatternId(1), 9.0, 3.0));
    assert_jitter_matches_single_pass(content, PlaybackMode::Playlist, |_| {});
}

#[test]
fn odd_steps_are_swung() {
    let steps = vec![Step::on(42, 1.0); 4];
    let pattern = Pattern::new(PatternId(1), 1.0).with_track(PatternTrack::new(
        TrackId(0),
        "kit",
        TrackContent::Steps(StepSequence::new(steps, NoteValue::Sixteenth)),
    ));
    let mut content = ContentLibrary::new();
    content.insert_pattern(pattern);

    let mut engine = Engine::new(content, PlaybackMode::Pattern, 0.45);
    engine.clock.set_swing(0.5).unwrap();
    engine.clock.start(None).unwrap();
    engine.pass();

    let mut times: Vec<f64> = engine.queue.pending().map(|e| e.time).collect();
    times.sort_by(f64::total_cmp);
    // One sixteenth is 0.125 s at 120 BPM; odd steps move by half a step.
    assert_eq!(times.len(), 4, "{times:?}");
    assert_approx_eq!(times[0], 0.0);
    assert_approx_eq!(times[1], 0.1875);
    assert_approx_eq!(times[2], 0.25);
    assert_approx_eq!(times[3], 0.4375);
}

/// Controller with shared recording instruments and a 60 Hz frame loop.
struct Session {
    source: Arc<ManualClock>,
    kit: Arc<Mutex<RecordingInstrument>>,
    content: Arc<RwLock<ContentLibrary>>,
    controller: PlaybackController,
}

impl Session {
    fn new(content: ContentLibrary) -> Self {
        let source = Arc::new(ManualClock::new());
        let kit = Arc::new(Mutex::new(RecordingInstrument::new()));
        let mut rack = Rack::new();
        rack.add_instrument("kit", Box::new(kit.clone()));
        rack.add_instrument("keys", Box::new(RecordingInstrument::new()));
        rack.add_parameter(AutomationTarget::mixer("keys", "gain"), Box::new(ParamTimeline::new(0.0)));
        let content = Arc::new(RwLock::new(content));
        let controller = PlaybackController::new(
            &EngineConfig::default(),
            source.clone(),
            EventQueue::new(),
            Box::new(rack),
            Box::new(content.clone()),
        )
        .unwrap();
        Self {
            source,
            kit,
            content,
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

    fn kit_notes(&self) -> Vec<(u8, f64)> {
        self.kit
            .lock()
            .unwrap()
            .notes()
            .iter()
            .map(|n| (n.note, n.time))
            .collect()
    }
}

/// Sixteen beats of sixteenths, each step playing its own note number.
fn numbered_steps() -> ContentLibrary {
    let steps = (0..64).map(|i| Step::on(i as u8, 1.0)).collect();
    let mut content = ContentLibrary::new();
    content.insert_pattern(Pattern::new(PatternId(1), 16.0).with_track(PatternTrack::new(
        TrackId(0),
        "kit",
        TrackContent::Steps(StepSequence::new(steps, NoteValue::Sixteenth)),
    )));
    content
}

#[test]
fn loop_wrap_plays_only_loop_content() {
    let mut session = Session::new(numbered_steps());
    session.controller.set_loop_points(4.0, 8.0).unwrap();
    session.controller.set_loop(true);
    session.controller.seek(7.5).unwrap();
    session.controller.start().unwrap();
    session.run(3.0);

    let notes = session.kit_notes();
    // 3 s at 120 BPM is 24 sixteenths, minus the last frame's remainder.
    assert!(notes.len() >= 23, "{notes:?}");
    assert!(notes.iter().all(|(note, _)| (16..32).contains(note)), "{notes:?}");
    assert_eq!(notes[0].0, 30);
    assert_eq!(notes[2].0, 16);
    for pair in notes.windows(2) {
        assert_approx_eq!(pair[1].1 - pair[0].1, 0.125);
    }
}

#[test]
fn stop_then_restart_plays_from_the_top() {
    let mut session = Session::new(numbered_steps());
    session.controller.start().unwrap();
    session.run(1.0);
    session.controller.stop();
    assert_eq!(session.controller.queue().pending_count(), 0);

    session.kit.lock().unwrap().clear();
    session.controller.start().unwrap();
    session.run(0.3);
    let notes = session.kit_notes();
    assert_eq!(notes[0], (0, 0.0));
}

#[test]
fn seek_backwards_leaves_no_ghost_notes() {
    let mut session = Session::new(numbered_steps());
    session.controller.start().unwrap();
    session.run(2.0);
    session.kit.lock().unwrap().clear();

    session.controller.seek(1.0).unwrap();
    session.run(0.5);
    let notes = session.kit_notes();
    assert!(!notes.is_empty());
    assert_eq!(notes[0].0, 4);
    assert!(notes.iter().all(|(note, _)| (4..9).contains(note)), "{notes:?}");
}

#[test]
fn seek_cancels_due_events_that_have_not_fired() {
    let mut session = Session::new(numbered_steps());
    session.controller.start().unwrap();
    session.controller.poll().unwrap();
    session.source.advance(0.5);
    session.controller.poll().unwrap();
    // Nothing fired yet: the downbeat is overdue but still queued.
    assert!(session.controller.scheduler().scheduled_event_count() > 0);

    session.controller.seek(2.0).unwrap();
    assert_eq!(session.controller.queue().pending_count(), 0);
    assert_eq!(session.controller.scheduler().scheduled_event_count(), 0);

    session.run(0.3);
    let notes = session.kit_notes();
    assert!(!notes.is_empty());
    assert_eq!(notes[0].0, 8);
    assert_approx_eq!(notes[0].1, 1.0);
    assert!(notes.iter().all(|(note, time)| *note >= 8 && *time >= 1.0 - 1e-9), "{notes:?}");
}

#[test]
fn mode_switch_while_playing_restarts_in_new_mode() {
    let mut content = numbered_steps();
    let steps = vec![Step::on(100, 1.0); 16];
    content.insert_pattern(Pattern::new(PatternId(2), 4.0).with_track(PatternTrack::new(
        TrackId(0),
        "kit",
        TrackContent::Steps(StepSequence::new(steps, NoteValue::Sixteenth)),
    )));
    content.add_instance(PlaylistInstance::new(PatternId(2), 0.0, 4.0));
    let mut session = Session::new(content);

    session.controller.start().unwrap();
    session.run(0.5);
    session.controller.switch_mode(PlaybackMode::Playlist).unwrap();
    assert_eq!(session.controller.status().state, PlayState::Playing);
    session.kit.lock().unwrap().clear();
    session.run(0.5);

    let notes = session.kit_notes();
    assert!(!notes.is_empty());
    assert!(notes.iter().all(|(note, _)| *note == 100), "{notes:?}");
}

#[test]
fn removing_the_active_pattern_stops_playback() {
    let mut session = Session::new(numbered_steps());
    session.controller.start().unwrap();
    session.run(0.2);
    session.content.write().unwrap().remove_pattern(PatternId(1));
    session.source.advance(0.1);

    let mut errors = Vec::new();
    for _ in 0..4 {
        if let Err(e) = session.controller.poll() {
            errors.push(e);
        }
        session.source.advance(1.0 / 60.0);
    }
    assert_eq!(errors, vec![SchedulerError::NoActivePattern]);
    assert_eq!(session.controller.status().state, PlayState::Stopped);
    assert_eq!(session.controller.queue().pending_count(), 0);
    assert_eq!(session.controller.scheduler().scheduled_event_count(), 0);
}

#[test]
fn tap_tempo_estimates_and_times_out() {
    let mut session = Session::new(numbered_steps());
    session.controller.set_tempo(100.0).unwrap();
    session.controller.tap_tempo();
    session.source.advance(0.5);
    session.controller.tap_tempo();
    session.source.advance(0.5);
    assert_approx_eq!(session.controller.tap_tempo(), 120.0);
    assert_approx_eq!(session.controller.status().tempo_bpm, 100.0);

    session.source.advance(3.1);
    assert_approx_eq!(session.controller.tap_tempo(), 100.0);
}
