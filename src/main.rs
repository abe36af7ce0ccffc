//! Lookahead: plays a pattern or an arrangement through logging instruments.
//!
//! Without `--content` a built-in two-pattern demo is played. Every fired
//! trigger is logged at info level with its transport time.

use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::{info, warn};

use lookahead::config::EngineConfig;
use lookahead::content::{
    AutomationLane, AutomationPoint, AutomationTarget, ContentLibrary, Curve, LaneId, NoteEvent,
    Pattern, PatternId, PatternTrack, PianoRoll, PlaylistInstance, Step, StepSequence,
    TrackContent, TrackId,
};
use lookahead::event::{EventQueue, RegionStart};
use lookahead::playback::PlaybackController;
use lookahead::scheduler::PlaybackMode;
use lookahead::target::{ParamTimeline, Rack, TargetRegistry, Triggerable};
use lookahead::transport::{ClockSource, NoteValue, SystemClock};

#[derive(Parser)]
#[command(name = "lookahead", version, about = "Lookahead playback scheduler demo")]
struct Cli {
    /// Tempo in BPM (overrides the config file)
    #[arg(long)]
    bpm: Option<f64>,

    /// Content source to play
    #[arg(long, value_enum, default_value_t = ModeArg::Pattern)]
    mode: ModeArg,

    /// How long to play, in seconds
    #[arg(long, default_value_t = 8.0)]
    seconds: f64,

    /// Schedule-ahead window in seconds (overrides the config file)
    #[arg(long)]
    lookahead: Option<f64>,

    /// Swing amount 0.0-1.0 applied to sixteenths
    #[arg(long)]
    swing: Option<f32>,

    /// Engine config file (default: ~/.lookahead/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// YAML content file with patterns and a playlist
    #[arg(long)]
    content: Option<PathBuf>,

    /// Log scheduling passes and state changes
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Pattern,
    Playlist,
}

impl From<ModeArg> for PlaybackMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Pattern => PlaybackMode::Pattern,
            ModeArg::Playlist => PlaybackMode::Playlist,
        }
    }
}

/// Instrument that logs what it is asked to play.
struct LoggingInstrument {
    name: String,
}

impl Triggerable for LoggingInstrument {
    fn trigger_attack_release(&mut self, note: u8, duration: f64, time: f64, velocity: f32) {
        info!(
            "{time:8.3}s  {:<6} note {note:3}  vel {velocity:.2}  dur {duration:.3}s",
            self.name
        );
    }

    fn start_region(&mut self, region: &RegionStart, time: f64) {
        info!(
            "{time:8.3}s  {:<6} region {} from {:.3}s for {:.3}s",
            self.name, region.sample, region.offset_seconds, region.duration_seconds
        );
    }
}

type Automation = Vec<(AutomationTarget, Arc<Mutex<ParamTimeline>>)>;

fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load(),
    };
    if let Some(bpm) = cli.bpm {
        config.initial_tempo = bpm;
    }
    if let Some(seconds) = cli.lookahead {
        config.schedule_ahead_seconds = seconds;
    }
    config.validate()?;

    let content = match &cli.content {
        Some(path) => ContentLibrary::from_yaml(&std::fs::read_to_string(path)?)?,
        None => demo_library(),
    };
    let (rack, automation) = build_rack(&content);

    println!(
        "lookahead v{} | {} mode, {} BPM, {:.0} ms ahead",
        env!("CARGO_PKG_VERSION"),
        PlaybackMode::from(cli.mode),
        config.initial_tempo,
        config.schedule_ahead_seconds * 1000.0
    );

    let source: Arc<dyn ClockSource> = Arc::new(SystemClock::new());
    let mut controller = PlaybackController::new(
        &config,
        source.clone(),
        EventQueue::new(),
        Box::new(rack),
        Box::new(content),
    )?;
    controller.switch_mode(cli.mode.into())?;
    if let Some(swing) = cli.swing {
        controller.set_swing(swing)?;
    }
    controller.start()?;

    let controller = Arc::new(Mutex::new(controller));
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        let controller = controller.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            lock(&controller).stop();
        })?;
    }

    let deadline = source.now() + cli.seconds.max(0.0);
    while running.load(Ordering::SeqCst) && source.now() < deadline {
        let wait = {
            let mut controller = lock(&controller);
            match controller.poll() {
                Ok(Some(frame)) if frame.report.skipped_tracks > 0 => {
                    warn!("{} tracks skipped at {}", frame.report.skipped_tracks, frame.readout);
                }
                Ok(_) => {}
                Err(e) => {
                    controller.stop();
                    return Err(e.into());
                }
            }
            controller.fire_due_events();
            controller
                .timing()
                .time_until_next(source.now())
                .unwrap_or_else(|| controller.timing().interval())
        };
        thread::sleep(Duration::from_secs_f64(wait));
    }

    let mut controller = lock(&controller);
    let status = controller.status();
    let end = controller.clock().position_seconds();
    let fired = controller.queue().fired_count();
    let ticks = controller.timing().tick_count();
    let skipped = controller.timing().skipped_frames();
    controller.stop();

    for (target, param) in &automation {
        println!("{target} = {:.3}", lock(param).value_at(end));
    }
    println!(
        "stopped at {} after {fired} events, {ticks} frames ({skipped} late)",
        status.readout
    );
    Ok(())
}

/// One logging instrument per instrument id and one parameter timeline per
/// automation target found in the content.
fn build_rack(content: &ContentLibrary) -> (Rack, Automation) {
    let mut rack = Rack::new();
    let mut automation: Automation = Vec::new();
    for pattern in content.patterns() {
        for track in &pattern.tracks {
            if !rack.has_instrument(&track.instrument) {
                rack.add_instrument(
                    &track.instrument,
                    Box::new(LoggingInstrument {
                        name: track.instrument.clone(),
                    }),
                );
            }
            for lane in &track.automation {
                if automation.iter().any(|(target, _)| *target == lane.target) {
                    continue;
                }
                let param = Arc::new(Mutex::new(ParamTimeline::new(0.0)));
                rack.add_parameter(lane.target.clone(), Box::new(param.clone()));
                automation.push((lane.target.clone(), param));
            }
        }
    }
    (rack, automation)
}

fn steps(pattern: &str, note: u8, velocity: f32) -> TrackContent {
    let steps = pattern
        .chars()
        .map(|c| match c {
            'x' => Step::on(note, velocity),
            'o' => Step::on(note, velocity * 0.6),
            _ => Step::off(),
        })
        .collect();
    TrackContent::Steps(StepSequence::new(steps, NoteValue::Sixteenth))
}

/// A two-bar groove with bass and filter sweep, and a one-bar hat break.
fn demo_library() -> ContentLibrary {
    let bass = PianoRoll {
        notes: [0.0, 1.5, 3.0, 4.0, 5.5, 7.0]
            .iter()
            .zip([36u8, 36, 39, 41, 41, 43])
            .map(|(&start, note)| NoteEvent::new(note, start, 0.75, 0.8))
            .collect(),
    };
    let sweep = AutomationLane::new(
        LaneId(1),
        AutomationTarget::instrument("bass", "cutoff"),
        vec![
            AutomationPoint::new(0.0, 200.0, Curve::Exponential),
            AutomationPoint::new(6.0, 4000.0, Curve::Cosine),
            AutomationPoint::new(8.0, 200.0, Curve::Hold),
        ],
    );
    let groove = Pattern::new(PatternId(1), 8.0)
        .with_track(PatternTrack::new(
            TrackId(0),
            "kick",
            steps("x...x...x...x...x...x...x..xx...", 36, 1.0),
        ))
        .with_track(PatternTrack::new(
            TrackId(1),
            "snare",
            steps("....x.......x.......x.......x.o.", 38, 0.9),
        ))
        .with_track(PatternTrack::new(
            TrackId(2),
            "hat",
            steps("x.o.x.o.x.o.x.o.x.o.x.o.x.o.x.oo", 42, 0.7),
        ))
        .with_track(PatternTrack::new(TrackId(3), "bass", TrackContent::PianoRoll(bass)).with_lane(sweep));

    let mut hat_break = Pattern::new(PatternId(2), 4.0).with_track(PatternTrack::new(
        TrackId(0),
        "hat",
        steps("xoxoxoxoxoxoxxxx", 42, 0.8),
    ));
    hat_break.name = "break".to_string();

    let mut library = ContentLibrary::new();
    library.insert_pattern(groove);
    library.insert_pattern(hat_break);
    library.add_instance(PlaylistInstance::new(PatternId(1), 0.0, 16.0));
    library.add_instance(PlaylistInstance::new(PatternId(2), 16.0, 4.0));
    library.add_instance(PlaylistInstance::new(PatternId(1), 20.0, 8.0));
    library
}
