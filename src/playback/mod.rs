//! Playback control: the state machine that ties the transport, the window
//! scheduler and the UI poll together.
//!
//! ```text
//! Stopped ──start──▶ Playing ──pause──▶ Paused
//!    ▲                  │  ▲──start──────┘
//!    └──────stop────────┴──────stop─────────┘
//! ```
//!
//! The mode (pattern or playlist) is orthogonal to the play state. Switching
//! mode always goes through a full stop and restart.

pub mod timing;

pub use timing::{PositionReadout, TimingController, DEFAULT_RATE_HZ};

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::content::{ContentLibrary, ContentStore, LaneId};
use crate::error::SchedulerError;
use crate::event::{EventQueue, PrecisionEventQueue};
use crate::scheduler::{PassReport, PlaybackMode, ScheduleContext, WindowScheduler};
use crate::target::TargetRegistry;
use crate::transport::{ClockSource, NoteValue, PlayState, TransportClock};

/// Re-entrancy guard for mode switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchState {
    Idle,
    Transitioning,
}

/// Snapshot of what the controller is doing, for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlayState,
    pub mode: PlaybackMode,
    pub tempo_bpm: f64,
    pub position_beats: f64,
    pub readout: PositionReadout,
}

/// What one UI frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub report: PassReport,
    pub readout: PositionReadout,
}

/// Top-level playback state machine.
pub struct PlaybackController<Q: PrecisionEventQueue = EventQueue> {
    source: Arc<dyn ClockSource>,
    clock: TransportClock,
    scheduler: WindowScheduler,
    timing: TimingController,
    queue: Q,
    registry: Box<dyn TargetRegistry>,
    content: Box<dyn ContentStore>,
    mode: PlaybackMode,
    switch: SwitchState,
}

impl<Q: PrecisionEventQueue> PlaybackController<Q> {
    /// Build a stopped controller in pattern mode.
    pub fn new(
        config: &EngineConfig,
        source: Arc<dyn ClockSource>,
        queue: Q,
        registry: Box<dyn TargetRegistry>,
        content: Box<dyn ContentStore>,
    ) -> Result<Self, SchedulerError> {
        let mut clock = TransportClock::new(source.clone());
        clock.set_tempo(config.initial_tempo)?;
        Ok(Self {
            source,
            clock,
            scheduler: WindowScheduler::from_config(config),
            timing: TimingController::new(config.ui_rate_hz),
            queue,
            registry,
            content,
            mode: PlaybackMode::default(),
            switch: SwitchState::Idle,
        })
    }

    /// Start playback, or resume it when paused.
    ///
    /// Starting from `Stopped` checks that the current mode has something to
    /// play: an active pattern, or at least one playlist instance.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        match self.clock.play_state() {
            PlayState::Playing => return Ok(()),
            PlayState::Paused => {
                self.clock.start(None)?;
                self.timing.start(self.source.now());
                debug!("resumed at beat {:.3}", self.clock.position_beats());
                return Ok(());
            }
            PlayState::Stopped => {}
        }
        validate_mode(self.mode, &self.content.snapshot())?;
        self.clock.start(None)?;
        self.timing.start(self.source.now());
        info!("playing {} mode at {} BPM", self.mode, self.clock.tempo());
        Ok(())
    }

    /// Stop, rewind and cancel everything scheduled.
    pub fn stop(&mut self) {
        self.clock.stop();
        self.scheduler.reset(&mut self.queue);
        self.timing.stop();
        debug!("stopped");
    }

    /// Hold position. Pending events stay queued and fire after resume.
    pub fn pause(&mut self) {
        if self.clock.is_playing() {
            self.clock.pause();
            self.timing.stop();
            debug!("paused at beat {:.3}", self.clock.position_beats());
        }
    }

    /// Switch between pattern and playlist playback.
    ///
    /// A no-op when already in `mode` or while another switch is in progress.
    /// If playback was running it restarts in the new mode; when that restart
    /// fails the controller is left stopped and the error is returned.
    pub fn switch_mode(&mut self, mode: PlaybackMode) -> Result<(), SchedulerError> {
        if mode == self.mode {
            return Ok(());
        }
        if self.switch == SwitchState::Transitioning {
            debug!("mode switch to {mode} ignored, another switch is in progress");
            return Ok(());
        }
        self.switch = SwitchState::Transitioning;
        let result = self.transition(mode);
        self.switch = SwitchState::Idle;
        result
    }

    fn transition(&mut self, mode: PlaybackMode) -> Result<(), SchedulerError> {
        let was_playing = self.clock.is_playing();
        self.stop();
        debug!("mode {} -> {mode}", self.mode);
        self.mode = mode;
        if was_playing {
            if let Err(e) = self.start() {
                warn!("restart in {mode} mode failed: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn is_switching(&self) -> bool {
        self.switch == SwitchState::Transitioning
    }

    /// Jump to `beats`, cancelling everything scheduled from the old position.
    pub fn seek(&mut self, beats: f64) -> Result<(), SchedulerError> {
        let was_playing = self.clock.is_playing();
        if was_playing {
            self.pause();
        }
        let moved = self.clock.seek(beats);
        if moved.is_ok() {
            self.scheduler.clear_scheduled_events(&mut self.queue);
            debug!("seek to beat {beats:.3}");
        }
        if was_playing {
            self.start()?;
        }
        moved
    }

    /// Run one UI frame: if a tick is due, schedule the next window and read
    /// the position. Returns `None` when no frame was due.
    ///
    /// When the content for the current mode has gone away (active pattern
    /// removed, playlist emptied) playback stops before the error is returned.
    pub fn poll(&mut self) -> Result<Option<Frame>, SchedulerError> {
        if !self.timing.should_tick(self.source.now()) {
            return Ok(None);
        }
        let report = if self.clock.is_playing() {
            match self.schedule_pass() {
                Ok(report) => report,
                Err(e @ (SchedulerError::NoActivePattern | SchedulerError::EmptyPlaylist)) => {
                    warn!("nothing left to play in {} mode: {e}", self.mode);
                    self.stop();
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        } else {
            PassReport::default()
        };
        Ok(Some(Frame {
            report,
            readout: self.readout(),
        }))
    }

    fn schedule_pass(&mut self) -> Result<PassReport, SchedulerError> {
        let content = self.content.snapshot();
        self.scheduler.schedule_next_events(ScheduleContext {
            clock: &self.clock,
            content: &content,
            mode: self.mode,
            queue: &mut self.queue,
            registry: &*self.registry,
        })
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            state: self.clock.play_state(),
            mode: self.mode,
            tempo_bpm: self.clock.tempo(),
            position_beats: self.clock.position_beats(),
            readout: self.readout(),
        }
    }

    fn readout(&self) -> PositionReadout {
        PositionReadout::from(self.clock.musical_position())
    }

    /// Write a live value to an automation lane's parameter.
    pub fn update_automation_value(
        &mut self,
        lane: LaneId,
        value: f64,
        time: Option<f64>,
    ) -> Result<(), SchedulerError> {
        let content = self.content.snapshot();
        let now = self.clock.position_seconds();
        self.scheduler.update_automation_value(
            lane,
            value,
            time,
            now,
            &content,
            &mut self.queue,
            &mut *self.registry,
        )
    }

    /// Change tempo. Already scheduled events from now on are rescheduled at
    /// the new tempo.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), SchedulerError> {
        self.clock.set_tempo(bpm)?;
        self.reschedule();
        Ok(())
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.clock.set_loop(enabled);
        self.reschedule();
    }

    pub fn set_loop_points(&mut self, start_beats: f64, end_beats: f64) -> Result<(), SchedulerError> {
        self.clock.set_loop_points(start_beats, end_beats)?;
        self.reschedule();
        Ok(())
    }

    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) -> Result<(), SchedulerError> {
        self.clock.set_time_signature(numerator, denominator)
    }

    pub fn set_swing(&mut self, amount: f32) -> Result<(), SchedulerError> {
        self.clock.set_swing(amount)?;
        self.reschedule();
        Ok(())
    }

    pub fn set_swing_subdivision(&mut self, subdivision: NoteValue) {
        self.clock.set_swing_subdivision(subdivision);
        self.reschedule();
    }

    /// Register a tap; returns the estimated tempo without applying it.
    pub fn tap_tempo(&mut self) -> f64 {
        self.clock.tap_tempo()
    }

    fn reschedule(&mut self) {
        if self.clock.play_state() != PlayState::Stopped {
            let now = self.clock.position_seconds();
            self.scheduler.reschedule_from(now, &mut self.queue);
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn scheduler(&self) -> &WindowScheduler {
        &self.scheduler
    }

    pub fn timing(&self) -> &TimingController {
        &self.timing
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn registry_mut(&mut self) -> &mut dyn TargetRegistry {
        &mut *self.registry
    }
}

impl PlaybackController<EventQueue> {
    /// Dispatch every queued event due at the current transport time.
    pub fn fire_due_events(&mut self) -> usize {
        let now = self.clock.position_seconds();
        self.queue.fire_due(now, &mut *self.registry)
    }
}

fn validate_mode(mode: PlaybackMode, content: &ContentLibrary) -> Result<(), SchedulerError> {
    match mode {
        PlaybackMode::Pattern if content.active_pattern().is_none() => Err(SchedulerError::NoActivePattern),
        PlaybackMode::Playlist if content.playlist().is_empty() => Err(SchedulerError::EmptyPlaylist),
        _ => Ok(()),
    }
}
