//! Transport state machine for the loaded media.
//!
//! The machine never talks to an engine. Every operation updates its own
//! state and hands back the engine command the caller has to run, so the
//! whole thing can be driven from a scripted list of status reports.

use media_engine::EngineStatus;
use shared::domain::{PlaybackStatus, TransportState};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCommand {
    Play,
    Pause,
    Seek(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekOrigin {
    User,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSeek {
    target: f64,
    resume: bool,
    origin: SeekOrigin,
}

#[derive(Debug, Clone)]
pub struct PlaybackMachine {
    phase: Phase,
    seeking: Option<PendingSeek>,
    status: PlaybackStatus,
    repeat: bool,
}

impl Default for PlaybackMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackMachine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            seeking: None,
            status: PlaybackStatus::default(),
            repeat: false,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn transport(&self) -> TransportState {
        if self.seeking.is_some() {
            return TransportState::Seeking;
        }
        match self.phase {
            Phase::Idle => TransportState::Idle,
            Phase::Loading => TransportState::Loading,
            Phase::Playing => TransportState::Playing,
            Phase::Paused => TransportState::Paused,
            Phase::Finished => TransportState::Finished,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Playing | Phase::Paused)
    }

    pub fn is_playing(&self) -> bool {
        self.status.is_playing
    }

    pub fn is_restart_pending(&self) -> bool {
        matches!(
            self.seeking,
            Some(PendingSeek {
                origin: SeekOrigin::Restart,
                ..
            })
        )
    }

    pub fn begin_load(&mut self) {
        self.phase = Phase::Loading;
        self.seeking = None;
        self.status = PlaybackStatus::default();
    }

    pub fn loaded(&mut self, initial: &EngineStatus, autoplay: bool) {
        if self.phase != Phase::Loading {
            debug!("playback: load completion ignored outside loading phase");
            return;
        }
        if let Some(duration) = initial.duration_seconds {
            self.status.update_duration(duration);
        }
        self.status.position_seconds = self.status.clamp_position(initial.position_seconds);
        self.status.is_buffering = initial.is_buffering;
        self.set_running(autoplay);
    }

    /// Back to `Idle`. The repeat flag survives.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.seeking = None;
        self.status = PlaybackStatus::default();
    }

    pub fn play(&mut self) -> Option<EngineCommand> {
        if !self.is_ready() {
            return None;
        }
        if let Some(pending) = self.seeking.as_mut() {
            pending.resume = true;
            self.status.is_playing = true;
            return None;
        }
        if self.phase == Phase::Playing {
            return None;
        }
        self.set_running(true);
        Some(EngineCommand::Play)
    }

    pub fn pause(&mut self) -> Option<EngineCommand> {
        if !self.is_ready() {
            return None;
        }
        if let Some(pending) = self.seeking.as_mut() {
            pending.resume = false;
            self.status.is_playing = false;
            return None;
        }
        if self.phase == Phase::Paused {
            return None;
        }
        self.set_running(false);
        Some(EngineCommand::Pause)
    }

    pub fn toggle_play_pause(&mut self) -> Option<EngineCommand> {
        if self.status.is_playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Starts a seek and returns the clamped target the engine must seek to.
    /// A seek replaces any pending one, including a repeat restart.
    pub fn seek(&mut self, requested_seconds: f64) -> Option<f64> {
        if !matches!(self.phase, Phase::Playing | Phase::Paused | Phase::Finished) {
            return None;
        }
        let target = self.status.clamp_position(requested_seconds);
        if target != requested_seconds {
            debug!(
                requested = requested_seconds,
                applied = target,
                "playback: seek target clamped"
            );
        }

        let resume = match self.seeking {
            Some(pending) => {
                if pending.origin == SeekOrigin::Restart {
                    debug!("playback: seek cancels pending repeat restart");
                }
                pending.resume
            }
            None => self.phase == Phase::Playing,
        };
        if self.phase == Phase::Finished {
            self.phase = Phase::Paused;
        }

        self.seeking = Some(PendingSeek {
            target,
            resume,
            origin: SeekOrigin::User,
        });
        self.status.position_seconds = target;
        self.status.is_playing = resume;
        Some(target)
    }

    /// Ends the seeking sub-state. Returns `Play` when playback was active
    /// before the seek.
    pub fn seek_completed(&mut self) -> Option<EngineCommand> {
        let pending = self.seeking.take()?;
        self.status.position_seconds = self.status.clamp_position(pending.target);
        self.set_running(pending.resume);
        pending.resume.then_some(EngineCommand::Play)
    }

    /// The engine refused the seek; keep the intended transport state and let
    /// later status reports correct the position.
    pub fn abort_seek(&mut self) {
        if let Some(pending) = self.seeking.take() {
            self.set_running(pending.resume);
        }
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.repeat = !self.repeat;
        self.repeat
    }

    /// Applies one engine report. Returns the restart seek when the media
    /// just finished with repeat on.
    pub fn apply_status(&mut self, report: &EngineStatus) -> Option<EngineCommand> {
        if matches!(self.phase, Phase::Idle | Phase::Loading) {
            return None;
        }
        if let Some(duration) = report.duration_seconds {
            self.status.update_duration(duration);
        }
        self.status.is_buffering = report.is_buffering;

        if report.did_just_finish {
            return self.finish();
        }
        if self.seeking.is_none() && self.phase != Phase::Finished {
            self.status.position_seconds = self.status.clamp_position(report.position_seconds);
        }
        None
    }

    fn finish(&mut self) -> Option<EngineCommand> {
        if self.seeking.is_some() || self.phase == Phase::Finished {
            return None;
        }
        if self.repeat {
            debug!("playback: end reached, restarting");
            self.phase = Phase::Playing;
            self.seeking = Some(PendingSeek {
                target: 0.0,
                resume: true,
                origin: SeekOrigin::Restart,
            });
            self.status.position_seconds = 0.0;
            self.status.is_playing = true;
            return Some(EngineCommand::Seek(0.0));
        }
        debug!("playback: end reached");
        self.phase = Phase::Finished;
        self.status.is_playing = false;
        self.status.position_seconds = self.status.duration_seconds;
        None
    }

    fn set_running(&mut self, playing: bool) {
        self.phase = if playing {
            Phase::Playing
        } else {
            Phase::Paused
        };
        self.status.is_playing = playing;
    }
}

#[cfg(test)]
#[path = "tests/playback_tests.rs"]
mod tests;
