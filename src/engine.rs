// Playback engine - A shared session driven by the heartbeat thread
//
// The heartbeat only ever uses `try_lock` on the session: a tick that finds the
// session busy with an edit is skipped, and the next one catches up because
// every window starts where the previous one ended.

use crate::config::EngineConfig;
use crate::sequencer::heartbeat::Heartbeat;
use crate::sequencer::scheduler::PassReport;
use crate::sequencer::timeline::Tempo;
use crate::sequencer::transport::{LoopRegion, SeekTarget};
use crate::session::{Session, SharedSession};
use crate::song::EditError;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("could not start heartbeat: {0}")]
    Heartbeat(#[from] std::io::Error),

    #[error(transparent)]
    Edit(#[from] EditError),
}

pub struct PlaybackEngine {
    session: SharedSession,
    heartbeat: Option<Heartbeat>,
    period: Duration,
}

impl PlaybackEngine {
    pub fn new(session: Session, period: Duration) -> Self {
        Self {
            session: session.into_shared(),
            heartbeat: None,
            period,
        }
    }

    pub fn from_config(session: Session, config: &EngineConfig) -> Self {
        Self::new(session, config.heartbeat_period())
    }

    /// Handle for edits from other threads
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    /// Blocking lock for the control path; a poisoned session is still usable
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn heartbeat_period(&self) -> Duration {
        self.period
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(Heartbeat::is_running)
    }

    pub fn is_playing(&self) -> bool {
        self.lock().is_playing()
    }

    /// Start the transport, run the first pass, then arm the heartbeat
    pub fn start_playback(&mut self) -> Result<bool, EngineError> {
        let started = self.lock().start_playback();
        if self.heartbeat.is_none() {
            let session = self.session.clone();
            self.heartbeat = Some(Heartbeat::start(self.period, move || {
                heartbeat_tick(&session);
            })?);
        }
        Ok(started)
    }

    /// Disarm the heartbeat, then stop and release every sounding note
    pub fn stop_playback(&mut self) -> bool {
        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        self.lock().stop_playback()
    }

    pub fn seek(&self, target: SeekTarget) {
        self.lock().seek(target);
    }

    pub fn set_loop(&self, region: LoopRegion) -> Result<(), EngineError> {
        self.lock().set_loop(region)?;
        Ok(())
    }

    pub fn set_tempo(&self, tempo: Tempo) {
        self.lock().set_tempo(tempo);
    }

    pub fn undo(&self) -> Option<String> {
        self.lock().undo()
    }

    pub fn can_undo(&self) -> bool {
        self.lock().can_undo()
    }

    pub fn panic(&self) {
        self.lock().panic();
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop_playback();
    }
}

/// One heartbeat pass; never blocks and never fails
fn heartbeat_tick(session: &Mutex<Session>) -> Option<PassReport> {
    match session.try_lock() {
        Ok(mut session) => Some(session.tick()),
        Err(TryLockError::WouldBlock) => {
            log::trace!(target: "sequencer::heartbeat", "session busy, tick skipped");
            None
        }
        Err(TryLockError::Poisoned(poisoned)) => {
            log::warn!(target: "sequencer::heartbeat", "session lock poisoned, continuing");
            Some(poisoned.into_inner().tick())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::transport::ManualClock;
    use crate::song::Song;

    fn engine() -> (PlaybackEngine, ManualClock) {
        let clock = ManualClock::new();
        let session = Session::new(Song::new("Engine"), Box::new(clock.clone()), 0.05, 0.0);
        (PlaybackEngine::new(session, Duration::from_millis(5)), clock)
    }

    #[test]
    fn test_start_stop_arms_heartbeat() {
        let (mut engine, _clock) = engine();
        assert!(engine.start_playback().unwrap());
        assert!(engine.is_playing());
        assert!(engine.is_heartbeat_running());

        assert!(engine.stop_playback());
        assert!(!engine.is_playing());
        assert!(!engine.is_heartbeat_running());
    }

    #[test]
    fn test_busy_session_skips_tick() {
        let (engine, _clock) = engine();
        let shared = engine.session();
        let guard = engine.lock();
        assert!(heartbeat_tick(&shared).is_none());
        drop(guard);
        assert!(heartbeat_tick(&shared).is_some());
    }

    #[test]
    fn test_control_surface_delegates() {
        let (engine, _clock) = engine();
        engine.set_loop(LoopRegion::new(true, 0, 960)).unwrap();
        assert!(engine.can_undo());
        assert!(engine.set_loop(LoopRegion::new(true, 960, 0)).is_err());

        engine.seek(SeekTarget::Ticks(480));
        assert!((engine.lock().position_ticks() - 480.0).abs() < 1e-6);

        assert_eq!(engine.undo().as_deref(), Some("Set loop"));
        assert!(!engine.can_undo());
    }
}
