// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Session lifecycle.
//!
//! A session owns one project and keeps an engine running against the audio
//! clock. Each connection builds the whole stack from the tape on disk:
//! container, I/O worker, engine and clock streams. When the clock goes away
//! the stack is torn down, the settings are kept, and the session retries
//! with an increasing delay.

mod backoff;

pub use backoff::Backoff;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::{ClockError, CpalClock};
use crate::config::AppConfig;
use crate::engine::{
    command_channel, Command, CommandSender, Engine, EngineStatus, LatencyCompensator,
    StatusSnapshot, TransportState,
};
use crate::project::{Project, ProjectFile};
use crate::store::{Container, IoStats, IoWorker, StagedStore, StoreError};

/// Longest wait for the transport to stop on close
const QUIESCE_TIMEOUT: Duration = Duration::from_millis(250);
const QUIESCE_POLL: Duration = Duration::from_millis(5);

/// Container and clock disagree on configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigMismatch {
    #[error("tape is {container} Hz but the clock runs at {clock} Hz")]
    SampleRateMismatch { container: u32, clock: u32 },
}

/// Why a connection attempt failed
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Clock(#[from] ClockError),
}

impl ConnectError {
    /// Whether retrying later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::Clock(ClockError::Unavailable(_)) | ConnectError::Clock(ClockError::Stream(_))
        )
    }
}

/// State of the connection to the audio clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Connected,
    /// Waiting to retry
    Disconnected,
    /// Gave up; the message says why
    Failed(String),
}

/// Everything that exists only while connected
struct Live {
    clock: CpalClock,
    worker: IoWorker,
    commands: CommandSender,
    stats: Arc<IoStats>,
}

/// An open project and its connection to the audio clock
pub struct Session {
    config: AppConfig,
    project: Project,
    settings: ProjectFile,
    status: Arc<EngineStatus>,
    latency: Arc<LatencyCompensator>,
    live: Option<Live>,
    link: Link,
    backoff: Backoff,
    mismatch: Option<ConfigMismatch>,
    clock_rate: Option<u32>,
    period_frames: u32,
    message: Option<String>,
}

impl Session {
    /// Load the project settings and make the first connection attempt.
    ///
    /// Only unreadable settings fail here; connection problems leave the
    /// session disconnected or failed.
    pub fn open(config: AppConfig, project: Project, progress: &mut dyn FnMut(u8)) -> Result<Self> {
        let settings = project.load_settings()?;
        let mut session = Self {
            config,
            project,
            settings,
            status: Arc::new(EngineStatus::new()),
            latency: Arc::new(LatencyCompensator::new()),
            live: None,
            link: Link::Disconnected,
            backoff: Backoff::new(Instant::now()),
            mismatch: None,
            clock_rate: None,
            period_frames: 0,
            message: None,
        };
        session.attempt(progress);
        Ok(session)
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Failed connection attempts since the last successful one
    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub fn mismatch(&self) -> Option<ConfigMismatch> {
        self.mismatch
    }

    pub fn clock_rate(&self) -> Option<u32> {
        self.clock_rate
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Staging underruns of the current connection
    pub fn underruns(&self) -> u32 {
        self.live
            .as_ref()
            .map(|live| live.stats.underruns.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Record blocks the I/O thread could not write
    pub fn dropped_blocks(&self) -> u32 {
        self.live
            .as_ref()
            .map(|live| {
                let stats = &live.stats;
                stats.dropped_blocks.load(Ordering::Relaxed)
                    + stats.io_errors.load(Ordering::Relaxed)
            })
            .unwrap_or(0)
    }

    /// Queue a command for the engine
    pub fn send(&mut self, command: Command) -> bool {
        let Some(live) = self.live.as_mut() else {
            self.message = Some("not connected".to_string());
            return false;
        };
        match live.commands.send(command) {
            Ok(()) => true,
            Err(command) => {
                warn!(?command, "command ring full, dropping command");
                self.message = Some("engine busy, command dropped".to_string());
                false
            }
        }
    }

    /// Reset every error counter and the status message
    pub fn clear_errors(&mut self) {
        if let Some(live) = &self.live {
            live.stats.clear();
        }
        self.status.clear_errors();
        self.message = None;
    }

    /// Housekeeping between redraws: notice a lost clock, retry when due, log
    /// period size changes.
    pub fn poll(&mut self) {
        let lost = self
            .live
            .as_ref()
            .map(|live| live.clock.is_shut_down())
            .unwrap_or(false);
        if lost {
            warn!("audio clock shut down, reconnecting");
            self.teardown();
            self.link = Link::Disconnected;
            self.backoff.failed(Instant::now());
            self.message = Some("audio clock lost".to_string());
        }

        if self.link == Link::Disconnected && self.backoff.is_due(Instant::now()) {
            self.attempt(&mut |_| {});
        }

        let period = self.status.period_frames();
        if period != 0 && period != self.period_frames {
            info!(from = self.period_frames, to = period, "period size changed");
            self.period_frames = period;
        }
    }

    /// Stop the transport, release the clock and the tape, and save settings.
    pub fn close(mut self) -> Result<()> {
        if let Some(live) = self.live.as_mut() {
            if live.commands.send(Command::Stop).is_ok() {
                let deadline = Instant::now() + QUIESCE_TIMEOUT;
                while self.status.transport() != TransportState::Stopped && Instant::now() < deadline {
                    thread::sleep(QUIESCE_POLL);
                }
            }
            if self.status.transport() != TransportState::Stopped {
                warn!("transport did not stop before close");
            }
        }
        self.teardown();
        self.project.save_settings(&self.settings)?;
        info!(project = %self.project.name(), "session closed");
        Ok(())
    }

    fn attempt(&mut self, progress: &mut dyn FnMut(u8)) {
        match self.connect(progress) {
            Ok(()) => {
                if self.backoff.attempts() > 0 {
                    info!(attempts = self.backoff.attempts(), "audio clock reconnected");
                }
                self.backoff.reset(Instant::now());
                self.link = Link::Connected;
                self.message = None;
            }
            Err(e) if e.is_retryable() => {
                self.backoff.failed(Instant::now());
                warn!(
                    error = %e,
                    attempts = self.backoff.attempts(),
                    retry_in = ?self.backoff.delay(),
                    "connection failed, will retry"
                );
                self.link = Link::Disconnected;
                self.message = Some(e.to_string());
            }
            Err(e) => {
                error!(error = %e, "connection failed");
                self.link = Link::Failed(e.to_string());
                self.message = Some(e.to_string());
            }
        }
    }

    /// Build the stack once
    fn connect(&mut self, progress: &mut dyn FnMut(u8)) -> Result<(), ConnectError> {
        let path = self.project.container_path();
        let container =
            Container::open_with_progress(&path, &self.config.new_project.container(), progress)?;
        let container_rate = container.format().sample_rate;
        info!(
            path = %path.display(),
            channels = container.format().channels,
            sample_rate = container_rate,
            frames = container.frames(),
            "tape opened"
        );

        let head = self.settings.position.min(container.frames());
        let (store, worker) = StagedStore::spawn(container, head)?;
        let stats = store.stats();

        let mut engine = Engine::new(store, Arc::clone(&self.latency), Arc::clone(&self.status));
        self.settings.apply_to(&mut engine);

        let (commands, consumer) = command_channel();
        let clock = match CpalClock::connect(
            &self.config.audio.clock(),
            engine,
            consumer,
            Arc::clone(&self.latency),
        ) {
            Ok(clock) => clock,
            Err(e) => {
                if let Err(close_error) = worker.shutdown() {
                    error!(error = %close_error, "failed to close tape");
                }
                return Err(e.into());
            }
        };

        self.clock_rate = Some(clock.sample_rate());
        self.mismatch = (clock.sample_rate() != container_rate).then_some(
            ConfigMismatch::SampleRateMismatch {
                container: container_rate,
                clock: clock.sample_rate(),
            },
        );
        if let Some(mismatch) = self.mismatch {
            warn!(%mismatch, "playing without resampling");
        }

        self.live = Some(Live {
            clock,
            worker,
            commands,
            stats,
        });
        Ok(())
    }

    /// Drop the clock, then close the tape
    fn teardown(&mut self) {
        self.refresh_settings();
        if let Some(live) = self.live.take() {
            drop(live.clock);
            if let Err(e) = live.worker.shutdown() {
                error!(error = %e, "failed to close tape");
            }
        }
        self.status.set_transport(TransportState::Stopped);
    }

    /// Take the saved settings from the engine, once one has run
    fn refresh_settings(&mut self) {
        let snapshot = self.status.snapshot();
        if !snapshot.tracks.is_empty() {
            self.settings = ProjectFile::from_snapshot(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewContainer;
    use tempfile::tempdir;

    fn offline_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.project_dir = dir.to_path_buf();
        config.audio.output_device = Some("tapedeck-test-missing-device".to_string());
        config.new_project.channels = 2;
        config
    }

    #[test]
    fn test_missing_device_leaves_session_disconnected() {
        let dir = tempdir().unwrap();
        let config = offline_config(dir.path());
        let project = Project::new(dir.path(), "demo");

        let session = Session::open(config, project.clone(), &mut |_| {}).unwrap();
        assert_eq!(session.link(), &Link::Disconnected);
        assert_eq!(session.attempts(), 1);
        assert!(session.message().is_some());
        assert_eq!(session.underruns(), 0);

        // The tape was created and closed again
        let container = Container::open(project.container_path(), &NewContainer::default()).unwrap();
        assert_eq!(container.format().channels, 2);
        assert_eq!(container.frames(), 4 * 44100);
    }

    #[test]
    fn test_close_saves_settings() {
        let dir = tempdir().unwrap();
        let config = offline_config(dir.path());
        let project = Project::new(dir.path(), "demo");

        let mut settings = ProjectFile::default();
        settings.position = 1000;
        settings.track_mut(1).monitor_mix = 25;
        project.save_settings(&settings).unwrap();

        let mut session = Session::open(config, project.clone(), &mut |_| {}).unwrap();
        assert!(!session.send(Command::Start));
        session.close().unwrap();

        let saved = project.load_settings().unwrap();
        assert_eq!(saved.position, 1000);
        assert_eq!(saved.tracks.len(), 2);
        assert_eq!(saved.tracks[1].monitor_mix, 25);
    }

    #[test]
    fn test_store_error_is_not_retried() {
        let dir = tempdir().unwrap();
        let config = offline_config(dir.path());
        let project = Project::new(dir.path().join("missing"), "demo");

        let session = Session::open(config, project, &mut |_| {}).unwrap();
        assert!(matches!(session.link(), Link::Failed(_)));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ConnectError::Clock(ClockError::Unavailable("gone".into())).is_retryable());
        assert!(!ConnectError::Clock(ClockError::PortRegistrationFailed {
            direction: "capture",
            required: 2,
            found: 1,
        })
        .is_retryable());
        assert!(!ConnectError::Store(StoreError::Corrupt("bad".into())).is_retryable());
    }
}
