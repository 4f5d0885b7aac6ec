// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The tape engine.
//!
//! This module provides:
//! - Per-period playback of every track through its monitor mix
//! - Recording of the two input legs onto armed tracks
//! - The transport state machine with faded starts and stops
//! - Latency compensation, control commands and published status
//!
//! The engine is owned by the audio callback. It talks to the tape through
//! [`FrameStore`] and to the outside world through the command ring and
//! [`EngineStatus`].

pub mod buffers;
pub mod command;
pub mod latency;
pub mod status;
pub mod track;
pub mod transport;

pub use buffers::{Frames, Period, TrackOutputs};
pub use command::{command_channel, Command, CommandSender, SeekTarget};
pub use latency::LatencyCompensator;
pub use status::{EngineStatus, StatusSnapshot, TrackStatus};
pub use track::Track;
pub use transport::{fade_gain, ClockAction, Transport, TransportState};

use std::sync::Arc;

use rtrb::Consumer;

use crate::clock::{Clock, Leg, Legs, PortId};
use crate::store::{FrameStore, Take, WaveFormat};

/// Largest period the engine processes in one call
pub const MAX_PERIOD: usize = 8192;

/// What the record path did in a period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Not rolling, not record-enabled or nothing armed
    Idle,
    /// The head has not yet passed the record offset
    BeforeStart,
    Recorded,
    /// The store refused the block
    Failed,
}

/// Playback and record engine over a frame store
pub struct Engine<S: FrameStore> {
    store: S,
    format: WaveFormat,
    tracks: Vec<Track>,
    transport: Transport,
    head: u64,
    last_frame: u64,
    arm_a: Option<usize>,
    arm_b: Option<usize>,
    record_enabled: bool,
    latency: Arc<LatencyCompensator>,
    status: Arc<EngineStatus>,
    /// Interleaved tape frames for one period
    read_buffer: Vec<f32>,
}

impl<S: FrameStore> Engine<S> {
    pub fn new(store: S, latency: Arc<LatencyCompensator>, status: Arc<EngineStatus>) -> Self {
        let format = store.format();
        let channels = format.channels as usize;
        let last_frame = store.frames();

        let engine = Self {
            store,
            format,
            tracks: vec![Track::new(); channels],
            transport: Transport::new(),
            head: 0,
            last_frame,
            arm_a: None,
            arm_b: None,
            record_enabled: false,
            latency,
            status,
            read_buffer: vec![0.0; MAX_PERIOD * channels],
        };
        engine.status.set_sample_rate(format.sample_rate);
        engine.publish();
        engine
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn record_enabled(&self) -> bool {
        self.record_enabled
    }

    pub fn armed(&self, leg: Leg) -> Option<usize> {
        match leg {
            Leg::A => self.arm_a,
            Leg::B => self.arm_b,
        }
    }

    pub fn status(&self) -> Arc<EngineStatus> {
        Arc::clone(&self.status)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Give every track its output port
    pub fn attach_ports(&mut self, ports: &[PortId]) {
        for (track, port) in self.tracks.iter_mut().zip(ports) {
            track.port = Some(*port);
        }
    }

    /// Routing implied by the current mutes, for a freshly connected clock
    pub fn routes(&self) -> impl Iterator<Item = (PortId, Legs)> + '_ {
        self.tracks
            .iter()
            .filter_map(|track| track.port.map(|port| (port, track.routed_legs())))
    }

    /// Apply every queued command
    pub fn process_commands(&mut self, commands: &mut Consumer<Command>, clock: &mut dyn Clock) {
        while let Ok(command) = commands.pop() {
            self.apply(command, clock);
        }
    }

    pub fn apply(&mut self, command: Command, clock: &mut dyn Clock) {
        match command {
            Command::Start => self.start(clock),
            Command::Stop => self.stop(),
            Command::TogglePlay => match self.transport.state() {
                TransportState::Stopped => self.start(clock),
                TransportState::Rolling => self.stop(),
                _ => {}
            },
            Command::Seek(target) => {
                let frame = match target {
                    SeekTarget::Home => 0,
                    SeekTarget::End => self.last_frame as i64,
                    SeekTarget::Relative(delta) => (self.head as i64).saturating_add(delta),
                    SeekTarget::Absolute(frame) => frame,
                };
                self.seek(frame, clock);
            }
            Command::SetMonitor { track, level } => {
                if let Some(track) = self.tracks.get_mut(track) {
                    track.set_monitor_mix(level);
                }
            }
            Command::AdjustMonitor { track, delta } => {
                if let Some(track) = self.tracks.get_mut(track) {
                    track.adjust_monitor_mix(delta);
                }
            }
            Command::ToggleMute { track, leg } => {
                if let Some(muted) = self.tracks.get(track).map(|t| t.is_muted(leg)) {
                    self.set_mute(track, leg, !muted, clock);
                }
            }
            Command::ToggleMuteBoth { track } => {
                if let Some(t) = self.tracks.get(track) {
                    let muted = !(t.mute_a && t.mute_b);
                    self.set_mute(track, Leg::A, muted, clock);
                    self.set_mute(track, Leg::B, muted, clock);
                }
            }
            Command::SetAllMuted(muted) => {
                for track in 0..self.tracks.len() {
                    self.set_mute(track, Leg::A, muted, clock);
                    self.set_mute(track, Leg::B, muted, clock);
                }
            }
            Command::ToggleArm { leg, track } => self.toggle_arm(leg, track),
            Command::ToggleRecordEnable => self.toggle_record_enable(),
            Command::ClearErrors => self.status.clear_errors(),
        }
        self.publish();
    }

    /// Stopped -> Start. Rewinds first if playback would start at the end.
    pub fn start(&mut self, clock: &mut dyn Clock) {
        if self.transport.state() != TransportState::Stopped {
            return;
        }
        if !self.record_enabled && self.head >= self.last_frame {
            self.head = 0;
        }
        self.store.locate(self.head);
        clock.locate(self.head);
        self.transport.request_start();
    }

    /// Begin the fade-out. Recording ends and both legs are disarmed.
    pub fn stop(&mut self) {
        if !self.transport.request_stop() {
            return;
        }
        self.record_enabled = false;
        self.disarm_all();
        self.last_frame = self.store.frames();
    }

    /// Move the head, clamped to the tape. Refused while recording.
    pub fn seek(&mut self, frame: i64, clock: &mut dyn Clock) -> bool {
        if self.record_enabled && self.transport.state() == TransportState::Rolling {
            return false;
        }
        self.head = frame.clamp(0, self.last_frame as i64) as u64;
        self.store.locate(self.head);
        clock.locate(self.head);
        true
    }

    pub fn set_monitor(&mut self, track: usize, level: u8) {
        if let Some(track) = self.tracks.get_mut(track) {
            track.set_monitor_mix(level);
        }
    }

    /// Mute or unmute one leg, keeping the port connection in step
    pub fn set_mute(&mut self, track: usize, leg: Leg, muted: bool, clock: &mut dyn Clock) {
        let Some(t) = self.tracks.get_mut(track) else {
            return;
        };
        t.set_muted(leg, muted);
        if let Some(port) = t.port {
            if muted {
                clock.disconnect(port, leg.into());
            } else {
                clock.connect(port, leg.into());
            }
        }
    }

    /// Arm `track` on `leg`, replacing any previous arm on that leg, or disarm
    /// it if it was already armed there.
    pub fn toggle_arm(&mut self, leg: Leg, track: usize) {
        if track >= self.tracks.len() {
            return;
        }
        let arm = match leg {
            Leg::A => &mut self.arm_a,
            Leg::B => &mut self.arm_b,
        };
        *arm = if *arm == Some(track) { None } else { Some(track) };
        self.sync_recording_flags();
    }

    /// Flip the global record enable. Turning it off disarms both legs.
    pub fn toggle_record_enable(&mut self) {
        self.record_enabled = !self.record_enabled;
        if !self.record_enabled {
            self.disarm_all();
        }
    }

    /// Run one period.
    ///
    /// Outputs are expected to be silent on entry; tracks without a port are
    /// skipped.
    pub fn process(&mut self, period: &mut Period<'_>, clock: &mut dyn Clock) {
        let frames = period.frames.min(MAX_PERIOD);
        let began = self.transport.state();
        self.status.set_period_frames(frames as u32);

        match began {
            TransportState::Stopped => {
                self.publish();
                return;
            }
            TransportState::Stopping => {
                period.outputs.silence(frames);
                if let Some(ClockAction::Stop) = self.transport.complete_period(began) {
                    clock.stop();
                }
                self.publish();
                return;
            }
            _ => {}
        }

        let start_head = self.head;
        if self.record_enabled && self.head + frames as u64 > self.last_frame {
            match self.store.extend_by_frames(frames as u64) {
                Ok(last_frame) => self.last_frame = last_frame,
                Err(_) => self.status.note_store_error(),
            }
        }

        let channels = self.tracks.len();
        let read = match self
            .store
            .read_frames(self.head, &mut self.read_buffer[..frames * channels])
        {
            Ok(read) => read,
            Err(_) => {
                self.status.note_store_error();
                0
            }
        };

        let tape = Frames::new(&self.read_buffer[..read * channels], channels);
        for (index, track) in self.tracks.iter().enumerate() {
            let Some(port) = track.port else {
                continue;
            };
            let out = &mut period.outputs.port_mut(port)[..frames];
            for (i, (slot, sample)) in out.iter_mut().zip(tape.channel(index)).enumerate() {
                *slot = track.mix(sample) * fade_gain(began, i, frames);
            }
            out[read..].fill(0.0);
        }
        self.head += read as u64;

        // The fade-in waits for the first period that actually plays tape
        let starved = began == TransportState::Start && read == 0 && self.head < self.last_frame;
        if !starved {
            if let Some(ClockAction::Start) = self.transport.complete_period(began) {
                clock.start();
            }
        }

        if !self.record_enabled
            && self.transport.state() == TransportState::Rolling
            && self.head + 2 * frames as u64 >= self.last_frame
        {
            self.stop();
        }

        if self.record(start_head, period) == RecordOutcome::Failed {
            self.status.note_store_error();
        }
        self.publish();
    }

    /// Write the input legs onto the armed tracks for the period that began at
    /// `head`, shifted back by the record offset.
    pub fn record(&mut self, head: u64, period: &Period<'_>) -> RecordOutcome {
        if self.transport.state() != TransportState::Rolling || !self.record_enabled {
            return RecordOutcome::Idle;
        }
        if self.arm_a.is_none() && self.arm_b.is_none() {
            return RecordOutcome::Idle;
        }
        let offset = self.latency.record_offset();
        if head < offset {
            return RecordOutcome::BeforeStart;
        }

        let frames = period.frames.min(MAX_PERIOD);
        let mut takes = [Take::default(); 2];
        let mut count = 0;
        for (arm, input) in [(self.arm_a, period.input_a), (self.arm_b, period.input_b)] {
            if let Some(channel) = arm {
                takes[count] = Take {
                    channel,
                    samples: &input[..frames.min(input.len())],
                };
                count += 1;
            }
        }

        match self.store.overdub(head - offset, frames, &takes[..count]) {
            Ok(()) => RecordOutcome::Recorded,
            Err(_) => RecordOutcome::Failed,
        }
    }

    fn disarm_all(&mut self) {
        self.arm_a = None;
        self.arm_b = None;
        self.sync_recording_flags();
    }

    fn sync_recording_flags(&mut self) {
        for (index, track) in self.tracks.iter_mut().enumerate() {
            track.recording = self.arm_a == Some(index) || self.arm_b == Some(index);
        }
    }

    /// Store the current state into the shared status
    pub fn publish(&self) {
        self.status.set_transport(self.transport.state());
        self.status.set_position(self.head, self.last_frame);
        self.status
            .set_record(self.record_enabled, self.arm_a, self.arm_b);
        self.status.set_tracks(&self.tracks);
    }
}
