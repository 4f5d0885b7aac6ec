// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Engine state published to the control surface.
//!
//! The callback stores into atomics at the end of every period; the UI takes
//! a [`StatusSnapshot`] whenever it redraws.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use super::track::Track;
use super::transport::TransportState;
use crate::store::MAX_TRACKS;

const NO_ARM: u8 = u8::MAX;

const MUTE_A: u32 = 1 << 8;
const MUTE_B: u32 = 1 << 9;
const RECORDING: u32 = 1 << 10;

/// Shared view of the engine
#[derive(Debug)]
pub struct EngineStatus {
    transport: AtomicU8,
    head: AtomicU64,
    last_frame: AtomicU64,
    record_enabled: AtomicBool,
    arm_a: AtomicU8,
    arm_b: AtomicU8,
    track_count: AtomicUsize,
    tracks: [AtomicU32; MAX_TRACKS],
    sample_rate: AtomicU32,
    period_frames: AtomicU32,
    store_errors: AtomicU32,
}

/// Copy of the monitor state of one track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackStatus {
    pub monitor_mix: u8,
    pub mute_a: bool,
    pub mute_b: bool,
    pub recording: bool,
}

/// Point-in-time copy of [`EngineStatus`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub transport: TransportState,
    pub head: u64,
    pub last_frame: u64,
    pub record_enabled: bool,
    pub arm_a: Option<usize>,
    pub arm_b: Option<usize>,
    pub tracks: Vec<TrackStatus>,
    pub sample_rate: u32,
    pub period_frames: u32,
    pub store_errors: u32,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            transport: AtomicU8::new(TransportState::Stopped.as_u8()),
            head: AtomicU64::new(0),
            last_frame: AtomicU64::new(0),
            record_enabled: AtomicBool::new(false),
            arm_a: AtomicU8::new(NO_ARM),
            arm_b: AtomicU8::new(NO_ARM),
            track_count: AtomicUsize::new(0),
            tracks: std::array::from_fn(|_| AtomicU32::new(0)),
            sample_rate: AtomicU32::new(0),
            period_frames: AtomicU32::new(0),
            store_errors: AtomicU32::new(0),
        }
    }
}

impl EngineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> TransportState {
        TransportState::from_u8(self.transport.load(Ordering::Acquire))
    }

    pub fn set_transport(&self, state: TransportState) {
        self.transport.store(state.as_u8(), Ordering::Release);
    }

    pub fn set_position(&self, head: u64, last_frame: u64) {
        self.head.store(head, Ordering::Relaxed);
        self.last_frame.store(last_frame, Ordering::Relaxed);
    }

    pub fn set_record(&self, enabled: bool, arm_a: Option<usize>, arm_b: Option<usize>) {
        self.record_enabled.store(enabled, Ordering::Relaxed);
        self.arm_a.store(encode_arm(arm_a), Ordering::Relaxed);
        self.arm_b.store(encode_arm(arm_b), Ordering::Relaxed);
    }

    pub fn set_tracks(&self, tracks: &[Track]) {
        let count = tracks.len().min(MAX_TRACKS);
        for (slot, track) in self.tracks.iter().zip(&tracks[..count]) {
            slot.store(pack_track(track), Ordering::Relaxed);
        }
        self.track_count.store(count, Ordering::Relaxed);
    }

    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Relaxed);
    }

    pub fn set_period_frames(&self, frames: u32) {
        self.period_frames.store(frames, Ordering::Relaxed);
    }

    pub fn period_frames(&self) -> u32 {
        self.period_frames.load(Ordering::Relaxed)
    }

    pub fn note_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear_errors(&self) {
        self.store_errors.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let count = self.track_count.load(Ordering::Relaxed);
        StatusSnapshot {
            transport: self.transport(),
            head: self.head.load(Ordering::Relaxed),
            last_frame: self.last_frame.load(Ordering::Relaxed),
            record_enabled: self.record_enabled.load(Ordering::Relaxed),
            arm_a: decode_arm(self.arm_a.load(Ordering::Relaxed)),
            arm_b: decode_arm(self.arm_b.load(Ordering::Relaxed)),
            tracks: self.tracks[..count]
                .iter()
                .map(|slot| unpack_track(slot.load(Ordering::Relaxed)))
                .collect(),
            sample_rate: self.sample_rate.load(Ordering::Relaxed),
            period_frames: self.period_frames.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

fn encode_arm(arm: Option<usize>) -> u8 {
    arm.map(|track| track as u8).unwrap_or(NO_ARM)
}

fn decode_arm(value: u8) -> Option<usize> {
    (value != NO_ARM).then_some(value as usize)
}

fn pack_track(track: &Track) -> u32 {
    let mut word = track.monitor_mix as u32;
    if track.mute_a {
        word |= MUTE_A;
    }
    if track.mute_b {
        word |= MUTE_B;
    }
    if track.recording {
        word |= RECORDING;
    }
    word
}

fn unpack_track(word: u32) -> TrackStatus {
    TrackStatus {
        monitor_mix: (word & 0xFF) as u8,
        mute_a: word & MUTE_A != 0,
        mute_b: word & MUTE_B != 0,
        recording: word & RECORDING != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_published_state() {
        let status = EngineStatus::new();
        let mut tracks = vec![Track::new(); 3];
        tracks[1].monitor_mix = 42;
        tracks[1].mute_b = true;
        tracks[2].recording = true;

        status.set_transport(TransportState::Rolling);
        status.set_position(1000, 5000);
        status.set_record(true, Some(2), None);
        status.set_tracks(&tracks);
        status.note_store_error();

        let snapshot = status.snapshot();
        assert_eq!(snapshot.transport, TransportState::Rolling);
        assert_eq!(snapshot.head, 1000);
        assert_eq!(snapshot.last_frame, 5000);
        assert!(snapshot.record_enabled);
        assert_eq!(snapshot.arm_a, Some(2));
        assert_eq!(snapshot.arm_b, None);
        assert_eq!(snapshot.tracks.len(), 3);
        assert_eq!(snapshot.tracks[0].monitor_mix, 100);
        assert_eq!(
            snapshot.tracks[1],
            TrackStatus {
                monitor_mix: 42,
                mute_a: false,
                mute_b: true,
                recording: false,
            }
        );
        assert!(snapshot.tracks[2].recording);
        assert_eq!(snapshot.store_errors, 1);

        status.clear_errors();
        assert_eq!(status.snapshot().store_errors, 0);
    }
}
