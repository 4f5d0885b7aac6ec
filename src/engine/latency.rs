// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Latency compensation for the record path.
//!
//! Capture and playback latency arrive from different callbacks. Both halves
//! live in one atomic word so a reader always sees a consistent pair.

use std::sync::atomic::{AtomicU64, Ordering};

/// Round-trip latency in frames
#[derive(Debug, Default)]
pub struct LatencyCompensator {
    /// Capture latency in the high half, playback in the low half
    packed: AtomicU64,
}

impl LatencyCompensator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_capture(&self, frames: u32) {
        self.update(|_, playback| (frames, playback));
    }

    pub fn set_playback(&self, frames: u32) {
        self.update(|capture, _| (capture, frames));
    }

    /// (capture, playback) as of the same instant
    pub fn latencies(&self) -> (u32, u32) {
        unpack(self.packed.load(Ordering::Acquire))
    }

    /// Frames between a sample being played and the same moment arriving back at the input
    pub fn record_offset(&self) -> u64 {
        let (capture, playback) = self.latencies();
        capture as u64 + playback as u64
    }

    fn update(&self, f: impl Fn(u32, u32) -> (u32, u32)) {
        let _ = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (capture, playback) = unpack(word);
                let (capture, playback) = f(capture, playback);
                Some(pack(capture, playback))
            });
    }
}

fn pack(capture: u32, playback: u32) -> u64 {
    (capture as u64) << 32 | playback as u64
}

fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}
