// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tape track: one mono channel of the container.

use crate::clock::{Leg, Legs, PortId};

/// Full monitor level
pub const MONITOR_MAX: u8 = 100;

/// Monitor and record state of one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    /// Monitor gain in percent (0-100)
    pub monitor_mix: u8,
    /// Leg A muted
    pub mute_a: bool,
    /// Leg B muted
    pub mute_b: bool,
    /// Armed for some input leg; never heard while set
    pub recording: bool,
    /// Output port assigned by the clock
    pub port: Option<PortId>,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            monitor_mix: MONITOR_MAX,
            mute_a: false,
            mute_b: false,
            recording: false,
            port: None,
        }
    }
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor contribution of one tape sample
    #[inline]
    pub fn mix(&self, sample: f32) -> f32 {
        if (self.mute_a && self.mute_b) || self.recording || self.monitor_mix == 0 {
            0.0
        } else if self.monitor_mix == MONITOR_MAX {
            sample
        } else {
            self.monitor_mix as f32 * sample / MONITOR_MAX as f32
        }
    }

    pub fn set_monitor_mix(&mut self, level: u8) {
        self.monitor_mix = level.min(MONITOR_MAX);
    }

    /// Nudge the monitor level, saturating at 0 and 100
    pub fn adjust_monitor_mix(&mut self, delta: i16) {
        let level = (self.monitor_mix as i16 + delta).clamp(0, MONITOR_MAX as i16);
        self.monitor_mix = level as u8;
    }

    pub fn is_muted(&self, leg: Leg) -> bool {
        match leg {
            Leg::A => self.mute_a,
            Leg::B => self.mute_b,
        }
    }

    pub fn set_muted(&mut self, leg: Leg, muted: bool) {
        match leg {
            Leg::A => self.mute_a = muted,
            Leg::B => self.mute_b = muted,
        }
    }

    /// Legs this track's port should be connected to
    pub fn routed_legs(&self) -> Legs {
        Legs::unmuted(self.mute_a, self.mute_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_levels() {
        let mut track = Track::new();
        let sample = 0.8f32;

        track.set_monitor_mix(100);
        assert_eq!(track.mix(sample), sample);

        track.set_monitor_mix(0);
        assert_eq!(track.mix(sample), 0.0);

        for level in [1u8, 50, 99] {
            track.set_monitor_mix(level);
            let expected = level as f32 * sample / 100.0;
            assert!((track.mix(sample) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mix_silenced_when_recording_or_fully_muted() {
        let mut track = Track::new();
        track.recording = true;
        assert_eq!(track.mix(0.5), 0.0);

        track.recording = false;
        track.mute_a = true;
        assert_eq!(track.mix(0.5), 0.5);
        track.mute_b = true;
        assert_eq!(track.mix(0.5), 0.0);
    }

    #[test]
    fn test_monitor_mix_saturates() {
        let mut track = Track::new();
        track.adjust_monitor_mix(5);
        assert_eq!(track.monitor_mix, 100);

        track.set_monitor_mix(2);
        track.adjust_monitor_mix(-5);
        assert_eq!(track.monitor_mix, 0);

        track.set_monitor_mix(250);
        assert_eq!(track.monitor_mix, 100);
    }

    #[test]
    fn test_routed_legs() {
        let mut track = Track::new();
        assert_eq!(track.routed_legs(), Legs::BOTH);
        track.set_muted(Leg::B, true);
        assert_eq!(track.routed_legs(), Legs::A);
        assert!(track.is_muted(Leg::B));
    }
}
