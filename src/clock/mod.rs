// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The external audio clock.
//!
//! This module provides:
//! - The [`Clock`] interface the engine drives (transport and port routing)
//! - Track port registration and stereo leg routing
//! - A cpal-backed clock that runs the engine from the output stream

pub mod cpal_clock;
pub mod routing;

pub use cpal_clock::{list_devices, ClockConfig, CpalClock};
pub use routing::{Leg, Legs, RoutedClock, Routing};

use thiserror::Error;

use crate::store::MAX_TRACKS;

/// Opaque handle of a track output port, assigned at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(usize);

impl PortId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Audio clock errors
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("audio clock unavailable: {0}")]
    Unavailable(String),
    #[error("{direction} needs {required} channels, device has {found}")]
    PortRegistrationFailed {
        direction: &'static str,
        required: usize,
        found: usize,
    },
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Transport and routing controls of the external clock.
///
/// Called from the audio callback, so implementations must not block.
pub trait Clock {
    /// Start the clock's own transport
    fn start(&mut self);

    /// Stop the clock's own transport
    fn stop(&mut self);

    /// Move the clock's transport position
    fn locate(&mut self, frame: u64);

    /// Route a track port to hardware legs
    fn connect(&mut self, port: PortId, legs: Legs);

    /// Remove a track port from hardware legs
    fn disconnect(&mut self, port: PortId, legs: Legs);
}

/// Clock that ignores every request; used before a stream exists
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClock;

impl Clock for NullClock {
    fn start(&mut self) {}
    fn stop(&mut self) {}
    fn locate(&mut self, _frame: u64) {}
    fn connect(&mut self, _port: PortId, _legs: Legs) {}
    fn disconnect(&mut self, _port: PortId, _legs: Legs) {}
}

/// Register one output port per track
pub fn register_track_ports(tracks: usize) -> Result<Vec<PortId>, ClockError> {
    if tracks > MAX_TRACKS {
        return Err(ClockError::PortRegistrationFailed {
            direction: "track outputs",
            required: tracks,
            found: MAX_TRACKS,
        });
    }
    Ok((0..tracks).map(PortId::new).collect())
}
