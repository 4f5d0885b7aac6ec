// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Routing of track ports to the stereo hardware legs.

use super::{Clock, PortId};
use crate::engine::TrackOutputs;

/// Hardware input/output leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    /// Left output, first capture channel
    A,
    /// Right output, second capture channel
    B,
}

impl Leg {
    pub fn name(&self) -> &'static str {
        match self {
            Leg::A => "A",
            Leg::B => "B",
        }
    }
}

/// Set of legs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Legs {
    a: bool,
    b: bool,
}

impl Legs {
    pub const NONE: Legs = Legs { a: false, b: false };
    pub const A: Legs = Legs { a: true, b: false };
    pub const B: Legs = Legs { a: false, b: true };
    pub const BOTH: Legs = Legs { a: true, b: true };

    /// Legs a track with these mutes is routed to
    pub fn unmuted(mute_a: bool, mute_b: bool) -> Self {
        Self {
            a: !mute_a,
            b: !mute_b,
        }
    }

    pub fn contains(&self, leg: Leg) -> bool {
        match leg {
            Leg::A => self.a,
            Leg::B => self.b,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.a && !self.b
    }

    pub fn union(self, other: Legs) -> Legs {
        Legs {
            a: self.a || other.a,
            b: self.b || other.b,
        }
    }

    pub fn without(self, other: Legs) -> Legs {
        Legs {
            a: self.a && !other.a,
            b: self.b && !other.b,
        }
    }
}

impl From<Leg> for Legs {
    fn from(leg: Leg) -> Self {
        match leg {
            Leg::A => Legs::A,
            Leg::B => Legs::B,
        }
    }
}

/// Port connection table
#[derive(Debug, Clone, Default)]
pub struct Routing {
    connections: Vec<Legs>,
}

impl Routing {
    pub fn new(ports: usize) -> Self {
        Self {
            connections: vec![Legs::NONE; ports],
        }
    }

    pub fn connect(&mut self, port: PortId, legs: Legs) {
        if let Some(current) = self.connections.get_mut(port.index()) {
            *current = current.union(legs);
        }
    }

    pub fn disconnect(&mut self, port: PortId, legs: Legs) {
        if let Some(current) = self.connections.get_mut(port.index()) {
            *current = current.without(legs);
        }
    }

    pub fn legs(&self, port: PortId) -> Legs {
        self.connections
            .get(port.index())
            .copied()
            .unwrap_or(Legs::NONE)
    }

    /// Sum every connected port into interleaved hardware output.
    ///
    /// Leg A is channel 0 and leg B channel 1; further channels are silent.
    pub fn mixdown(&self, outputs: &TrackOutputs, frames: usize, data: &mut [f32], channels: usize) {
        data[..frames * channels].fill(0.0);
        for (index, legs) in self.connections.iter().enumerate() {
            if legs.is_empty() || index >= outputs.tracks() {
                continue;
            }
            let samples = &outputs.port(PortId::new(index))[..frames];
            for (frame, sample) in data.chunks_exact_mut(channels).zip(samples) {
                if legs.a {
                    frame[0] += *sample;
                }
                if legs.b && channels > 1 {
                    frame[1] += *sample;
                }
            }
        }
    }
}

/// Clock state kept on the adapter side of the callback
#[derive(Debug, Clone, Default)]
pub struct RoutedClock {
    routing: Routing,
    rolling: bool,
    position: u64,
}

impl RoutedClock {
    pub fn new(routing: Routing) -> Self {
        Self {
            routing,
            rolling: false,
            position: 0,
        }
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    pub fn is_rolling(&self) -> bool {
        self.rolling
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the transport position on after a period
    pub fn advance(&mut self, frames: usize) {
        if self.rolling {
            self.position += frames as u64;
        }
    }
}

impl Clock for RoutedClock {
    fn start(&mut self) {
        self.rolling = true;
    }

    fn stop(&mut self) {
        self.rolling = false;
    }

    fn locate(&mut self, frame: u64) {
        self.position = frame;
    }

    fn connect(&mut self, port: PortId, legs: Legs) {
        self.routing.connect(port, legs);
    }

    fn disconnect(&mut self, port: PortId, legs: Legs) {
        self.routing.disconnect(port, legs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_disconnect() {
        let mut routing = Routing::new(2);
        let port = PortId::new(1);

        routing.connect(port, Legs::A);
        routing.connect(port, Legs::B);
        assert_eq!(routing.legs(port), Legs::BOTH);

        routing.disconnect(port, Legs::A);
        assert_eq!(routing.legs(port), Legs::B);
        assert_eq!(routing.legs(PortId::new(7)), Legs::NONE);
    }

    #[test]
    fn test_mixdown_sums_into_legs() {
        let mut outputs = TrackOutputs::new(3, 4);
        outputs.port_mut(PortId::new(0))[..4].fill(0.25);
        outputs.port_mut(PortId::new(1))[..4].fill(0.5);
        outputs.port_mut(PortId::new(2))[..4].fill(1.0);

        let mut routing = Routing::new(3);
        routing.connect(PortId::new(0), Legs::BOTH);
        routing.connect(PortId::new(1), Legs::A);

        let mut data = vec![9.0f32; 4 * 3];
        routing.mixdown(&outputs, 4, &mut data, 3);
        for frame in data.chunks(3) {
            assert_eq!(frame, &[0.75, 0.25, 0.0]);
        }
    }

    #[test]
    fn test_routed_clock_position() {
        let mut clock = RoutedClock::new(Routing::new(1));
        clock.locate(100);
        clock.advance(64);
        assert_eq!(clock.position(), 100);

        clock.start();
        clock.advance(64);
        assert_eq!(clock.position(), 164);
        assert!(clock.is_rolling());
    }

    #[test]
    fn test_legs_unmuted() {
        assert_eq!(Legs::unmuted(false, false), Legs::BOTH);
        assert_eq!(Legs::unmuted(true, false), Legs::B);
        assert!(Legs::unmuted(true, true).is_empty());
        assert!(Legs::from(Leg::A).contains(Leg::A));
    }
}
