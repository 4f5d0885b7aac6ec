// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tape transport state machine.
//!
//! Starting and stopping each take one faded period, so the transport passes
//! through `Start` on the way to `Rolling` and through `Stop` and `Stopping`
//! on the way back to `Stopped`.

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransportState {
    #[default]
    Stopped = 0,
    /// Fading in for one period
    Start = 1,
    Rolling = 2,
    /// Fading out for one period
    Stop = 3,
    /// Outputs silenced, clock stops at the end of the period
    Stopping = 4,
}

impl TransportState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Start,
            2 => TransportState::Rolling,
            3 => TransportState::Stop,
            4 => TransportState::Stopping,
            _ => TransportState::Stopped,
        }
    }

    /// Started and not yet asked to stop
    pub fn is_rolling(self) -> bool {
        matches!(self, TransportState::Start | TransportState::Rolling)
    }

    pub fn name(self) -> &'static str {
        match self {
            TransportState::Stopped => "STOP",
            TransportState::Start => "START",
            TransportState::Rolling => "ROLL",
            TransportState::Stop | TransportState::Stopping => "STOPPING",
        }
    }
}

/// What the clock should do once a period completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockAction {
    Start,
    Stop,
}

/// Transport with its legal transitions
#[derive(Debug, Default)]
pub struct Transport {
    state: TransportState,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Stopped -> Start
    pub fn request_start(&mut self) -> bool {
        if self.state == TransportState::Stopped {
            self.state = TransportState::Start;
            true
        } else {
            false
        }
    }

    /// Start or Rolling -> Stop
    pub fn request_stop(&mut self) -> bool {
        match self.state {
            TransportState::Start | TransportState::Rolling => {
                self.state = TransportState::Stop;
                true
            }
            _ => false,
        }
    }

    /// Advance after a period that began in `began`.
    ///
    /// A stop requested during the period leaves `Stop` in place so the
    /// fade-out happens on the next one.
    pub fn complete_period(&mut self, began: TransportState) -> Option<ClockAction> {
        match (began, self.state) {
            (TransportState::Start, TransportState::Start) => {
                self.state = TransportState::Rolling;
                Some(ClockAction::Start)
            }
            (TransportState::Stop, TransportState::Stop) => {
                self.state = TransportState::Stopping;
                None
            }
            (TransportState::Stopping, TransportState::Stopping) => {
                self.state = TransportState::Stopped;
                Some(ClockAction::Stop)
            }
            _ => None,
        }
    }

    /// Drop straight to Stopped, used when the clock goes away
    pub fn reset(&mut self) {
        self.state = TransportState::Stopped;
    }
}

/// Gain applied to frame `index` of an `n`-frame period that began in `state`
#[inline]
pub fn fade_gain(state: TransportState, index: usize, frames: usize) -> f32 {
    match state {
        TransportState::Start => index as f32 / frames as f32,
        TransportState::Stop => (frames - index) as f32 / frames as f32,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut transport = Transport::new();
        assert!(transport.request_start());
        assert!(!transport.request_start());

        assert_eq!(
            transport.complete_period(TransportState::Start),
            Some(ClockAction::Start)
        );
        assert_eq!(transport.state(), TransportState::Rolling);
        assert_eq!(transport.complete_period(TransportState::Rolling), None);

        assert!(transport.request_stop());
        assert_eq!(transport.complete_period(TransportState::Stop), None);
        assert_eq!(transport.state(), TransportState::Stopping);
        assert_eq!(
            transport.complete_period(TransportState::Stopping),
            Some(ClockAction::Stop)
        );
        assert_eq!(transport.state(), TransportState::Stopped);
    }

    #[test]
    fn test_stop_requested_mid_period_waits_for_fade() {
        let mut transport = Transport::new();
        transport.request_start();
        transport.complete_period(TransportState::Start);

        transport.request_stop();
        // The period began Rolling, so Stop must survive it
        assert_eq!(transport.complete_period(TransportState::Rolling), None);
        assert_eq!(transport.state(), TransportState::Stop);
    }

    #[test]
    fn test_stop_ignored_when_not_moving() {
        let mut transport = Transport::new();
        assert!(!transport.request_stop());
        assert_eq!(transport.state(), TransportState::Stopped);
    }

    #[test]
    fn test_fade_gain() {
        let n = 64;
        assert_eq!(fade_gain(TransportState::Start, 0, n), 0.0);
        assert_eq!(fade_gain(TransportState::Start, 32, n), 0.5);
        assert_eq!(fade_gain(TransportState::Stop, 0, n), 1.0);
        assert_eq!(fade_gain(TransportState::Stop, 48, n), 0.25);
        assert_eq!(fade_gain(TransportState::Rolling, 10, n), 1.0);
    }

    #[test]
    fn test_state_round_trip_through_u8() {
        for state in [
            TransportState::Stopped,
            TransportState::Start,
            TransportState::Rolling,
            TransportState::Stop,
            TransportState::Stopping,
        ] {
            assert_eq!(TransportState::from_u8(state.as_u8()), state);
        }
    }
}
