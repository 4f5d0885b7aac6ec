// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Period buffers shared between the clock and the engine.

use crate::clock::PortId;

/// Interleaved frames read from the tape
#[derive(Debug, Clone, Copy)]
pub struct Frames<'a> {
    samples: &'a [f32],
    channels: usize,
}

impl<'a> Frames<'a> {
    pub fn new(samples: &'a [f32], channels: usize) -> Self {
        let whole = samples.len() / channels * channels;
        Self {
            samples: &samples[..whole],
            channels,
        }
    }

    /// Number of whole frames
    pub fn len(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Iterate one channel across every frame
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + 'a {
        self.samples
            .chunks_exact(self.channels)
            .map(move |frame| frame[channel])
    }
}

/// Planar per-track output buffers, addressed by port
#[derive(Debug, Clone)]
pub struct TrackOutputs {
    samples: Vec<f32>,
    tracks: usize,
    capacity: usize,
}

impl TrackOutputs {
    /// Preallocate `tracks` buffers of `capacity` frames
    pub fn new(tracks: usize, capacity: usize) -> Self {
        Self {
            samples: vec![0.0; tracks * capacity],
            tracks,
            capacity,
        }
    }

    pub fn tracks(&self) -> usize {
        self.tracks
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn port(&self, port: PortId) -> &[f32] {
        let start = port.index() * self.capacity;
        &self.samples[start..start + self.capacity]
    }

    pub fn port_mut(&mut self, port: PortId) -> &mut [f32] {
        let start = port.index() * self.capacity;
        &mut self.samples[start..start + self.capacity]
    }

    /// Zero the first `frames` frames of every buffer
    pub fn silence(&mut self, frames: usize) {
        let frames = frames.min(self.capacity);
        for buffer in self.samples.chunks_exact_mut(self.capacity) {
            buffer[..frames].fill(0.0);
        }
    }
}

/// One period as handed to the engine by the clock
pub struct Period<'a> {
    pub frames: usize,
    /// Capture leg A
    pub input_a: &'a [f32],
    /// Capture leg B
    pub input_b: &'a [f32],
    pub outputs: &'a mut TrackOutputs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_view() {
        let samples = [0.0, 1.0, 2.0, 10.0, 11.0, 12.0, 99.0];
        let frames = Frames::new(&samples, 3);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames.channel(0).collect::<Vec<_>>(), vec![0.0, 10.0]);
        assert_eq!(frames.channel(2).collect::<Vec<_>>(), vec![2.0, 12.0]);
    }

    #[test]
    fn test_track_outputs_are_independent() {
        let mut outputs = TrackOutputs::new(2, 8);
        outputs.port_mut(PortId::new(1)).fill(1.0);

        assert!(outputs.port(PortId::new(0)).iter().all(|s| *s == 0.0));
        assert!(outputs.port(PortId::new(1)).iter().all(|s| *s == 1.0));

        outputs.silence(4);
        assert_eq!(&outputs.port(PortId::new(1))[..5], &[0.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
