// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio clock backed by cpal.
//!
//! The output stream is the clock: each callback runs one or more engine
//! periods and mixes the track outputs down to the stereo legs. The input
//! stream pushes legs A and B into a ring that the output callback drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{error, info, warn};

use super::{register_track_ports, Clock, ClockError, RoutedClock, Routing};
use crate::engine::{Command, Engine, LatencyCompensator, Period, TrackOutputs, MAX_PERIOD};
use crate::store::FrameStore;

/// Hardware legs needed in each direction
const LEGS: usize = 2;

/// Captured frames buffered between the input and output callbacks
const CAPTURE_CAPACITY: usize = MAX_PERIOD * 4;

/// Device selection
#[derive(Debug, Clone, Default)]
pub struct ClockConfig {
    /// Name used in logs
    pub client_name: String,
    /// Output device name; the host default when unset
    pub output_device: Option<String>,
    /// Input device name; the host default when unset
    pub input_device: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Playback,
    Capture,
}

impl Direction {
    fn name(self) -> &'static str {
        match self {
            Direction::Playback => "playback",
            Direction::Capture => "capture",
        }
    }
}

/// Running pair of cpal streams driving an engine
pub struct CpalClock {
    _output: Stream,
    _input: Stream,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
}

impl CpalClock {
    /// Open the devices, register track ports and start the engine running.
    pub fn connect<S: FrameStore + 'static>(
        config: &ClockConfig,
        mut engine: Engine<S>,
        commands: Consumer<Command>,
        latency: Arc<LatencyCompensator>,
    ) -> Result<Self, ClockError> {
        let host = cpal::default_host();
        let output = find_device(&host, config.output_device.as_deref(), Direction::Playback)?;
        let input = find_device(&host, config.input_device.as_deref(), Direction::Capture)?;
        let output_name = output.name().unwrap_or_else(|_| "unknown".to_string());
        let input_name = input.name().unwrap_or_else(|_| "unknown".to_string());

        let output_config = output
            .default_output_config()
            .map_err(|e| ClockError::Unavailable(format!("no playback config: {}", e)))?;
        let input_config = input
            .default_input_config()
            .map_err(|e| ClockError::Unavailable(format!("no capture config: {}", e)))?;
        check_legs(Direction::Playback, output_config.channels())?;
        check_legs(Direction::Capture, input_config.channels())?;

        let sample_rate = output_config.sample_rate().0;
        if input_config.sample_rate().0 != sample_rate {
            warn!(
                playback = sample_rate,
                capture = input_config.sample_rate().0,
                "capture and playback run at different rates"
            );
        }

        let ports = register_track_ports(engine.tracks().len())?;
        engine.attach_ports(&ports);
        let mut clock = RoutedClock::new(Routing::new(ports.len()));
        for (port, legs) in engine.routes().collect::<Vec<_>>() {
            clock.connect(port, legs);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let (capture_tx, capture_rx) = RingBuffer::new(CAPTURE_CAPACITY);

        let input_stream: Stream = {
            let config = input_config.config();
            let capture = Capture {
                producer: capture_tx,
                channels: config.channels as usize,
                sample_rate: config.sample_rate.0,
                latency: Arc::clone(&latency),
            };
            let shutdown = Arc::clone(&shutdown);
            let stream = match input_config.sample_format() {
                SampleFormat::F32 => build_input::<f32>(&input, &config, capture, shutdown),
                SampleFormat::I16 => build_input::<i16>(&input, &config, capture, shutdown),
                SampleFormat::U16 => build_input::<u16>(&input, &config, capture, shutdown),
                other => Err(ClockError::Unavailable(format!(
                    "unsupported capture format {:?}",
                    other
                ))),
            };
            stream?
        };

        let output_stream: Stream = {
            let config = output_config.config();
            let channels = config.channels as usize;
            let renderer = Renderer {
                engine,
                commands,
                clock,
                capture: capture_rx,
                outputs: TrackOutputs::new(ports.len(), MAX_PERIOD),
                input_a: vec![0.0; MAX_PERIOD],
                input_b: vec![0.0; MAX_PERIOD],
                mix: vec![0.0; MAX_PERIOD * channels],
                channels,
                sample_rate,
                latency,
            };
            let shutdown = Arc::clone(&shutdown);
            let stream = match output_config.sample_format() {
                SampleFormat::F32 => build_output::<f32, S>(&output, &config, renderer, shutdown),
                SampleFormat::I16 => build_output::<i16, S>(&output, &config, renderer, shutdown),
                SampleFormat::U16 => build_output::<u16, S>(&output, &config, renderer, shutdown),
                other => Err(ClockError::Unavailable(format!(
                    "unsupported playback format {:?}",
                    other
                ))),
            };
            stream?
        };

        input_stream
            .play()
            .map_err(|e| ClockError::Stream(e.to_string()))?;
        output_stream
            .play()
            .map_err(|e| ClockError::Stream(e.to_string()))?;

        info!(
            client = %config.client_name,
            output = %output_name,
            input = %input_name,
            sample_rate,
            tracks = ports.len(),
            "audio clock connected"
        );

        Ok(Self {
            _output: output_stream,
            _input: input_stream,
            sample_rate,
            shutdown,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// A stream reported an error and the clock should be reconnected
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Names of the available (output, input) devices
pub fn list_devices() -> Result<(Vec<String>, Vec<String>), ClockError> {
    let host = cpal::default_host();
    let outputs = host
        .output_devices()
        .map_err(|e| ClockError::Unavailable(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    let inputs = host
        .input_devices()
        .map_err(|e| ClockError::Unavailable(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    Ok((outputs, inputs))
}

fn find_device(host: &Host, wanted: Option<&str>, direction: Direction) -> Result<Device, ClockError> {
    let unavailable = |e: cpal::DevicesError| ClockError::Unavailable(e.to_string());
    let has_name = |device: &Device, name: &str| device.name().map(|n| n == name).unwrap_or(false);

    let device = match (wanted, direction) {
        (Some(name), Direction::Playback) => host
            .output_devices()
            .map_err(unavailable)?
            .find(|d| has_name(d, name)),
        (Some(name), Direction::Capture) => host
            .input_devices()
            .map_err(unavailable)?
            .find(|d| has_name(d, name)),
        (None, Direction::Playback) => host.default_output_device(),
        (None, Direction::Capture) => host.default_input_device(),
    };

    device.ok_or_else(|| match wanted {
        Some(name) => ClockError::Unavailable(format!("no {} device named {}", direction.name(), name)),
        None => ClockError::Unavailable(format!("no default {} device", direction.name())),
    })
}

fn check_legs(direction: Direction, channels: u16) -> Result<(), ClockError> {
    if (channels as usize) < LEGS {
        return Err(ClockError::PortRegistrationFailed {
            direction: direction.name(),
            required: LEGS,
            found: channels as usize,
        });
    }
    Ok(())
}

fn frames_for(delay: Duration, sample_rate: u32) -> u32 {
    (delay.as_secs_f64() * sample_rate as f64).round() as u32
}

/// State moved into the input callback
struct Capture {
    producer: Producer<[f32; 2]>,
    channels: usize,
    sample_rate: u32,
    latency: Arc<LatencyCompensator>,
}

impl Capture {
    fn capture<T>(&mut self, data: &[T], info: &cpal::InputCallbackInfo)
    where
        T: Sample,
        f32: FromSample<T>,
    {
        let timestamp = info.timestamp();
        if let Some(delay) = timestamp.callback.duration_since(&timestamp.capture) {
            self.latency.set_capture(frames_for(delay, self.sample_rate));
        }

        for frame in data.chunks_exact(self.channels) {
            let legs = [frame[0].to_sample::<f32>(), frame[1].to_sample::<f32>()];
            if self.producer.push(legs).is_err() {
                break;
            }
        }
    }
}

/// State moved into the output callback
struct Renderer<S: FrameStore> {
    engine: Engine<S>,
    commands: Consumer<Command>,
    clock: RoutedClock,
    capture: Consumer<[f32; 2]>,
    outputs: TrackOutputs,
    input_a: Vec<f32>,
    input_b: Vec<f32>,
    /// Interleaved mixdown at the device channel count
    mix: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    latency: Arc<LatencyCompensator>,
}

impl<S: FrameStore> Renderer<S> {
    fn render<T>(&mut self, data: &mut [T], info: &cpal::OutputCallbackInfo)
    where
        T: Sample + FromSample<f32>,
    {
        let timestamp = info.timestamp();
        if let Some(delay) = timestamp.playback.duration_since(&timestamp.callback) {
            self.latency.set_playback(frames_for(delay, self.sample_rate));
        }

        self.engine
            .process_commands(&mut self.commands, &mut self.clock);

        // Larger callbacks are split into engine-sized periods
        for chunk in data.chunks_mut(MAX_PERIOD * self.channels) {
            let frames = chunk.len() / self.channels;
            for i in 0..frames {
                let [a, b] = self.capture.pop().unwrap_or([0.0; 2]);
                self.input_a[i] = a;
                self.input_b[i] = b;
            }

            self.outputs.silence(frames);
            let mut period = Period {
                frames,
                input_a: &self.input_a[..frames],
                input_b: &self.input_b[..frames],
                outputs: &mut self.outputs,
            };
            self.engine.process(&mut period, &mut self.clock);

            self.clock
                .routing()
                .mixdown(&self.outputs, frames, &mut self.mix, self.channels);
            for (out, sample) in chunk.iter_mut().zip(&self.mix) {
                *out = T::from_sample(*sample);
            }
            self.clock.advance(frames);
        }
    }
}

fn build_input<T>(
    device: &Device,
    config: &StreamConfig,
    mut capture: Capture,
    shutdown: Arc<AtomicBool>,
) -> Result<Stream, ClockError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], info: &cpal::InputCallbackInfo| capture.capture(data, info),
            move |err| {
                error!("capture stream error: {}", err);
                shutdown.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| ClockError::Stream(e.to_string()))
}

fn build_output<T, S>(
    device: &Device,
    config: &StreamConfig,
    mut renderer: Renderer<S>,
    shutdown: Arc<AtomicBool>,
) -> Result<Stream, ClockError>
where
    T: SizedSample + FromSample<f32>,
    S: FrameStore + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| renderer.render(data, info),
            move |err| {
                error!("playback stream error: {}", err);
                shutdown.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| ClockError::Stream(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_for_duration() {
        assert_eq!(frames_for(Duration::from_millis(10), 48000), 480);
        assert_eq!(frames_for(Duration::ZERO, 44100), 0);
    }

    #[test]
    fn test_check_legs() {
        assert!(check_legs(Direction::Playback, 2).is_ok());
        assert!(matches!(
            check_legs(Direction::Capture, 1),
            Err(ClockError::PortRegistrationFailed {
                direction: "capture",
                required: 2,
                found: 1
            })
        ));
    }
}
