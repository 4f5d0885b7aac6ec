// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tape storage for tapedeck.
//!
//! This module provides:
//! - The on-disk container (a growable float32 WAVE file)
//! - Header encoding and chunk scanning
//! - A staged, real-time safe view of the container backed by an I/O thread

pub mod container;
pub mod header;
pub mod staging;

pub use container::Container;
pub use header::WaveFormat;
pub use staging::{IoStats, IoWorker, StagedStore};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Bytes per sample (IEEE float32)
pub const SAMPLE_SIZE: usize = 4;

/// Maximum number of tracks (channels) in a container
pub const MAX_TRACKS: usize = 16;

/// Sample rate used for new containers and headers that omit it
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Seconds of silence written into a freshly created container
pub const NEW_CONTAINER_SECONDS: u32 = 4;

/// Container store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container directory not found: {0}")]
    NotFound(PathBuf),
    #[error("container I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt container: {0}")]
    Corrupt(String),
    #[error("unsupported sample format {format} ({bits} bits per sample)")]
    UnsupportedFormat { format: u16, bits: u16 },
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("write of {frames} frames at frame {frame} runs past end of data ({end} frames)")]
    OutOfBounds { frame: u64, frames: u64, end: u64 },
    #[error("{0} channels requested, at most {MAX_TRACKS} supported")]
    TooManyChannels(u16),
    #[error("I/O backlog, record block dropped")]
    Backlog,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One input leg's samples destined for a single channel slot
#[derive(Debug, Default, Clone, Copy)]
pub struct Take<'a> {
    pub channel: usize,
    pub samples: &'a [f32],
}

/// Layout used when a container has to be created from scratch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewContainer {
    pub channels: u16,
    pub sample_rate: u32,
    pub seconds: u32,
}

impl Default for NewContainer {
    fn default() -> Self {
        Self {
            channels: MAX_TRACKS as u16,
            sample_rate: DEFAULT_SAMPLE_RATE,
            seconds: NEW_CONTAINER_SECONDS,
        }
    }
}

/// Frame-addressed access to the tape, as seen by the engine.
///
/// `Container` implements this with direct file I/O; `StagedStore` implements
/// it without ever blocking, for use inside the audio callback.
pub trait FrameStore: Send {
    /// Channel count and sample rate
    fn format(&self) -> WaveFormat;

    /// Content length in frames
    fn frames(&self) -> u64;

    /// Read interleaved frames starting at `head` into `out`.
    ///
    /// Returns the number of whole frames read, which is short at end of data.
    fn read_frames(&mut self, head: u64, out: &mut [f32]) -> StoreResult<usize>;

    /// Append `count` frames of silence, returning the new length
    fn extend_by_frames(&mut self, count: u64) -> StoreResult<u64>;

    /// Replace the channel slots named by `takes` for `frames` frames at `frame`,
    /// leaving every other channel untouched
    fn overdub(&mut self, frame: u64, frames: usize, takes: &[Take<'_>]) -> StoreResult<()>;

    /// Hint that the next read starts at `head`
    fn locate(&mut self, _head: u64) {}
}
