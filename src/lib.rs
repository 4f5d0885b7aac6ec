// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! tapedeck - a tape-style multitrack recorder.
//!
//! Up to sixteen mono tracks live in one 32-bit float WAVE file. Playback
//! mixes every track onto a stereo pair; recording overdubs one or two
//! armed tracks from the stereo input while the rest play back.

pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod project;
pub mod session;
pub mod store;
pub mod ui;
