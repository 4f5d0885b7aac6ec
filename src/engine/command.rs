// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Control commands queued for the audio callback.
//!
//! The control surface never touches engine state directly. It pushes
//! commands into a lock-free ring and the engine applies them at the start of
//! the next period.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::clock::Leg;

/// Commands waiting beyond this are dropped
pub const COMMAND_CAPACITY: usize = 256;

/// Where a seek lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    Home,
    End,
    /// Frames relative to the head
    Relative(i64),
    Absolute(i64),
}

/// A control request for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    TogglePlay,
    Seek(SeekTarget),
    SetMonitor { track: usize, level: u8 },
    AdjustMonitor { track: usize, delta: i16 },
    ToggleMute { track: usize, leg: Leg },
    /// Mute both legs, or unmute both if already fully muted
    ToggleMuteBoth { track: usize },
    SetAllMuted(bool),
    /// Arm `track` on `leg`, or disarm if it is already armed there
    ToggleArm { leg: Leg, track: usize },
    ToggleRecordEnable,
    ClearErrors,
}

impl Command {
    /// Whether this command moves or positions the tape
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Command::Start | Command::Stop | Command::TogglePlay | Command::Seek(_)
        )
    }
}

/// Control-side end of the command ring
pub struct CommandSender {
    producer: Producer<Command>,
}

impl CommandSender {
    /// Queue a command; a full ring hands it back
    pub fn send(&mut self, command: Command) -> Result<(), Command> {
        self.producer.push(command).map_err(|e| match e {
            rtrb::PushError::Full(command) => command,
        })
    }

    /// The engine end has gone away
    pub fn is_disconnected(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// Create the command ring
pub fn command_channel() -> (CommandSender, Consumer<Command>) {
    let (producer, consumer) = RingBuffer::new(COMMAND_CAPACITY);
    (CommandSender { producer }, consumer)
}
