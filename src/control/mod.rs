// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Control surface actions.
//!
//! Key presses resolve to a [`ControlAction`]. Actions that change the engine
//! become a [`Command`] for the selected track; the rest (selection, help,
//! quit) are handled by the UI.

pub mod keyboard;

pub use keyboard::{format_shortcut, KeyBinding, KeyboardController, Shortcut};

use crate::clock::Leg;
use crate::config::TransportConfig;
use crate::engine::track::MONITOR_MAX;
use crate::engine::{Command, SeekTarget, StatusSnapshot};

/// Action that can be triggered by controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    // Navigation
    /// Select the track below
    SelectNext,
    /// Select the track above
    SelectPrevious,

    // Monitor mix
    MonitorUp,
    MonitorDown,
    MonitorFull,
    MonitorOff,
    /// Toggle the leg-A route of the selected track
    ToggleMuteA,
    /// Toggle the leg-B route of the selected track
    ToggleMuteB,
    /// Toggle both legs of the selected track
    ToggleMute,
    /// Mute every track, or unmute all if everything is muted
    ToggleMuteAll,

    // Recording
    ArmA,
    ArmB,
    ToggleRecord,

    // Transport
    TogglePlay,
    Home,
    End,
    SeekBack,
    SeekForward,
    SeekBackLarge,
    SeekForwardLarge,

    // UI
    ClearErrors,
    ToggleHelp,
    Quit,
}

impl ControlAction {
    /// Check if this is a transport action
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ControlAction::TogglePlay
                | ControlAction::Home
                | ControlAction::End
                | ControlAction::SeekBack
                | ControlAction::SeekForward
                | ControlAction::SeekBackLarge
                | ControlAction::SeekForwardLarge
        )
    }

    /// Check if this acts on the selected track
    pub fn is_track(&self) -> bool {
        matches!(
            self,
            ControlAction::MonitorUp
                | ControlAction::MonitorDown
                | ControlAction::MonitorFull
                | ControlAction::MonitorOff
                | ControlAction::ToggleMuteA
                | ControlAction::ToggleMuteB
                | ControlAction::ToggleMute
                | ControlAction::ToggleMuteAll
                | ControlAction::ArmA
                | ControlAction::ArmB
        )
    }

    /// The engine command for this action, if it has one.
    ///
    /// Track actions with no tracks to act on resolve to `None`.
    pub fn command(
        &self,
        selected: usize,
        snapshot: &StatusSnapshot,
        steps: &SeekSteps,
    ) -> Option<Command> {
        if self.is_track() && selected >= snapshot.tracks.len() {
            return None;
        }
        let track = selected;
        let command = match self {
            ControlAction::MonitorUp => Command::AdjustMonitor { track, delta: 1 },
            ControlAction::MonitorDown => Command::AdjustMonitor { track, delta: -1 },
            ControlAction::MonitorFull => Command::SetMonitor {
                track,
                level: MONITOR_MAX,
            },
            ControlAction::MonitorOff => Command::SetMonitor { track, level: 0 },
            ControlAction::ToggleMuteA => Command::ToggleMute { track, leg: Leg::A },
            ControlAction::ToggleMuteB => Command::ToggleMute { track, leg: Leg::B },
            ControlAction::ToggleMute => Command::ToggleMuteBoth { track },
            // Every track follows the inverse of the selected track's leg A
            ControlAction::ToggleMuteAll => Command::SetAllMuted(!snapshot.tracks[track].mute_a),
            ControlAction::ArmA => Command::ToggleArm { leg: Leg::A, track },
            ControlAction::ArmB => Command::ToggleArm { leg: Leg::B, track },
            ControlAction::ToggleRecord => Command::ToggleRecordEnable,
            ControlAction::TogglePlay => Command::TogglePlay,
            ControlAction::Home => Command::Seek(SeekTarget::Home),
            ControlAction::End => Command::Seek(SeekTarget::End),
            ControlAction::SeekBack => Command::Seek(SeekTarget::Relative(-steps.small)),
            ControlAction::SeekForward => Command::Seek(SeekTarget::Relative(steps.small)),
            ControlAction::SeekBackLarge => Command::Seek(SeekTarget::Relative(-steps.large)),
            ControlAction::SeekForwardLarge => Command::Seek(SeekTarget::Relative(steps.large)),
            ControlAction::ClearErrors => Command::ClearErrors,
            ControlAction::SelectNext
            | ControlAction::SelectPrevious
            | ControlAction::ToggleHelp
            | ControlAction::Quit => return None,
        };
        Some(command)
    }
}

/// Relative seek distances in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekSteps {
    pub small: i64,
    pub large: i64,
}

impl SeekSteps {
    pub fn new(config: &TransportConfig, sample_rate: u32) -> Self {
        Self {
            small: config.seek_small_seconds as i64 * sample_rate as i64,
            large: config.seek_large_seconds as i64 * sample_rate as i64,
        }
    }
}

/// Move a selection by one step within `count` entries
pub fn step_selection(selected: usize, action: ControlAction, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    match action {
        ControlAction::SelectNext => (selected + 1).min(count - 1),
        ControlAction::SelectPrevious => selected.saturating_sub(1),
        _ => selected.min(count - 1),
    }
}
