// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Keyboard shortcut handling.
//!
//! Maps terminal key events onto [`ControlAction`]s. The default layout
//! comes from [`DEFAULT_BINDINGS`]; callers may rebind keys afterwards.

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyModifiers};

use super::ControlAction;

const NONE: KeyModifiers = KeyModifiers::NONE;
const SHIFT: KeyModifiers = KeyModifiers::SHIFT;
const CTRL: KeyModifiers = KeyModifiers::CONTROL;

/// Default layout: key, modifiers, action, help text, help group
pub const DEFAULT_BINDINGS: &[(KeyCode, KeyModifiers, ControlAction, &str, &str)] = &[
    (KeyCode::Up, NONE, ControlAction::SelectPrevious, "Previous track", "Tracks"),
    (KeyCode::Down, NONE, ControlAction::SelectNext, "Next track", "Tracks"),
    (KeyCode::Left, NONE, ControlAction::MonitorDown, "Monitor level -1", "Tracks"),
    (KeyCode::Right, NONE, ControlAction::MonitorUp, "Monitor level +1", "Tracks"),
    (KeyCode::Left, SHIFT, ControlAction::MonitorOff, "Monitor level 0", "Tracks"),
    (KeyCode::Right, SHIFT, ControlAction::MonitorFull, "Monitor level 100", "Tracks"),
    (KeyCode::Char('l'), NONE, ControlAction::ToggleMuteA, "Mute leg A (left)", "Tracks"),
    (KeyCode::Char('r'), NONE, ControlAction::ToggleMuteB, "Mute leg B (right)", "Tracks"),
    (KeyCode::Char('m'), NONE, ControlAction::ToggleMute, "Mute both legs", "Tracks"),
    (KeyCode::Char('M'), NONE, ControlAction::ToggleMuteAll, "Mute every track", "Tracks"),
    (KeyCode::Char('a'), NONE, ControlAction::ArmA, "Arm from input A", "Record"),
    (KeyCode::Char('b'), NONE, ControlAction::ArmB, "Arm from input B", "Record"),
    (KeyCode::Char('G'), NONE, ControlAction::ToggleRecord, "Record enable", "Record"),
    (KeyCode::Char(' '), NONE, ControlAction::TogglePlay, "Roll / stop tape", "Transport"),
    (KeyCode::Home, NONE, ControlAction::Home, "Rewind to start", "Transport"),
    (KeyCode::End, NONE, ControlAction::End, "Wind to end", "Transport"),
    (KeyCode::Char(','), NONE, ControlAction::SeekBack, "Back a little", "Transport"),
    (KeyCode::Char('.'), NONE, ControlAction::SeekForward, "Forward a little", "Transport"),
    (KeyCode::Char('<'), NONE, ControlAction::SeekBackLarge, "Back a lot", "Transport"),
    (KeyCode::Char('>'), NONE, ControlAction::SeekForwardLarge, "Forward a lot", "Transport"),
    (KeyCode::Char('e'), NONE, ControlAction::ClearErrors, "Clear error counters", "UI"),
    (KeyCode::Char('?'), NONE, ControlAction::ToggleHelp, "Show / hide help", "UI"),
    (KeyCode::Char('q'), NONE, ControlAction::Quit, "Quit", "UI"),
    (KeyCode::Char('c'), CTRL, ControlAction::Quit, "Quit", "UI"),
];

/// A key plus the modifiers that must be held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shortcut {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl Shortcut {
    /// Shift is dropped from printable characters: the character already
    /// carries the case, and terminals disagree on reporting it.
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        let modifiers = match code {
            KeyCode::Char(c) if c != ' ' => modifiers.difference(SHIFT),
            _ => modifiers,
        };
        Self { code, modifiers }
    }

    pub fn key(code: KeyCode) -> Self {
        Self::new(code, NONE)
    }

    pub fn ctrl(code: KeyCode) -> Self {
        Self::new(code, CTRL)
    }

    pub fn shift(code: KeyCode) -> Self {
        Self::new(code, SHIFT)
    }

    /// True when a key event triggers this shortcut
    pub fn matches(&self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        *self == Shortcut::new(code, modifiers)
    }
}

/// One entry of the key map
#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub shortcut: Shortcut,
    pub action: ControlAction,
    /// Text shown in the help overlay
    pub description: String,
    /// Help overlay group
    pub category: &'static str,
}

impl KeyBinding {
    pub fn new(shortcut: Shortcut, action: ControlAction, description: impl Into<String>) -> Self {
        Self {
            shortcut,
            action,
            description: description.into(),
            category: "General",
        }
    }

    pub fn category(mut self, category: &'static str) -> Self {
        self.category = category;
        self
    }
}

/// Key map from shortcuts to control actions
#[derive(Debug, Clone, Default)]
pub struct KeyboardController {
    bindings: HashMap<Shortcut, KeyBinding>,
}

impl KeyboardController {
    /// An empty key map
    pub fn new() -> Self {
        Self::default()
    }

    /// The key map from [`DEFAULT_BINDINGS`]
    pub fn with_defaults() -> Self {
        let mut controller = Self::new();
        for &(code, modifiers, action, description, category) in DEFAULT_BINDINGS {
            controller.add(
                KeyBinding::new(Shortcut::new(code, modifiers), action, description)
                    .category(category),
            );
        }
        controller
    }

    /// Bind a shortcut, replacing any previous binding of it
    pub fn add(&mut self, binding: KeyBinding) {
        self.bindings.insert(binding.shortcut, binding);
    }

    pub fn remove(&mut self, shortcut: &Shortcut) -> Option<KeyBinding> {
        self.bindings.remove(shortcut)
    }

    /// Action bound to a key event, if any
    pub fn process_key(&self, code: KeyCode, modifiers: KeyModifiers) -> Option<ControlAction> {
        self.bindings
            .get(&Shortcut::new(code, modifiers))
            .map(|binding| binding.action)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &KeyBinding> {
        self.bindings.values()
    }

    /// Bindings per help group, each group ordered by its shortcut text
    pub fn bindings_by_category(&self) -> HashMap<&'static str, Vec<&KeyBinding>> {
        let mut grouped: HashMap<&'static str, Vec<&KeyBinding>> = HashMap::new();
        for binding in self.bindings.values() {
            grouped.entry(binding.category).or_default().push(binding);
        }
        for group in grouped.values_mut() {
            group.sort_by_key(|binding| format_shortcut(&binding.shortcut));
        }
        grouped
    }
}

/// Shortcut text for the help overlay, e.g. `Ctrl+C` or `Shift+←`
pub fn format_shortcut(shortcut: &Shortcut) -> String {
    let mut text = String::new();
    for (flag, name) in [(CTRL, "Ctrl+"), (KeyModifiers::ALT, "Alt+"), (SHIFT, "Shift+")] {
        if shortcut.modifiers.contains(flag) {
            text.push_str(name);
        }
    }

    match shortcut.code {
        KeyCode::Char(' ') => text.push_str("Space"),
        KeyCode::Char(c) if shortcut.modifiers.contains(CTRL) => text.extend(c.to_uppercase()),
        KeyCode::Char(c) => text.push(c),
        KeyCode::F(n) => text.push_str(&format!("F{}", n)),
        KeyCode::Up => text.push('↑'),
        KeyCode::Down => text.push('↓'),
        KeyCode::Left => text.push('←'),
        KeyCode::Right => text.push('→'),
        KeyCode::Enter => text.push_str("Enter"),
        KeyCode::Esc => text.push_str("Esc"),
        KeyCode::Home => text.push_str("Home"),
        KeyCode::End => text.push_str("End"),
        _ => text.push('?'),
    }
    text
}
