// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Terminal UI for tapedeck.
//!
//! Provides a ratatui-based terminal interface with the transport bar, the
//! track list, a status line and a help overlay.

mod tracks;
mod transport;

pub use tracks::TracksWidget;
pub use transport::{format_position, TransportWidget};

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};

use crate::control::{format_shortcut, step_selection, ControlAction, KeyboardController};
use crate::engine::StatusSnapshot;
use crate::session::{ConfigMismatch, Link, Session};

/// Order of the help sections
const HELP_CATEGORIES: [&str; 4] = ["Transport", "Tracks", "Record", "UI"];

/// How long a status message stays up
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything drawn in one frame
#[derive(Debug, Clone)]
pub struct View {
    pub project: String,
    pub snapshot: StatusSnapshot,
    pub mismatch: Option<ConfigMismatch>,
    pub link: Link,
    /// Reconnect attempts so far
    pub attempts: u32,
    pub message: Option<String>,
    pub underruns: u32,
    pub dropped_blocks: u32,
}

impl Default for View {
    fn default() -> Self {
        Self {
            project: String::new(),
            snapshot: StatusSnapshot::default(),
            mismatch: None,
            link: Link::Connected,
            attempts: 0,
            message: None,
            underruns: 0,
            dropped_blocks: 0,
        }
    }
}

impl View {
    pub fn from_session(session: &Session) -> Self {
        Self {
            project: session.project().name().to_string(),
            snapshot: session.snapshot(),
            mismatch: session.mismatch(),
            link: session.link().clone(),
            attempts: session.attempts(),
            message: session.message().map(str::to_string),
            underruns: session.underruns(),
            dropped_blocks: session.dropped_blocks(),
        }
    }
}

/// UI-local state
#[derive(Debug, Clone)]
pub struct UiState {
    /// Selected track
    pub selected: usize,
    /// Help text visible
    pub show_help: bool,
    /// Whether to continue running
    pub running: bool,
    /// Status message
    pub status_message: Option<String>,
    /// Status message timestamp
    pub status_time: Option<Instant>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            selected: 0,
            show_help: false,
            running: true,
            status_message: None,
            status_time: None,
        }
    }
}

impl UiState {
    /// Set a status message that will be displayed temporarily
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_time = Some(Instant::now());
    }

    /// Clear expired status message
    pub fn clear_expired_status(&mut self) {
        if let Some(time) = self.status_time {
            if time.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
                self.status_time = None;
            }
        }
    }

    /// Apply the UI side of an action.
    ///
    /// Returns the action again when the engine has to act on it.
    pub fn handle_action(&mut self, action: ControlAction, tracks: usize) -> Option<ControlAction> {
        match action {
            ControlAction::SelectNext | ControlAction::SelectPrevious => {
                self.selected = step_selection(self.selected, action, tracks);
                None
            }
            ControlAction::ToggleHelp => {
                self.show_help = !self.show_help;
                None
            }
            ControlAction::Quit => {
                self.running = false;
                None
            }
            _ => Some(action),
        }
    }
}

/// Terminal UI application
pub struct App {
    state: UiState,
    keyboard: KeyboardController,
    terminal: Terminal<CrosstermBackend<Stdout>>,
    /// Target frame rate
    frame_rate: u32,
}

impl App {
    /// Take over the terminal
    pub fn new(keyboard: KeyboardController) -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            state: UiState::default(),
            keyboard,
            terminal,
            frame_rate: 30,
        })
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut UiState {
        &mut self.state
    }

    /// Set frame rate
    pub fn set_frame_rate(&mut self, fps: u32) {
        self.frame_rate = fps.clamp(1, 120);
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Resolve a key press; returns actions the engine has to carry out
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers, tracks: usize) -> Option<ControlAction> {
        let action = self.keyboard.process_key(code, modifiers)?;
        self.state.handle_action(action, tracks)
    }

    /// Poll for events with timeout
    pub fn poll_event(&self) -> io::Result<Option<Event>> {
        let timeout = Duration::from_millis(1000 / self.frame_rate as u64);
        if event::poll(timeout)? {
            Ok(Some(event::read()?))
        } else {
            Ok(None)
        }
    }

    /// Draw the UI
    pub fn draw(&mut self, view: &View) -> io::Result<()> {
        self.state.clear_expired_status();
        let state = &self.state;
        let keyboard = &self.keyboard;

        self.terminal.draw(|frame| {
            let area = frame.area();

            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3), // Transport
                    Constraint::Min(3),    // Tracks
                    Constraint::Length(1), // Status line
                ])
                .split(area);

            frame.render_widget(
                TransportWidget::new(view).block(Block::default().borders(Borders::ALL).title(" tapedeck ")),
                chunks[0],
            );
            frame.render_widget(
                TracksWidget::new(&view.snapshot, state.selected)
                    .block(Block::default().borders(Borders::ALL).title(" Tracks ")),
                chunks[1],
            );
            render_status_line(frame, chunks[2], view, state);

            if state.show_help {
                render_help_overlay(frame, area, keyboard);
            }
        })?;

        Ok(())
    }

    /// Show import progress while a foreign tape is being converted
    pub fn draw_import(&mut self, percent: u8) -> io::Result<()> {
        self.terminal.draw(|frame| {
            let line = Line::from(vec![
                Span::styled("Importing tape ", Style::default().fg(Color::Yellow)),
                Span::raw(format!("{:3}%", percent)),
            ]);
            frame.render_widget(Paragraph::new(line), frame.area());
        })?;
        Ok(())
    }

    fn cleanup(&mut self) -> io::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Problems first, then messages, then a hint
fn status_spans<'a>(view: &'a View, state: &'a UiState) -> Vec<Span<'a>> {
    let red = Style::default().fg(Color::Red).add_modifier(Modifier::BOLD);
    let yellow = Style::default().fg(Color::Yellow);
    let mut spans = Vec::new();

    match &view.link {
        Link::Connected => {}
        Link::Disconnected => spans.push(Span::styled(
            format!(" audio clock offline, retry {} ", view.attempts),
            yellow,
        )),
        Link::Failed(reason) => spans.push(Span::styled(format!(" stopped: {} ", reason), red)),
    }
    if let Some(mismatch) = &view.mismatch {
        spans.push(Span::styled(format!(" {} ", mismatch), red));
    }
    if view.snapshot.store_errors > 0 {
        spans.push(Span::styled(format!(" {} store errors ", view.snapshot.store_errors), red));
    }
    if view.underruns > 0 {
        spans.push(Span::styled(format!(" {} underruns ", view.underruns), yellow));
    }
    if view.dropped_blocks > 0 {
        spans.push(Span::styled(format!(" {} record blocks lost ", view.dropped_blocks), red));
    }

    let message = state.status_message.as_deref().or(match view.link {
        Link::Connected => view.message.as_deref(),
        _ => None,
    });
    if let Some(message) = message {
        spans.push(Span::styled(format!(" {}", message), yellow));
    }

    if spans.is_empty() {
        spans.push(Span::styled(
            " Space: Start/Stop | G: Record | a/b: Arm | ?: Help | q: Quit",
            Style::default().fg(Color::DarkGray),
        ));
    }
    spans
}

fn render_status_line(frame: &mut Frame, area: Rect, view: &View, state: &UiState) {
    frame.render_widget(Paragraph::new(Line::from(status_spans(view, state))), area);
}

/// Help lines grouped by category
fn help_lines(keyboard: &KeyboardController) -> Vec<Line<'static>> {
    let grouped = keyboard.bindings_by_category();
    let mut lines = Vec::new();

    for category in HELP_CATEGORIES {
        let Some(bindings) = grouped.get(category) else {
            continue;
        };
        if !lines.is_empty() {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(
            category.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for binding in bindings {
            lines.push(Line::from(format!(
                "  {:<12}{}",
                format_shortcut(&binding.shortcut),
                binding.description
            )));
        }
    }
    lines
}

fn render_help_overlay(frame: &mut Frame, area: Rect, keyboard: &KeyboardController) {
    let lines = help_lines(keyboard);

    let width = 44.min(area.width.saturating_sub(4));
    let height = (lines.len() as u16 + 2).min(area.height.saturating_sub(2));
    let x = (area.width - width) / 2;
    let y = (area.height - height) / 2;
    let help_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, help_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Help ")
        .style(Style::default().bg(Color::Black));
    let inner = block.inner(help_area);
    frame.render_widget(block, help_area);
    frame.render_widget(Paragraph::new(lines), inner);
}
