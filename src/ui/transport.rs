// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Transport display widget.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Paragraph, Widget},
};

use super::View;

/// Top bar: head position, tape length, transport badge, rate and project
pub struct TransportWidget<'a> {
    view: &'a View,
    block: Option<Block<'a>>,
}

impl<'a> TransportWidget<'a> {
    /// Create a new transport widget
    pub fn new(view: &'a View) -> Self {
        Self { view, block: None }
    }

    /// Set the block wrapper
    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

impl Widget for TransportWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let area = if let Some(block) = self.block {
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(6),  // Badge
                Constraint::Length(2),  // Spacer
                Constraint::Length(10), // Position
                Constraint::Length(2),  // Spacer
                Constraint::Length(12), // Length
                Constraint::Length(2),  // Spacer
                Constraint::Length(9),  // Sample rate
                Constraint::Length(2),  // Spacer
                Constraint::Min(0),     // Project
            ])
            .split(area);

        let snapshot = &self.view.snapshot;
        let badge = if snapshot.transport.is_rolling() { " ROLL " } else { " STOP " };
        let badge_style = if snapshot.record_enabled {
            Style::default().fg(Color::White).bg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Black).bg(Color::Green)
        };
        Paragraph::new(badge).style(badge_style).render(chunks[0], buf);

        let rate = snapshot.sample_rate;
        Paragraph::new(format_position(snapshot.head, rate))
            .style(Style::default().fg(Color::White).bg(Color::Magenta))
            .render(chunks[2], buf);

        Paragraph::new(format!("/ {}", format_position(snapshot.last_frame, rate)))
            .style(Style::default().fg(Color::Cyan))
            .render(chunks[4], buf);

        let rate_style = if self.view.mismatch.is_some() {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        Paragraph::new(format!("{} Hz", rate))
            .style(rate_style)
            .render(chunks[6], buf);

        Paragraph::new(self.view.project.as_str())
            .style(Style::default().fg(Color::Yellow))
            .render(chunks[8], buf);
    }
}

/// Frames as `mm:ss.mmm`; minutes keep counting past an hour
pub fn format_position(frames: u64, sample_rate: u32) -> String {
    if sample_rate == 0 {
        return "00:00.000".to_string();
    }
    let millis = frames * 1000 / sample_rate as u64;
    format!(
        "{:02}:{:02}.{:03}",
        millis / 60_000,
        (millis / 1000) % 60,
        millis % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TransportState;
    use crate::session::ConfigMismatch;

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect()
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0, 44100), "00:00.000");
        assert_eq!(format_position(44100, 44100), "00:01.000");
        assert_eq!(format_position(44100 * 61 + 22050, 44100), "01:01.500");
        assert_eq!(format_position(48000 * 3600, 48000), "60:00.000");
        assert_eq!(format_position(100, 0), "00:00.000");
    }

    #[test]
    fn test_renders_badge_and_position() {
        let mut view = View::default();
        view.project = "demo".to_string();
        view.snapshot.sample_rate = 44100;
        view.snapshot.head = 44100 * 2;
        view.snapshot.last_frame = 44100 * 4;
        view.snapshot.transport = TransportState::Rolling;

        let area = Rect::new(0, 0, 60, 1);
        let mut buf = Buffer::empty(area);
        TransportWidget::new(&view).render(area, &mut buf);

        let text = row_text(&buf, 0);
        assert!(text.starts_with(" ROLL "));
        assert!(text.contains("00:02.000"));
        assert!(text.contains("/ 00:04.000"));
        assert!(text.contains("44100 Hz"));
        assert!(text.contains("demo"));
        assert_eq!(buf[(1, 0)].bg, Color::Green);
    }

    #[test]
    fn test_record_enable_and_mismatch_are_red() {
        let mut view = View::default();
        view.snapshot.sample_rate = 44100;
        view.snapshot.record_enabled = true;
        view.mismatch = Some(ConfigMismatch::SampleRateMismatch {
            container: 44100,
            clock: 48000,
        });

        let area = Rect::new(0, 0, 60, 1);
        let mut buf = Buffer::empty(area);
        TransportWidget::new(&view).render(area, &mut buf);

        assert!(row_text(&buf, 0).starts_with(" STOP "));
        assert_eq!(buf[(1, 0)].bg, Color::Red);
        // First cell of the rate column
        assert_eq!(buf[(34, 0)].fg, Color::Red);
    }
}
