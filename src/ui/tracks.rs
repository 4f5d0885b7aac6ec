// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Track list widget.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget},
};

use crate::engine::{StatusSnapshot, TrackStatus};

/// One row per track: name, arms, and monitor level with routing
pub struct TracksWidget<'a> {
    snapshot: &'a StatusSnapshot,
    selected: usize,
    block: Option<Block<'a>>,
}

impl<'a> TracksWidget<'a> {
    pub fn new(snapshot: &'a StatusSnapshot, selected: usize) -> Self {
        Self {
            snapshot,
            selected,
            block: None,
        }
    }

    /// Set the block wrapper
    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    fn row(&self, index: usize, track: &TrackStatus) -> Line<'static> {
        let name_style = if index == self.selected {
            Style::default().fg(Color::White).bg(Color::Blue).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let armed = Style::default().fg(Color::White).bg(Color::Red);

        let mut spans = vec![Span::styled(format!("Track {:02}:", index + 1), name_style), Span::raw(" ")];
        spans.push(if self.snapshot.arm_a == Some(index) {
            Span::styled("REC-A", armed)
        } else {
            Span::raw("     ")
        });
        spans.push(Span::raw(" "));
        spans.push(if self.snapshot.arm_b == Some(index) {
            Span::styled("REC-B", armed)
        } else {
            Span::raw("     ")
        });
        spans.push(Span::raw(" "));
        spans.push(level_span(track));
        Line::from(spans)
    }
}

impl Widget for TracksWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let area = if let Some(block) = self.block.clone() {
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        if self.snapshot.tracks.is_empty() {
            Paragraph::new("No tape loaded")
                .style(Style::default().fg(Color::DarkGray))
                .render(area, buf);
            return;
        }

        // Keep the selection on screen
        let visible = area.height as usize;
        let first = (self.selected + 1).saturating_sub(visible);

        let lines: Vec<Line> = self
            .snapshot
            .tracks
            .iter()
            .enumerate()
            .skip(first)
            .take(visible)
            .map(|(index, track)| self.row(index, track))
            .collect();
        Paragraph::new(lines).render(area, buf);
    }
}

/// `MUTE` when both legs are muted, otherwise the level and routed legs
fn level_span(track: &TrackStatus) -> Span<'static> {
    if track.mute_a && track.mute_b {
        return Span::styled(" MUTE   ", Style::default().fg(Color::Red));
    }
    let text = format!(
        "{:>4} {}{}",
        track.monitor_mix,
        if track.mute_a { " " } else { "L" },
        if track.mute_b { " " } else { "R" },
    );
    Span::styled(text, Style::default().fg(Color::Green))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(snapshot: &StatusSnapshot, selected: usize, height: u16) -> Buffer {
        let area = Rect::new(0, 0, 40, height);
        let mut buf = Buffer::empty(area);
        TracksWidget::new(snapshot, selected).render(area, &mut buf);
        buf
    }

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    #[test]
    fn test_rows() {
        let mut snapshot = StatusSnapshot {
            tracks: vec![TrackStatus::default(); 3],
            arm_a: Some(0),
            arm_b: Some(2),
            ..Default::default()
        };
        snapshot.tracks[0].monitor_mix = 100;
        snapshot.tracks[1].mute_a = true;
        snapshot.tracks[1].mute_b = true;
        snapshot.tracks[2].monitor_mix = 7;
        snapshot.tracks[2].mute_a = true;

        let buf = render(&snapshot, 1, 3);
        assert_eq!(row_text(&buf, 0), "Track 01: REC-A        100 LR");
        assert_eq!(row_text(&buf, 1), "Track 02:              MUTE");
        assert_eq!(row_text(&buf, 2), "Track 03:       REC-B    7  R");

        // Selected name is highlighted
        assert_eq!(buf[(0, 1)].bg, Color::Blue);
        assert_ne!(buf[(0, 0)].bg, Color::Blue);
    }

    #[test]
    fn test_scrolls_to_selection() {
        let snapshot = StatusSnapshot {
            tracks: vec![TrackStatus::default(); 16],
            ..Default::default()
        };
        let buf = render(&snapshot, 10, 4);
        assert!(row_text(&buf, 0).starts_with("Track 08:"));
        assert!(row_text(&buf, 3).starts_with("Track 11:"));
    }

    #[test]
    fn test_empty_tape() {
        let buf = render(&StatusSnapshot::default(), 0, 2);
        assert_eq!(row_text(&buf, 0), "No tape loaded");
    }
}
