//! Consultation list grouped by category.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::consultation::ConsultationStore;

pub struct Sidebar;

impl Sidebar {
    pub fn render(store: &ConsultationStore, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Ai 무료 법률 비서 ");
        let inner = block.inner(area);
        block.render(area, buf);

        let mut lines: Vec<Line> = vec![
            Line::from(Span::styled(
                "상담 내역",
                Style::default()
                    .fg(Color::Gray)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];

        let active_id = store.active_id();
        for (category, consultations) in store.grouped() {
            lines.push(Line::from(Span::styled(
                format!("● {category}"),
                Style::default().fg(Color::Cyan),
            )));
            for consultation in consultations {
                let is_active = active_id == Some(consultation.id.as_str());
                let style = if is_active {
                    Style::default()
                        .fg(Color::White)
                        .bg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Gray)
                };
                lines.push(Line::from(Span::styled(
                    format!("  {}", consultation.title),
                    style,
                )));
                lines.push(Line::from(Span::styled(
                    format!("    {}", consultation.date),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            lines.push(Line::from(""));
        }

        lines.push(Line::from(Span::styled(
            "/new 새 상담 · Ctrl+↑/↓ 이동",
            Style::default().fg(Color::DarkGray),
        )));

        for (i, line) in lines.iter().enumerate() {
            if i >= inner.height as usize {
                break;
            }
            buf.set_line(inner.x, inner.y + i as u16, line, inner.width);
        }
    }
}
