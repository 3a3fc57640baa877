//! Message log display: prose, document drafts, citations and attachments.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::consultation::{Consultation, Role};
use crate::document::{Segment, split_segments};

/// Scrollable view over the active consultation's messages.
pub struct ChatHistory {
    /// Lines scrolled up from the bottom; 0 follows the stream.
    scroll_from_bottom: usize,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self {
            scroll_from_bottom: 0,
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(3);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(3);
    }

    pub fn reset_scroll(&mut self) {
        self.scroll_from_bottom = 0;
    }

    pub fn render(
        &self,
        consultation: Option<&Consultation>,
        streaming: bool,
        area: Rect,
        buf: &mut Buffer,
    ) {
        let title = consultation
            .map(|c| format!(" {} · {} ", c.title, c.category))
            .unwrap_or_else(|| " Ai 무료 법률 상담소 ".to_string());
        let block = Block::default().borders(Borders::ALL).title(title);
        let inner = block.inner(area);
        block.render(area, buf);

        let lines = match consultation {
            Some(consultation) => self.message_lines(consultation, streaming, inner.width),
            None => welcome_lines(),
        };

        let height = inner.height as usize;
        let bottom = lines.len().saturating_sub(self.scroll_from_bottom);
        let start = bottom.saturating_sub(height);
        for (i, line) in lines[start..bottom].iter().enumerate() {
            buf.set_line(inner.x, inner.y + i as u16, line, inner.width);
        }
    }

    fn message_lines(
        &self,
        consultation: &Consultation,
        streaming: bool,
        width: u16,
    ) -> Vec<Line<'static>> {
        let width = width.saturating_sub(2) as usize;
        let mut lines = Vec::new();
        let mut document_index = 0usize;
        let message_count = consultation.messages.len();

        for (i, message) in consultation.messages.iter().enumerate() {
            let is_streaming_message = streaming && i + 1 == message_count;
            match message.role {
                Role::User => render_user_message(&mut lines, message, width),
                Role::Model => render_model_message(
                    &mut lines,
                    message,
                    width,
                    &mut document_index,
                    is_streaming_message,
                ),
            }
            lines.push(Line::from(""));
        }
        lines
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn render_user_message(
    lines: &mut Vec<Line<'static>>,
    message: &crate::consultation::ChatMessage,
    width: usize,
) {
    lines.push(Line::from(Span::styled(
        format!("나 {}", "─".repeat(20)),
        Style::default().fg(Color::DarkGray),
    )));
    for attachment in &message.attachments {
        lines.push(Line::from(Span::styled(
            format!("  📎 {} ({})", attachment.name, attachment.mime_type),
            Style::default().fg(Color::Gray),
        )));
    }
    for text in wrap_text(&message.content, width) {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(text, Style::default().fg(Color::Blue)),
        ]));
    }
}

fn render_model_message(
    lines: &mut Vec<Line<'static>>,
    message: &crate::consultation::ChatMessage,
    width: usize,
    document_index: &mut usize,
    is_streaming: bool,
) {
    lines.push(Line::from(Span::styled(
        format!("Ai 법률 비서 {}", "─".repeat(20)),
        Style::default().fg(Color::DarkGray),
    )));

    let segments = split_segments(&message.content);
    if segments.is_empty() && is_streaming {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled("▋", Style::default().fg(Color::Green)),
        ]));
    }

    for segment in segments {
        match segment {
            Segment::Prose(text) => {
                for wrapped in wrap_text(&text, width) {
                    lines.push(Line::from(vec![
                        Span::raw("  "),
                        Span::styled(wrapped, Style::default().fg(Color::White)),
                    ]));
                }
            }
            Segment::Document { text, closed } => {
                *document_index += 1;
                let header = if closed {
                    format!("📄 법률 문서 초안 [{}]", document_index)
                } else {
                    format!("📄 법률 문서 초안 [{}] (작성 중…)", document_index)
                };
                lines.push(Line::from(Span::styled(
                    header,
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )));
                for wrapped in wrap_text(&text, width.saturating_sub(2)) {
                    lines.push(Line::from(vec![
                        Span::styled("  │ ", Style::default().fg(Color::Cyan)),
                        Span::styled(wrapped, Style::default().fg(Color::White)),
                    ]));
                }
                if closed {
                    lines.push(Line::from(Span::styled(
                        format!(
                            "  /copy {n} 복사 · /save {n} 저장 — 초안이므로 전문가 검토가 필요합니다",
                            n = document_index
                        ),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
            }
        }
    }

    if is_streaming && !message.content.is_empty() {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled("▋", Style::default().fg(Color::Green)),
        ]));
    }

    if !message.sources.is_empty() {
        lines.push(Line::from(Span::styled(
            "  출처 및 근거 자료",
            Style::default().fg(Color::DarkGray),
        )));
        for source in &message.sources {
            lines.push(Line::from(Span::styled(
                format!("  • {} — {}", source.title, source.uri),
                Style::default().fg(Color::Cyan),
            )));
        }
    }
}

fn welcome_lines() -> Vec<Line<'static>> {
    vec![
        Line::from(""),
        Line::from(Span::styled(
            "법률 문제, AI 전문가와 상의하세요",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "최신 판례와 법령을 실시간으로 검색하는 AI 법률 비서가",
            Style::default().fg(Color::Gray),
        )),
        Line::from(Span::styled(
            "법적 고민 해결과 서류 작성을 도와드립니다.",
            Style::default().fg(Color::Gray),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "/new 로 새로운 상담을 시작하세요. /help 로 전체 명령어를 볼 수 있습니다.",
            Style::default().fg(Color::DarkGray),
        )),
    ]
}

/// Width-aware wrapping by character count. Splits on spaces where possible
/// and hard-breaks runs longer than the width (Korean text often has none).
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in paragraph.split(' ') {
            let word_len = word.chars().count();
            if current_len > 0 && current_len + 1 + word_len > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            // Hard-break words that alone exceed the width.
            if word_len > width {
                for c in word.chars() {
                    if current_len == width {
                        lines.push(std::mem::take(&mut current));
                        current_len = 0;
                    }
                    current.push(c);
                    current_len += 1;
                }
            } else {
                current.push_str(word);
                current_len += word_len;
            }
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_splits_on_spaces_within_width() {
        let lines = wrap_text("전세 보증금 반환 문제로 상담하고 싶습니다", 12);
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
        assert_eq!(lines.join(" "), "전세 보증금 반환 문제로 상담하고 싶습니다");
    }

    #[test]
    fn wrap_hard_breaks_long_runs() {
        let lines = wrap_text(&"가".repeat(25), 10);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].chars().count(), 10);
    }

    #[test]
    fn wrap_preserves_explicit_newlines() {
        let lines = wrap_text("첫 줄\n둘째 줄", 20);
        assert_eq!(lines, vec!["첫 줄", "둘째 줄"]);
    }
}
