use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::ui::commands::{CommandEntry, ParsedCommand, command_entries, parse_slash_command};

const PLACEHOLDER: &str =
    "법률 상담 내용을 입력하세요. (예: 전세 보증금을 못 받고 있는데 내용증명 작성해줘)";

/// Result returned when the user interacts with the composer.
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// Message input box with a slash-command palette.
///
/// Cursor positions are character indices, not byte offsets; Korean input
/// moves one syllable at a time.
pub struct ChatComposer {
    content: String,
    cursor: usize,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    palette_open: bool,
    selected_command: Option<usize>,
}

impl ChatComposer {
    pub fn new() -> Self {
        Self {
            content: String::new(),
            cursor: 0,
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            palette_open: false,
            selected_command: None,
        }
    }

    /// Handle key input.
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                } else if self.palette_open && !self.typed_command_is_exact() {
                    self.apply_selected_command();
                } else if !self.content.trim().is_empty() {
                    let content = std::mem::take(&mut self.content);
                    self.cursor = 0;
                    self.close_palette();
                    return match parse_slash_command(&content) {
                        Some(command) => ComposerResult::Command(command),
                        None => ComposerResult::Submitted(content),
                    };
                }
            }
            KeyCode::Up if self.palette_open => self.move_command_selection(-1),
            KeyCode::Down if self.palette_open => self.move_command_selection(1),
            KeyCode::Esc if self.palette_open => self.close_palette(),
            KeyCode::Tab if self.palette_open => self.apply_selected_command(),
            KeyCode::Char(c) => {
                self.insert_char(c);
                self.sync_palette();
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = self.byte_index(self.cursor);
                    self.content.remove(at);
                    self.sync_palette();
                }
            }
            KeyCode::Delete => {
                if self.cursor < self.char_len() {
                    let at = self.byte_index(self.cursor);
                    self.content.remove(at);
                    self.sync_palette();
                }
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.char_len()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.char_len(),
            _ => {}
        }

        ComposerResult::None
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
        self.close_palette();
    }

    fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// True when the typed text already names a command outright, so Enter
    /// should submit instead of autocompleting.
    fn typed_command_is_exact(&self) -> bool {
        let typed = self.content.trim_start_matches('/');
        self.filtered_commands
            .iter()
            .any(|entry| entry.keyword == typed)
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.content
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len())
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.content.insert(at, c);
        self.cursor += 1;
    }

    /// Opens, refreshes or closes the palette to match the current content.
    fn sync_palette(&mut self) {
        let is_command_prefix =
            self.content.starts_with('/') && !self.content.contains(char::is_whitespace);
        if is_command_prefix {
            if !self.palette_open {
                self.palette_open = true;
                self.selected_command = Some(0);
            }
            self.refresh_palette();
        } else {
            self.close_palette();
        }
    }

    fn close_palette(&mut self) {
        self.palette_open = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_palette(&mut self) {
        let query = self.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        if self.filtered_commands.is_empty() {
            self.selected_command = None;
        } else {
            let index = self.selected_command.unwrap_or(0);
            self.selected_command = Some(index.min(self.filtered_commands.len() - 1));
        }
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }
        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len);
        self.selected_command = Some(next as usize);
    }

    fn apply_selected_command(&mut self) {
        let Some(index) = self.selected_command else {
            return;
        };
        let Some(entry) = self.filtered_commands.get(index) else {
            return;
        };
        self.content = format!("/{} ", entry.keyword);
        self.cursor = self.char_len();
        self.close_palette();
    }

    /// Render the composer and, when open, the command palette above it.
    pub fn render(&self, streaming: bool, area: Rect, buf: &mut Buffer) {
        let title = if streaming {
            "답변 생성 중... (/abort 로 중단)"
        } else {
            "상담 입력"
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(if streaming {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::Cyan)
            });
        let inner = block.inner(area);
        block.render(area, buf);

        if self.content.is_empty() {
            let placeholder = Line::from(Span::styled(
                PLACEHOLDER,
                Style::default().fg(Color::DarkGray),
            ));
            buf.set_line(inner.x, inner.y, &placeholder, inner.width);
        } else {
            let mut content = self.content.clone();
            let at = self.byte_index(self.cursor);
            content.insert(at, '▌');
            for (i, line_text) in content.split('\n').enumerate() {
                if i < inner.height as usize {
                    let line = Line::from(Span::raw(line_text.to_string()));
                    buf.set_line(inner.x, inner.y + i as u16, &line, inner.width);
                }
            }
        }

        if self.palette_open && !self.filtered_commands.is_empty() {
            self.render_palette(area, buf);
        }
    }

    fn render_palette(&self, composer_area: Rect, buf: &mut Buffer) {
        let height = (self.filtered_commands.len().min(6) + 2) as u16;
        let palette_area = Rect {
            x: composer_area.x,
            y: composer_area.y.saturating_sub(height),
            width: composer_area.width,
            height,
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title("명령어")
            .style(Style::default().fg(Color::Blue));
        let inner = block.inner(palette_area);
        block.render(palette_area, buf);

        for (index, entry) in self.filtered_commands.iter().enumerate() {
            if index >= inner.height as usize {
                break;
            }
            let style = if self.selected_command == Some(index) {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let line = Line::from(vec![
                Span::styled(format!("/{}", entry.keyword), style),
                Span::styled(" — ", Style::default().fg(Color::DarkGray)),
                Span::styled(entry.description, Style::default().fg(Color::Gray)),
            ]);
            buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
        }
    }
}

impl Default for ChatComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::commands::SlashCommand;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(composer: &mut ChatComposer, text: &str) {
        for c in text.chars() {
            composer.handle_key(press(KeyCode::Char(c)));
        }
    }

    #[test]
    fn enter_submits_trimmed_nonempty_content() {
        let mut composer = ChatComposer::new();
        type_text(&mut composer, "전세 보증금 문제");
        match composer.handle_key(press(KeyCode::Enter)) {
            ComposerResult::Submitted(text) => assert_eq!(text, "전세 보증금 문제"),
            other => panic!("expected submit, got {other:?}"),
        }
        assert!(composer.content.is_empty());
    }

    #[test]
    fn blank_content_does_not_submit() {
        let mut composer = ChatComposer::new();
        type_text(&mut composer, "   ");
        assert_eq!(composer.handle_key(press(KeyCode::Enter)), ComposerResult::None);
    }

    #[test]
    fn slash_input_becomes_a_command() {
        let mut composer = ChatComposer::new();
        type_text(&mut composer, "/copy 1");
        match composer.handle_key(press(KeyCode::Enter)) {
            ComposerResult::Command(parsed) => {
                assert_eq!(parsed.command, SlashCommand::Copy);
                assert_eq!(parsed.index_argument(), Some(1));
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn korean_editing_respects_char_boundaries() {
        let mut composer = ChatComposer::new();
        type_text(&mut composer, "보증금");
        composer.handle_key(press(KeyCode::Left));
        composer.handle_key(press(KeyCode::Backspace));
        assert_eq!(composer.content, "보금");
        composer.handle_key(press(KeyCode::Char('상')));
        assert_eq!(composer.content, "보상금");
    }

    #[test]
    fn palette_opens_on_slash_and_applies_selection() {
        let mut composer = ChatComposer::new();
        type_text(&mut composer, "/te");
        assert!(composer.palette_open);
        assert_eq!(composer.filtered_commands.len(), 1);
        composer.handle_key(press(KeyCode::Tab));
        assert_eq!(composer.content, "/terms ");
        assert!(!composer.palette_open);
    }
}
