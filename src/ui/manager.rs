//! Coordinates the chat UI components and turns key input into actions the
//! application loop executes against the store and the model client.

use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
};

use crate::consultation::{Attachment, ConsultationStore};
use crate::ui::commands::{ParsedCommand, SlashCommand};
use crate::ui::composer::{ChatComposer, ComposerResult};
use crate::ui::history::ChatHistory;
use crate::ui::modal::Modal;
use crate::ui::sidebar::Sidebar;

const DISCLAIMER: &str = "Ai 법률 비서의 답변은 법적 효력이 없으며, 중요 사안은 변호사와 상담하십시오.";

/// Actions requested by the UI, executed by the application loop.
#[derive(Debug, PartialEq)]
pub enum ChatAction {
    None,
    Exit,
    Submit {
        text: String,
        attachments: Vec<Attachment>,
    },
    NewConsultation,
    SelectPrevious,
    SelectNext,
    Attach(Vec<PathBuf>),
    Abort,
    /// 0-based document segment index.
    CopyDocument(usize),
    /// 0-based document segment index.
    SaveDocument(usize),
}

/// Owns the transient UI state: composer text, pending attachments, the open
/// modal and the one-line status notice.
pub struct ChatManager {
    composer: ChatComposer,
    history: ChatHistory,
    pending: Vec<Attachment>,
    modal: Option<Modal>,
    notice: Option<String>,
}

impl ChatManager {
    pub fn new() -> Self {
        Self {
            composer: ChatComposer::new(),
            history: ChatHistory::new(),
            pending: Vec::new(),
            modal: None,
            notice: None,
        }
    }

    /// Handle key input.
    pub fn handle_key(&mut self, key: KeyEvent) -> ChatAction {
        if key.kind != KeyEventKind::Press {
            return ChatAction::None;
        }

        // An open modal swallows everything until dismissed.
        if self.modal.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                self.modal = None;
            }
            return ChatAction::None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Up => return ChatAction::SelectPrevious,
                KeyCode::Down => return ChatAction::SelectNext,
                KeyCode::Char('c') => return ChatAction::Exit,
                _ => {}
            }
        }

        match key.code {
            KeyCode::PageUp => {
                self.history.scroll_up();
                return ChatAction::None;
            }
            KeyCode::PageDown => {
                self.history.scroll_down();
                return ChatAction::None;
            }
            _ => {}
        }

        self.notice = None;
        match self.composer.handle_key(key) {
            ComposerResult::Submitted(text) => ChatAction::Submit {
                text,
                attachments: std::mem::take(&mut self.pending),
            },
            ComposerResult::Command(command) => self.handle_command(command),
            ComposerResult::None => ChatAction::None,
        }
    }

    fn handle_command(&mut self, parsed: ParsedCommand) -> ChatAction {
        match parsed.command {
            SlashCommand::New => ChatAction::NewConsultation,
            SlashCommand::Bye => ChatAction::Exit,
            SlashCommand::Abort => ChatAction::Abort,
            SlashCommand::Attach => {
                let paths: Vec<PathBuf> = parsed
                    .argument()
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(PathBuf::from)
                    .collect();
                if paths.is_empty() {
                    self.set_notice("사용법: /attach <파일 경로> [추가 경로...]");
                    ChatAction::None
                } else {
                    ChatAction::Attach(paths)
                }
            }
            SlashCommand::Detach => match parsed.index_argument() {
                Some(n) if n <= self.pending.len() => {
                    let removed = self.pending.remove(n - 1);
                    self.set_notice(format!("첨부 해제: {}", removed.name));
                    ChatAction::None
                }
                _ => {
                    self.set_notice("사용법: /detach <번호>");
                    ChatAction::None
                }
            },
            SlashCommand::Copy => match parsed.index_argument() {
                Some(n) => ChatAction::CopyDocument(n - 1),
                None => {
                    self.set_notice("사용법: /copy <번호>");
                    ChatAction::None
                }
            },
            SlashCommand::Save => match parsed.index_argument() {
                Some(n) => ChatAction::SaveDocument(n - 1),
                None => {
                    self.set_notice("사용법: /save <번호>");
                    ChatAction::None
                }
            },
            SlashCommand::Terms => {
                self.modal = Some(Modal::Terms);
                ChatAction::None
            }
            SlashCommand::Privacy => {
                self.modal = Some(Modal::Privacy);
                ChatAction::None
            }
            SlashCommand::Contact => {
                self.modal = Some(Modal::Contact);
                ChatAction::None
            }
            SlashCommand::Help => {
                self.modal = Some(Modal::Help);
                ChatAction::None
            }
        }
    }

    /// Queue accepted attachments for the next send.
    pub fn add_pending(&mut self, attachments: Vec<Attachment>) {
        self.pending.extend(attachments);
    }

    pub fn pending(&self) -> &[Attachment] {
        &self.pending
    }

    /// Drops composer text and pending attachments, as when switching
    /// consultations.
    pub fn reset_input(&mut self) {
        self.composer.clear();
        self.pending.clear();
        self.history.reset_scroll();
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub fn render(&self, store: &ConsultationStore, streaming: bool, area: Rect, buf: &mut Buffer) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(32), Constraint::Min(40)])
            .split(area);

        Sidebar::render(store, columns[0], buf);

        let pending_height = if self.pending.is_empty() {
            0
        } else {
            self.pending.len().min(4) as u16 + 1
        };
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(10),
                Constraint::Length(pending_height),
                Constraint::Length(4),
                Constraint::Length(1),
            ])
            .split(columns[1]);

        self.history.render(store.active(), streaming, rows[0], buf);
        if pending_height > 0 {
            self.render_pending(rows[1], buf);
        }
        self.composer.render(streaming, rows[2], buf);
        self.render_status(rows[3], buf);

        if let Some(modal) = &self.modal {
            modal.render(area, buf);
        }
    }

    fn render_pending(&self, area: Rect, buf: &mut Buffer) {
        let header = Line::from(Span::styled(
            "첨부 대기 (/detach <번호> 로 제거)",
            Style::default().fg(Color::Gray),
        ));
        buf.set_line(area.x, area.y, &header, area.width);
        for (i, attachment) in self.pending.iter().enumerate() {
            if i as u16 + 1 >= area.height {
                break;
            }
            let line = Line::from(Span::styled(
                format!("  {}. 📎 {} ({})", i + 1, attachment.name, attachment.mime_type),
                Style::default().fg(Color::Gray),
            ));
            buf.set_line(area.x, area.y + 1 + i as u16, &line, area.width);
        }
    }

    fn render_status(&self, area: Rect, buf: &mut Buffer) {
        let line = match &self.notice {
            Some(notice) => Line::from(Span::styled(
                notice.clone(),
                Style::default().fg(Color::Yellow),
            )),
            None => Line::from(Span::styled(
                DISCLAIMER,
                Style::default().fg(Color::DarkGray),
            )),
        };
        buf.set_line(area.x, area.y, &line, area.width);
    }
}

impl Default for ChatManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_line(manager: &mut ChatManager, text: &str) -> ChatAction {
        for c in text.chars() {
            manager.handle_key(press(KeyCode::Char(c)));
        }
        manager.handle_key(press(KeyCode::Enter))
    }

    #[test]
    fn submit_takes_the_pending_attachments() {
        let mut manager = ChatManager::new();
        manager.add_pending(vec![Attachment {
            name: "증거.png".to_string(),
            mime_type: "image/png".to_string(),
            data: "data:image/png;base64,AAAA".to_string(),
        }]);

        match type_line(&mut manager, "상담 내용") {
            ChatAction::Submit { text, attachments } => {
                assert_eq!(text, "상담 내용");
                assert_eq!(attachments.len(), 1);
            }
            other => panic!("expected submit, got {other:?}"),
        }
        assert!(manager.pending().is_empty());
    }

    #[test]
    fn detach_removes_by_one_based_index() {
        let mut manager = ChatManager::new();
        manager.add_pending(vec![
            Attachment {
                name: "a.png".to_string(),
                mime_type: "image/png".to_string(),
                data: "data:image/png;base64,AAAA".to_string(),
            },
            Attachment {
                name: "b.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                data: "data:application/pdf;base64,BBBB".to_string(),
            },
        ]);

        assert_eq!(type_line(&mut manager, "/detach 1"), ChatAction::None);
        assert_eq!(manager.pending().len(), 1);
        assert_eq!(manager.pending()[0].name, "b.pdf");
    }

    #[test]
    fn copy_and_save_translate_to_zero_based_indices() {
        let mut manager = ChatManager::new();
        assert_eq!(type_line(&mut manager, "/copy 2"), ChatAction::CopyDocument(1));
        assert_eq!(type_line(&mut manager, "/save 1"), ChatAction::SaveDocument(0));
    }

    #[test]
    fn modal_swallows_keys_until_dismissed() {
        let mut manager = ChatManager::new();
        assert_eq!(type_line(&mut manager, "/terms"), ChatAction::None);
        assert_eq!(manager.handle_key(press(KeyCode::Char('x'))), ChatAction::None);
        manager.handle_key(press(KeyCode::Esc));
        match type_line(&mut manager, "다시 입력") {
            ChatAction::Submit { text, .. } => assert_eq!(text, "다시 입력"),
            other => panic!("expected submit after closing modal, got {other:?}"),
        }
    }
}
