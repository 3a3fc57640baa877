//! Application loop: terminal lifecycle, key handling and the glue between
//! the consultation store, the model client and in-flight response streams.

use std::collections::HashMap;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::attachment::{StagedFile, stage_files};
use crate::config::Config;
use crate::consultation::{ConsultationStore, SESSION_INIT_FAILURE_NOTICE, StoreError};
use crate::document;
use crate::events::{AppEvent, TuiEvent};
use crate::gemini::{ChatSession, GeminiClient, Part};
use crate::stream::{StreamError, drive_stream};
use crate::ui::{ChatAction, ChatManager};

pub async fn run(config: Config) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let (tui_tx, tui_rx) = mpsc::unbounded_channel();
    spawn_input_thread(tui_tx);

    let (app_tx, app_rx) = mpsc::unbounded_channel();
    let mut app = App::new(config, app_tx)?;
    let result = app.event_loop(&mut terminal, tui_rx, app_rx).await;
    restore_terminal(&mut terminal)?;
    result
}

struct App {
    config: Config,
    store: ConsultationStore,
    client: GeminiClient,
    /// Live sessions, keyed by consultation id. Runtime-only state.
    sessions: HashMap<String, ChatSession>,
    /// Cancellation handles for in-flight streams, keyed by the consultation
    /// id each stream was started for.
    streams: HashMap<String, CancellationToken>,
    manager: ChatManager,
    app_tx: mpsc::UnboundedSender<AppEvent>,
    should_exit: bool,
}

impl App {
    fn new(config: Config, app_tx: mpsc::UnboundedSender<AppEvent>) -> Result<Self> {
        let client = GeminiClient::new(config.clone())?;
        Ok(Self {
            config,
            store: ConsultationStore::with_seed_history(),
            client,
            sessions: HashMap::new(),
            streams: HashMap::new(),
            manager: ChatManager::new(),
            app_tx,
            should_exit: false,
        })
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
        mut tui_rx: mpsc::UnboundedReceiver<TuiEvent>,
        mut app_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Result<()> {
        loop {
            let streaming = self.active_is_streaming();
            terminal.draw(|frame| {
                let area = frame.size();
                self.manager
                    .render(&self.store, streaming, area, frame.buffer_mut());
            })?;

            tokio::select! {
                Some(tui_event) = tui_rx.recv() => {
                    if let TuiEvent::Key(key) = tui_event {
                        self.handle_key(key).await?;
                    }
                }
                Some(app_event) = app_rx.recv() => {
                    self.handle_app_event(app_event);
                }
            }

            // Drain whatever else queued up before redrawing.
            while let Ok(app_event) = app_rx.try_recv() {
                self.handle_app_event(app_event);
            }

            if self.should_exit {
                for cancel in self.streams.values() {
                    cancel.cancel();
                }
                return Ok(());
            }
        }
    }

    fn active_is_streaming(&self) -> bool {
        self.store
            .active_id()
            .is_some_and(|id| self.streams.contains_key(id))
    }

    async fn handle_key(&mut self, key: crossterm::event::KeyEvent) -> Result<()> {
        match self.manager.handle_key(key) {
            ChatAction::None => {}
            ChatAction::Exit => self.should_exit = true,
            ChatAction::Submit { text, attachments } => {
                self.send_message(text, attachments).await;
            }
            ChatAction::NewConsultation => {
                let id = self.store.new_consultation();
                self.manager.reset_input();
                self.ensure_session(&id);
            }
            ChatAction::SelectPrevious => self.select_neighbor(-1),
            ChatAction::SelectNext => self.select_neighbor(1),
            ChatAction::Attach(paths) => self.attach_files(&paths).await,
            ChatAction::Abort => self.abort_active_stream(),
            ChatAction::CopyDocument(index) => self.copy_document(index),
            ChatAction::SaveDocument(index) => self.save_document(index),
        }
        Ok(())
    }

    fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::StreamUpdate {
                consultation_id,
                snapshot,
            } => {
                self.store
                    .update_streaming_message(&consultation_id, &snapshot);
            }
            AppEvent::StreamCompleted {
                consultation_id,
                snapshot,
            } => {
                self.store
                    .update_streaming_message(&consultation_id, &snapshot);
                if let Some(session) = self.sessions.get_mut(&consultation_id) {
                    session.push_model_turn(&snapshot.text);
                }
                self.streams.remove(&consultation_id);
            }
            AppEvent::StreamFailed {
                consultation_id,
                reason,
            } => {
                tracing::warn!("stream for consultation {consultation_id} failed: {reason}");
                self.store.fail_streaming_message(&consultation_id);
                if let Some(session) = self.sessions.get_mut(&consultation_id) {
                    session.discard_last_turn();
                }
                self.streams.remove(&consultation_id);
            }
            AppEvent::StreamAborted { consultation_id } => {
                if let Some(session) = self.sessions.get_mut(&consultation_id) {
                    session.discard_last_turn();
                }
                self.streams.remove(&consultation_id);
                self.manager.set_notice("답변 생성을 중단했습니다.");
            }
        }
    }

    /// Creates the session for a consultation if it does not exist yet. On
    /// failure the fixed warning is substituted into the log; a later send
    /// retries.
    fn ensure_session(&mut self, id: &str) {
        if self.sessions.contains_key(id) {
            return;
        }
        match self.client.create_session() {
            Ok(session) => {
                self.sessions.insert(id.to_string(), session);
            }
            Err(err) => {
                tracing::error!("failed to create AI session: {err:#}");
                let _ = self.store.append_model_notice(id, SESSION_INIT_FAILURE_NOTICE);
            }
        }
    }

    async fn send_message(&mut self, text: String, attachments: Vec<crate::consultation::Attachment>) {
        let Some(id) = self.store.active_id().map(str::to_string) else {
            self.manager.set_notice("먼저 /new 로 상담을 시작하세요.");
            return;
        };
        if self.streams.contains_key(&id) {
            self.manager
                .set_notice("이전 답변이 아직 생성 중입니다. /abort 로 중단할 수 있습니다.");
            return;
        }

        match self.store.append_user_message(&id, &text, attachments.clone()) {
            Ok(()) => {}
            Err(StoreError::EmptyMessage) => return,
            Err(err) => {
                tracing::warn!("send rejected: {err}");
                return;
            }
        }
        self.manager.reset_input();

        self.ensure_session(&id);
        let Some(session) = self.sessions.get_mut(&id) else {
            // Session init failed; the warning is already in the log.
            return;
        };

        let mut parts = Vec::new();
        if !text.trim().is_empty() {
            parts.push(Part::text(text));
        }
        for attachment in &attachments {
            match Part::from_attachment(attachment) {
                Some(part) => parts.push(part),
                None => tracing::warn!("attachment {} has a malformed data URL", attachment.name),
            }
        }

        if self.store.append_model_placeholder(&id).is_err() {
            return;
        }
        let rx = session.send_message_stream(parts);

        // The stream is bound to the consultation it was started for; every
        // update below carries that id, never "whatever is active".
        let cancel = CancellationToken::new();
        let tx = self.app_tx.clone();
        let stream_id = id.clone();
        let stream_cancel = cancel.clone();
        tokio::spawn(async move {
            let sink_tx = tx.clone();
            let sink_id = stream_id.clone();
            let result = drive_stream(rx, stream_cancel, move |snapshot| {
                let _ = sink_tx.send(AppEvent::StreamUpdate {
                    consultation_id: sink_id.clone(),
                    snapshot: snapshot.clone(),
                });
            })
            .await;
            let event = match result {
                Ok(snapshot) => AppEvent::StreamCompleted {
                    consultation_id: stream_id,
                    snapshot,
                },
                Err(StreamError::Aborted) => AppEvent::StreamAborted {
                    consultation_id: stream_id,
                },
                Err(StreamError::Failed(reason)) => AppEvent::StreamFailed {
                    consultation_id: stream_id,
                    reason,
                },
            };
            let _ = tx.send(event);
        });
        self.streams.insert(id, cancel);
    }

    fn select_neighbor(&mut self, delta: isize) {
        let ids: Vec<String> = self
            .store
            .grouped()
            .iter()
            .flat_map(|(_, consultations)| consultations.iter().map(|c| c.id.clone()))
            .collect();
        if ids.is_empty() {
            return;
        }

        let next = match self
            .store
            .active_id()
            .and_then(|active| ids.iter().position(|id| id == active))
        {
            Some(current) => {
                let len = ids.len() as isize;
                ((current as isize + delta).rem_euclid(len)) as usize
            }
            None => 0,
        };
        let id = ids[next].clone();
        self.store.select(&id);
        self.manager.reset_input();
        self.ensure_session(&id);
    }

    async fn attach_files(&mut self, paths: &[PathBuf]) {
        if self.store.active_id().is_none() {
            self.manager.set_notice("먼저 /new 로 상담을 시작하세요.");
            return;
        }
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for staged in stage_files(paths).await {
            match staged {
                StagedFile::Accepted(attachment) => accepted.push(attachment),
                StagedFile::Rejected { name, reason } => rejected.push(format!("{name}: {reason}")),
            }
        }
        let added = accepted.len();
        self.manager.add_pending(accepted);
        if !rejected.is_empty() {
            self.manager.set_notice(rejected.join(" · "));
        } else if added > 0 {
            self.manager.set_notice(format!("파일 {added}개를 첨부했습니다."));
        }
    }

    fn abort_active_stream(&mut self) {
        match self
            .store
            .active_id()
            .and_then(|id| self.streams.get(id))
        {
            Some(cancel) => cancel.cancel(),
            None => self.manager.set_notice("진행 중인 답변이 없습니다."),
        }
    }

    /// Document drafts of the active consultation, in display order.
    fn active_documents(&self) -> Vec<String> {
        self.store
            .active()
            .map(|consultation| {
                document::collect_documents(
                    consultation
                        .messages
                        .iter()
                        .filter(|m| m.role == crate::consultation::Role::Model)
                        .map(|m| m.content.as_str()),
                )
            })
            .unwrap_or_default()
    }

    fn copy_document(&mut self, index: usize) {
        let documents = self.active_documents();
        let Some(text) = documents.get(index) else {
            self.manager.set_notice("해당 번호의 문서 초안이 없습니다.");
            return;
        };
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.clone())) {
            Ok(()) => self.manager.set_notice(format!("문서 초안 [{}]을 복사했습니다.", index + 1)),
            Err(err) => {
                tracing::warn!("clipboard copy failed: {err}");
                self.manager.set_notice("클립보드 복사에 실패했습니다.");
            }
        }
    }

    fn save_document(&mut self, index: usize) {
        let documents = self.active_documents();
        let Some(text) = documents.get(index) else {
            self.manager.set_notice("해당 번호의 문서 초안이 없습니다.");
            return;
        };
        match document::save_document(&self.config.export_dir(), text) {
            Ok(path) => self
                .manager
                .set_notice(format!("저장했습니다: {}", path.display())),
            Err(err) => {
                tracing::error!("document export failed: {err:#}");
                self.manager.set_notice("문서 저장에 실패했습니다.");
            }
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to restore cursor")?;
    Ok(())
}

/// Forwards terminal events into the async loop. Ends when the receiver goes
/// away.
fn spawn_input_thread(tx: mpsc::UnboundedSender<TuiEvent>) {
    std::thread::spawn(move || {
        loop {
            let tui_event = match event::poll(Duration::from_millis(250)) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => TuiEvent::Key(key),
                    Ok(Event::Resize(..)) => TuiEvent::Resize,
                    Ok(_) => continue,
                    Err(_) => break,
                },
                Ok(false) => TuiEvent::Tick,
                Err(_) => break,
            };
            if tx.send(tui_event).is_err() {
                break;
            }
        }
    });
}
