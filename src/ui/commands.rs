use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new consultation
    New,
    /// Stage files as pending attachments
    Attach,
    /// Remove a pending attachment by number
    Detach,
    /// Copy a document draft to the clipboard
    Copy,
    /// Save a document draft as an HTML file
    Save,
    /// Abort the response currently streaming in
    Abort,
    /// Show the terms of service
    Terms,
    /// Show the privacy policy
    Privacy,
    /// Show contact information
    Contact,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// A 1-based number argument, for `/detach`, `/copy` and `/save`.
    pub fn index_argument(&self) -> Option<usize> {
        self.argument()?.trim().parse().ok().filter(|n| *n >= 1)
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "새로운 상담을 시작합니다",
            SlashCommand::Attach => "파일을 첨부합니다 (이미지/PDF): /attach <경로>",
            SlashCommand::Detach => "대기 중인 첨부를 제거합니다: /detach <번호>",
            SlashCommand::Copy => "문서 초안을 클립보드로 복사합니다: /copy <번호>",
            SlashCommand::Save => "문서 초안을 HTML 파일로 저장합니다: /save <번호>",
            SlashCommand::Abort => "진행 중인 답변 생성을 중단합니다",
            SlashCommand::Terms => "이용약관을 표시합니다",
            SlashCommand::Privacy => "개인정보처리방침을 표시합니다",
            SlashCommand::Contact => "문의처를 표시합니다",
            SlashCommand::Help => "사용 가능한 명령어를 표시합니다",
            SlashCommand::Bye => "프로그램을 종료합니다",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Parse a slash command from user input.
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(head)
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Some(SlashCommand::Bye),
            "n" => Some(SlashCommand::New),
            "a" => Some(SlashCommand::Attach),
            "stop" => Some(SlashCommand::Abort),
            _ => None,
        })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands.
pub fn get_help_text() -> String {
    let mut help = String::from("사용 가능한 명령어:\n\n");
    for entry in command_entries() {
        help.push_str(&format!("/{} - {}\n", entry.keyword, entry.description));
    }
    help.push_str("\nEnter로 전송, Shift+Enter로 줄바꿈, Ctrl+↑/↓로 상담 이동.");
    help.push_str("\n별칭: /q = /bye, /n = /new, /a = /attach, /stop = /abort");
    help
}
