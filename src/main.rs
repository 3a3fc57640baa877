use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod attachment;
mod config;
mod consultation;
mod document;
mod events;
mod gemini;
mod prompts;
mod stream;
mod ui;

use config::{API_KEY_ENV, Config};

#[derive(Parser)]
#[command(name = "lexaid")]
#[command(version)]
#[command(about = "AI 법률 상담 채팅 (터미널)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration and the service credential
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Some(Commands::Check) => check(&config),
        None => {
            init_tracing(&config)?;
            if !config.has_api_key() {
                bail!(
                    "{API_KEY_ENV} 환경 변수가 설정되지 않았습니다. API 키를 설정한 뒤 다시 실행하세요."
                );
            }
            app::run(config).await
        }
    }
}

fn check(config: &Config) -> Result<()> {
    println!("설정 파일: {}", config.lexaid_home.join("config.toml").display());
    println!("모델: {}", config.model);
    println!(
        "온도/topK/topP: {} / {} / {}",
        config.generation.temperature, config.generation.top_k, config.generation.top_p
    );
    if config.has_api_key() {
        println!("API 키: 설정됨");
    } else {
        println!("API 키: 없음 ({API_KEY_ENV} 환경 변수를 설정하세요)");
    }
    Ok(())
}

/// Logs go to a file under the config dir; the TUI owns stdout.
fn init_tracing(config: &Config) -> Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
        .context("Failed to open log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lexaid=info")),
        )
        .with_writer(std::sync::Arc::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}
