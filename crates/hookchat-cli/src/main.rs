//! hookchat: webhook chat client
//!
//! Interactive terminal front-end for a webhook chat endpoint.
//!
//! Usage:
//!   hookchat                  - Start chatting (restores previous session)
//!   hookchat --new            - Discard the stored session and start fresh
//!   hookchat --config <path>  - Use a specific configuration file
//!   hookchat --help           - Show help

mod cli;

use hookchat_core::{ChatConfig, ChatManager};
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    /// Interactive chat, restoring the previous session
    Chat,
    /// Interactive chat on a fresh session
    NewSession,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (mode, config_path) = parse_args();

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("hookchat {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match &config_path {
        Some(path) => ChatConfig::from_toml_file(path),
        None => ChatConfig::load(),
    }
    .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Webhook endpoint: {}", config.webhook_url);

    let manager = ChatManager::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to create chat manager: {}", e))?;

    match mode {
        RunMode::NewSession => {
            manager.start_new_session().await;
        }
        _ => {
            manager.init().await;
        }
    }

    cli::run_cli(manager).await
}

/// Parse command line arguments
fn parse_args() -> (RunMode, Option<String>) {
    let args: Vec<String> = std::env::args().collect();
    let mut mode = RunMode::Chat;
    let mut config_path = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--new" | "-n" => mode = RunMode::NewSession,
            "--config" | "-c" => config_path = iter.next().cloned(),
            "--help" | "-h" => return (RunMode::Help, None),
            "--version" | "-v" => return (RunMode::Version, None),
            _ => {}
        }
    }

    (mode, config_path)
}

/// Print help message
fn print_help() {
    println!("hookchat - webhook chat client");
    println!();
    println!("Usage:");
    println!("  hookchat                  Start chatting (restores previous session)");
    println!("  hookchat --new            Discard the stored session and start fresh");
    println!("  hookchat --config <path>  Use a specific configuration file");
    println!("  hookchat --help           Show this help message");
    println!("  hookchat --version        Show version");
    println!();
    println!("Environment Variables:");
    println!("  HOOKCHAT_WEBHOOK_URL            Webhook endpoint URL (required without config file)");
    println!("  HOOKCHAT_METHOD                 HTTP method: GET or POST (default: POST)");
    println!("  HOOKCHAT_SESSION_KEY            Session id parameter name (default: sessionId)");
    println!("  HOOKCHAT_INPUT_KEY              Chat input parameter name (default: chatInput)");
    println!("  HOOKCHAT_LOAD_PREVIOUS_SESSION  Restore the stored session (default: true)");
    println!("  HOOKCHAT_DB_PATH                Session store path (default: data/hookchat.db)");
}
