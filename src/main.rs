//! Telegram activities CLI entry point.
//!
//! Provides `start` for serving activity calls from the host over
//! stdin/stdout and `check-config` for validating the configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use teloxide::Bot;
use tracing::info;

use telegram_activities::activities::TelegramActivities;
use telegram_activities::config::{self, Config};
use telegram_activities::events::EventRegistry;
use telegram_activities::gateway::telegram::{run_dispatcher, TelegramGateway};
use telegram_activities::gateway::Gateway;
use telegram_activities::{host, logging};

/// Telegram activity provider for task orchestration.
#[derive(Parser)]
#[command(name = "telegram-activities", version, about)]
struct Cli {
    /// Path to config.toml (default: ~/.telegram-activities/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the bot and serve activity calls on stdin/stdout.
    Start,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let config_path = match cli.config {
        Some(p) => p,
        None => config::default_config_path()?,
    };

    match cli.command {
        Command::Start => handle_start(&config_path).await,
        Command::CheckConfig => handle_check_config(&config_path),
    }
}

/// Run the dispatcher and the host bridge until either stops.
async fn handle_start(config_path: &std::path::Path) -> anyhow::Result<()> {
    let config = config::load_config_or_default(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let _logging_guard = logging::init(config.logging.dir.as_deref())?;

    let token = config.telegram.bot_token()?;
    let bot = Bot::new(token);

    let registry = Arc::new(EventRegistry::new());
    let gateway: Arc<dyn Gateway> = Arc::new(TelegramGateway::new(bot.clone()));
    let activities = Arc::new(TelegramActivities::new(
        gateway,
        Arc::clone(&registry),
        &config,
    ));

    let dispatcher = tokio::spawn(run_dispatcher(bot, Arc::clone(&registry)));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = host::serve(activities, stdin, stdout) => {
            result?;
            info!("host bridge closed");
        }
        joined = dispatcher => {
            joined.context("telegram dispatcher task failed")?;
            info!("telegram dispatcher stopped");
        }
    }

    Ok(())
}

/// Print a summary of the effective configuration.
fn handle_check_config(config_path: &std::path::Path) -> anyhow::Result<()> {
    logging::init_cli();

    let config: Config = config::load_config(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let settings = config.validation.settings();

    println!("config OK: {}", config_path.display());
    println!("  bot token env: {}", config.telegram.bot_token_env);
    println!("  parse mode: {:?}", config.telegram.parse_mode);
    println!("  default prompt: {}", settings.default_text);
    match settings.timeout {
        Some(t) => println!("  prompt timeout: {}s", t.as_secs()),
        None => println!("  prompt timeout: none"),
    }
    println!("  media group limit: {}", settings.max_media);
    Ok(())
}
