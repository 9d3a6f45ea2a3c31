//! CLI module for agentwire.
//!
//! - Argument parsing
//! - Version display
//! - Logging setup
//! - Interactive chat over either transport
//!
//! # Usage
//!
//! ```ignore
//! use agentwire::cli::{parse_args, run_cli_command};
//!
//! let command = parse_args(std::env::args())?;
//! run_cli_command(command).await?;
//! ```

pub mod args;
pub mod chat;
pub mod version;

pub use args::{parse_args, ChatArgs, CliCommand, USAGE};
pub use chat::{run_http_chat, run_ws_chat};
pub use version::{handle_version_command, VERSION};

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, TransportKind};
use crate::error::AgentwireResult;

/// Initialise logging to stderr.
///
/// `RUST_LOG` wins over `default_filter`, so stdout stays clean for the chat.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load configuration for a chat session.
pub fn load_config(args: &ChatArgs) -> AgentwireResult<AppConfig> {
    let mut config = AppConfig::load(args.config_path.as_deref())?;
    config.apply_overrides(&args.overrides)?;
    Ok(config)
}

/// Run a parsed CLI command.
pub async fn run_cli_command(command: CliCommand) -> AgentwireResult<()> {
    match command {
        CliCommand::Version => handle_version_command(),
        CliCommand::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        CliCommand::Chat(args) => {
            let config = load_config(&args)?;
            init_tracing(&config.log_filter);
            info!(transport = ?config.transport, "Starting agentwire {}", VERSION);
            match config.transport {
                TransportKind::Ws => run_ws_chat(&config).await,
                TransportKind::Http => run_http_chat(&config).await,
            }
        }
    }
}
