//! Command-line argument parsing for the agentwire CLI.

use std::path::PathBuf;

use crate::config::{ConfigError, ConfigOverrides, TransportKind};

pub const USAGE: &str = "\
Usage: agentwire [OPTIONS]

Options:
  --ws URL          Chat over the WebSocket endpoint at URL
  --http URL        Chat over the HTTP event-stream endpoint at URL
  --timeout SECS    Approval response timeout in seconds
  --config PATH     Read configuration from PATH
  -V, --version     Print version and exit
  -h, --help        Print this help and exit";

/// Arguments for a chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatArgs {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Show usage
    Help,
    /// Run an interactive chat (default)
    Chat(ChatArgs),
}

/// Parse command-line arguments and return the appropriate command.
///
/// `--version` and `--help` win over everything else on the line.
///
/// # Examples
///
/// ```
/// use agentwire::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["agentwire".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()).unwrap(), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> Result<CliCommand, ConfigError>
where
    I: Iterator<Item = String>,
{
    let mut chat = ChatArgs::default();
    // Skip the program name
    let mut args = args.skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return Ok(CliCommand::Version),
            "--help" | "-h" => return Ok(CliCommand::Help),
            "--ws" => {
                chat.overrides.ws_url = Some(value_for(&arg, args.next())?);
                chat.overrides.transport = Some(TransportKind::Ws);
            }
            "--http" => {
                chat.overrides.http_url = Some(value_for(&arg, args.next())?);
                chat.overrides.transport = Some(TransportKind::Http);
            }
            "--timeout" => {
                let value = value_for(&arg, args.next())?;
                let secs = value.parse::<u64>().map_err(|_| {
                    ConfigError::InvalidValue(arg.clone(), format!("'{}' is not a number", value))
                })?;
                chat.overrides.response_timeout_secs = Some(secs);
            }
            "--config" => {
                chat.config_path = Some(PathBuf::from(value_for(&arg, args.next())?));
            }
            _ => return Err(ConfigError::UnknownArgument(arg)),
        }
    }

    if chat.overrides.ws_url.is_some() && chat.overrides.http_url.is_some() {
        return Err(ConfigError::InvalidValue(
            "--ws/--http".to_string(),
            "only one transport may be given".to_string(),
        ));
    }

    Ok(CliCommand::Chat(chat))
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.starts_with("--") => Ok(v),
        _ => Err(ConfigError::MissingValue(flag.to_string())),
    }
}
