//! Command-line interface for session-vault.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

use lexopt::prelude::*;

/// Maintenance command to run against a session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List backends and whether they are usable.
    Probe,
    /// Remove stale records.
    Gc,
    /// Print the decoded variables of one session.
    Show(String),
    /// Delete one session record.
    Destroy(String),
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Command to run (defaults to `probe`).
    pub command: Option<Command>,
    /// Storage backend name.
    pub backend: Option<String>,
    /// Backend location (directory or database file).
    pub path: Option<PathBuf>,
    /// Key prefix.
    pub prefix: Option<String>,
    /// Record lifetime in seconds.
    pub ttl: Option<u64>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Maximum record age for `gc`, in seconds.
    pub max_lifetime: Option<u64>,
    /// Repeat `gc` every N seconds until interrupted.
    pub watch: Option<u64>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    let mut result = Args::default();
    let mut command: Option<String> = None;
    let mut operand: Option<String> = None;
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('b') | Long("backend") => {
                result.backend = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("path") => {
                result.path = Some(parser.value()?.parse()?);
            }
            Long("prefix") => {
                result.prefix = Some(parser.value()?.parse()?);
            }
            Long("ttl") => {
                result.ttl = Some(parse_secs(&mut parser, "ttl")?);
            }
            Short('m') | Long("max-lifetime") => {
                result.max_lifetime = Some(parse_secs(&mut parser, "max-lifetime")?);
            }
            Short('w') | Long("watch") => {
                result.watch = Some(parse_secs(&mut parser, "watch")?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                let val: String = val.parse()?;
                if command.is_none() {
                    command = Some(val);
                } else if operand.is_none() {
                    operand = Some(val);
                } else {
                    return Err(ArgsError::UnexpectedArgument(val));
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    result.command = match command.as_deref() {
        None => None,
        Some("probe") => Some(Command::Probe),
        Some("gc") => Some(Command::Gc),
        Some("show") => Some(Command::Show(operand.take().ok_or(ArgsError::MissingId("show"))?)),
        Some("destroy") => Some(Command::Destroy(
            operand.take().ok_or(ArgsError::MissingId("destroy"))?,
        )),
        Some(other) => return Err(ArgsError::UnknownCommand(other.to_string())),
    };
    if let Some(extra) = operand {
        return Err(ArgsError::UnexpectedArgument(extra));
    }

    Ok(result)
}

fn parse_secs(parser: &mut lexopt::Parser, name: &'static str) -> Result<u64, ArgsError> {
    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"session-vault {version}
Maintenance tool for session-vault storage backends

USAGE:
    session-vault [OPTIONS] [COMMAND]

COMMANDS:
    probe                   List storage backends and their availability [default]
    gc                      Remove records older than the maximum lifetime
    show <ID>               Print the variables of a session
    destroy <ID>            Delete a session record

OPTIONS:
    -b, --backend <NAME>    Storage backend (memory, file, database) [default: file]
    -p, --path <PATH>       Session directory or database file
        --prefix <PREFIX>   Key prefix [default: vault_]
        --ttl <SECS>        Record lifetime in seconds [default: 1440]
    -m, --max-lifetime <SECS>
                            Age after which gc removes records [default: ttl]
    -w, --watch <SECS>      Repeat gc every SECS seconds until interrupted
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    SESSION_VAULT_BACKEND   Backend name (overrides config)
    SESSION_VAULT_PATH      Backend location (overrides config)
    SESSION_VAULT_PREFIX    Key prefix (overrides config)
    SESSION_VAULT_TTL       Record lifetime (overrides config)
    SESSION_VAULT_LOG_LEVEL Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Sweep a session directory once
    session-vault -p /var/lib/app/sessions gc

    # Sweep a SQLite store every five minutes
    session-vault -b database -p /var/lib/app/sessions.db gc -w 300

    # Inspect one session
    session-vault -p /var/lib/app/sessions show 3f2a9c...
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("session-vault {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
    /// Command name not recognized.
    UnknownCommand(String),
    /// Command needs a session id.
    MissingId(&'static str),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::UnknownCommand(cmd) => write!(f, "unknown command: '{}'", cmd),
            Self::MissingId(cmd) => write!(f, "'{}' requires a session id", cmd),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
