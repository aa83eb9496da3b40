//! Command-line interface for dhtshell.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Options left unset fall through to the environment, the config file
/// and finally the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Remote shell port; negative disables remote listening.
    pub port: Option<i32>,
    /// Remote shell listen address.
    pub host: Option<IpAddr>,
    /// Access-list file.
    pub acl: Option<PathBuf>,
    /// Run without a console session.
    pub disable_stdin: bool,
    /// Console without prompts.
    pub batch: bool,
    /// Ask the backend to map its port via UPnP.
    pub upnp: bool,
    /// Address the backend advertises for itself.
    pub self_address: Option<String>,
    /// Contact used to join the overlay at startup.
    pub bootstrap: Option<String>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
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
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("host", value))?,
                );
            }
            Short('A') | Long("acl") => {
                result.acl = Some(parser.value()?.parse()?);
            }
            Short('n') | Long("disablestdin") => {
                result.disable_stdin = true;
            }
            Short('b') | Long("batch") => {
                result.batch = true;
            }
            Short('u') | Long("upnp") => {
                result.upnp = true;
            }
            Short('s') | Long("selfaddress") => {
                result.self_address = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                let val = val.to_string_lossy().into_owned();
                if result.bootstrap.is_some() {
                    return Err(ArgsError::TooManyArguments(val));
                }
                result.bootstrap = Some(val);
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"dhtshell {version}
Interactive shell for a key-value store node

USAGE:
    dhtshell [OPTIONS] [<host>[:<port>]]

ARGS:
    <host>[:<port>]          Contact node to join at startup

OPTIONS:
    -p, --port <PORT>        Remote shell port; negative disables [default: -1]
    -H, --host <ADDR>        Remote shell listen address [default: 0.0.0.0]
    -A, --acl <FILE>         Access-list file for remote clients
    -n, --disablestdin       Run without a console session
    -b, --batch              Console without prompts
    -u, --upnp               Map the node's port via UPnP
    -s, --selfaddress <HOST> Address the node advertises for itself
    -c, --config <FILE>      Path to configuration file (JSON)
    -l, --log-level <LVL>    Log level (error, warn, info, debug, trace)
    -h, --help               Print help
    -V, --version            Print version

ENVIRONMENT VARIABLES:
    DHT_SHELL_HOST           Listen address (overrides config)
    DHT_SHELL_PORT           Remote shell port (overrides config)
    DHT_SHELL_ACL            Access-list file (overrides config)
    DHT_SHELL_LOG_LEVEL      Log level (overrides config)
    RUST_LOG                 Alternative log level setting

EXAMPLES:
    # Console only
    dhtshell

    # Console plus remote shell on port 3998, restricted by an access list
    dhtshell -p 3998 -A /etc/dhtshell/acl

    # Headless node joining an existing overlay
    dhtshell -n -p 3998 node1.example.org:3997
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("dhtshell {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// A second positional argument.
    TooManyArguments(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::TooManyArguments(arg) => {
                write!(f, "unexpected argument: '{}' (only one contact allowed)", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
