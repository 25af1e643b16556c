//! Command-line interface for chat-gateway.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Every setting is optional so that unset flags leave the environment,
/// the config file and the built-in defaults in effect.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Directory holding the credential areas.
    pub data_dir: Option<PathBuf>,
    /// Bridge executable.
    pub engine_cmd: Option<String>,
    /// Bridge arguments (repeatable `--engine-arg`).
    pub engine_args: Vec<String>,
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
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("host", value))?,
                );
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('d') | Long("data-dir") => {
                result.data_dir = Some(parser.value()?.parse()?);
            }
            Short('e') | Long("engine-cmd") => {
                result.engine_cmd = Some(parser.value()?.parse()?);
            }
            Long("engine-arg") => {
                result.engine_args.push(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
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
        r#"chat-gateway {version}
Single-account HTTP gateway over an automated chat-network session

USAGE:
    chat-gateway [OPTIONS]

OPTIONS:
    -H, --host <ADDR>         Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>         Port to listen on [default: 45000]
    -c, --config <FILE>       Path to configuration file (JSON)
    -d, --data-dir <DIR>      Directory for session credentials [default: .]
    -e, --engine-cmd <CMD>    Bridge executable [default: node]
        --engine-arg <ARG>    Bridge argument (repeatable) [default: bridge.js]
    -l, --log-level <LVL>     Log level (error, warn, info, debug, trace)
    -h, --help                Print help
    -V, --version             Print version

ENVIRONMENT VARIABLES:
    CHAT_GATEWAY_HOST         Host address (overrides config)
    CHAT_GATEWAY_PORT         Port number (overrides config)
    CHAT_GATEWAY_DATA_DIR     Credential directory (overrides config)
    CHAT_GATEWAY_ENGINE_CMD   Bridge executable (overrides config)
    CHAT_GATEWAY_LOG_LEVEL    Log level (overrides config)
    RUST_LOG                  Alternative log level setting

EXAMPLES:
    # Start with defaults (localhost:45000, `node bridge.js`)
    chat-gateway

    # Listen on all interfaces, keep credentials in /var/lib/chat-gateway
    chat-gateway -H 0.0.0.0 -d /var/lib/chat-gateway

    # Custom bridge
    chat-gateway -e /usr/bin/node --engine-arg /opt/bridge/index.js
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("chat-gateway {}", env!("CARGO_PKG_VERSION"));
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
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("chat-gateway")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_default_args() {
        let result = parse_args_from(args(&[])).unwrap();
        assert!(result.host.is_none());
        assert!(result.port.is_none());
        assert!(result.engine_args.is_empty());
    }

    #[test]
    fn test_host_port() {
        let result = parse_args_from(args(&["-H", "0.0.0.0", "-p", "8080"])).unwrap();
        assert_eq!(result.host, Some("0.0.0.0".parse().unwrap()));
        assert_eq!(result.port, Some(8080));
    }

    #[test]
    fn test_data_dir() {
        let result = parse_args_from(args(&["-d", "/var/lib/gw"])).unwrap();
        assert_eq!(result.data_dir, Some(PathBuf::from("/var/lib/gw")));
    }

    #[test]
    fn test_engine_options() {
        let result = parse_args_from(args(&[
            "--engine-cmd",
            "node",
            "--engine-arg",
            "bridge.js",
            "--engine-arg",
            "--headless",
        ]))
        .unwrap();
        assert_eq!(result.engine_cmd, Some("node".to_string()));
        assert_eq!(result.engine_args, vec!["bridge.js", "--headless"]);
    }

    #[test]
    fn test_help_and_version() {
        assert!(parse_args_from(args(&["-h"])).unwrap().help);
        assert!(parse_args_from(args(&["--help"])).unwrap().help);
        assert!(parse_args_from(args(&["-V"])).unwrap().version);
    }

    #[test]
    fn test_invalid_port() {
        assert!(parse_args_from(args(&["-p", "invalid"])).is_err());
        assert!(parse_args_from(args(&["-p", "70000"])).is_err());
    }

    #[test]
    fn test_invalid_host() {
        assert!(parse_args_from(args(&["-H", "not-an-ip"])).is_err());
    }

    #[test]
    fn test_unexpected_positional() {
        let err = parse_args_from(args(&["serve"])).unwrap_err();
        assert!(matches!(err, ArgsError::UnexpectedArgument(ref a) if a == "serve"));
    }
}
