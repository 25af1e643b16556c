//! Configuration management for chat-gateway.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ServerConfig;
use crate::cli::Args;
use crate::engine::BridgeConfig;
use crate::session::{ManagerOptions, SessionStore, DEFAULT_AUTH_DIR, DEFAULT_CACHE_DIR};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Session lifecycle configuration.
    pub session: SessionSection,
    /// Chat engine bridge configuration.
    pub engine: EngineSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 45000,
            graceful_shutdown: true,
        }
    }
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Directory holding the credential areas.
    pub data_dir: PathBuf,
    /// Authentication area, relative to `data_dir` unless absolute.
    pub auth_dir: PathBuf,
    /// Cache area, relative to `data_dir` unless absolute.
    pub cache_dir: PathBuf,
    /// Seconds to wait before retrying a failed engine start.
    pub rearm_delay_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            auth_dir: PathBuf::from(DEFAULT_AUTH_DIR),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            rearm_delay_secs: 5,
        }
    }
}

/// Engine bridge configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Bridge executable.
    pub command: String,
    /// Bridge arguments.
    pub args: Vec<String>,
    /// Upper bound on engine teardown, in seconds.
    pub destroy_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            command: "node".to_string(),
            args: vec!["bridge.js".to_string()],
            destroy_timeout_secs: 30,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("CHAT_GATEWAY_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("CHAT_GATEWAY_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(dir) = std::env::var("CHAT_GATEWAY_DATA_DIR") {
            if !dir.is_empty() {
                self.session.data_dir = PathBuf::from(dir);
            }
        }

        if let Ok(cmd) = std::env::var("CHAT_GATEWAY_ENGINE_CMD") {
            if !cmd.is_empty() {
                self.engine.command = cmd;
            }
        }

        if let Ok(level) = std::env::var("CHAT_GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides. Only flags that were given take effect.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref dir) = args.data_dir {
            self.session.data_dir = dir.clone();
        }

        if let Some(ref cmd) = args.engine_cmd {
            self.engine.command = cmd.clone();
        }

        if !args.engine_args.is_empty() {
            self.engine.args = args.engine_args.clone();
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port);
        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }

        Ok(server_config)
    }

    /// Resolved authentication area path.
    pub fn auth_dir(&self) -> PathBuf {
        self.session.data_dir.join(&self.session.auth_dir)
    }

    /// Resolved cache area path.
    pub fn cache_dir(&self) -> PathBuf {
        self.session.data_dir.join(&self.session.cache_dir)
    }

    /// Credential store for the configured areas.
    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(self.auth_dir(), self.cache_dir())
    }

    /// Bridge launch configuration.
    pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        if self.engine.command.trim().is_empty() {
            return Err(ConfigError::MissingEngineCommand);
        }

        Ok(
            BridgeConfig::new(&self.engine.command, self.auth_dir(), self.cache_dir())
                .with_args(self.engine.args.iter().cloned())
                .with_working_dir(self.session.data_dir.clone()),
        )
    }

    /// Session manager tunables.
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            destroy_timeout: Duration::from_secs(self.engine.destroy_timeout_secs),
            rearm_delay: Duration::from_secs(self.session.rearm_delay_secs),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// No bridge executable configured.
    MissingEngineCommand,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::MissingEngineCommand => write!(f, "no engine command configured"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 45000);
        assert_eq!(config.session.auth_dir, PathBuf::from(".wwebjs_auth"));
        assert_eq!(config.session.cache_dir, PathBuf::from(".wwebjs_cache"));
        assert_eq!(config.engine.command, "node");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "server": {
                "host": "0.0.0.0",
                "port": 8080
            },
            "session": {
                "data_dir": "/var/lib/chat-gateway",
                "rearm_delay_secs": 10
            },
            "engine": {
                "command": "/usr/bin/node",
                "args": ["/opt/bridge/index.js", "--headless"]
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.auth_dir(),
            PathBuf::from("/var/lib/chat-gateway/.wwebjs_auth")
        );
        assert_eq!(config.engine.args.len(), 2);
        assert_eq!(
            config.manager_options().rearm_delay,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{ "server": { "port": 9000 } }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.engine.destroy_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            host: Some("192.168.1.1".parse().unwrap()),
            port: Some(5000),
            data_dir: Some(PathBuf::from("/data")),
            engine_cmd: Some("bun".to_string()),
            engine_args: vec!["run".to_string(), "bridge.ts".to_string()],
            log_level: Some("debug".to_string()),
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.session.data_dir, PathBuf::from("/data"));
        assert_eq!(config.engine.command, "bun");
        assert_eq!(config.engine.args, vec!["run", "bridge.ts"]);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_apply_args_keeps_unset_fields() {
        let mut config = Config::default();
        config.server.host = "0.0.0.0".to_string();
        config.server.port = 9000;
        config.engine.args = vec!["custom.js".to_string()];

        config.apply_args(&Args::default());

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.engine.command, "node");
        assert_eq!(config.engine.args, vec!["custom.js"]);
    }

    #[test]
    fn test_absolute_area_overrides_data_dir() {
        let mut config = Config::default();
        config.session.data_dir = PathBuf::from("/data");
        config.session.cache_dir = PathBuf::from("/tmp/cache");

        let store = config.session_store();
        assert_eq!(store.auth_dir(), Path::new("/data/.wwebjs_auth"));
        assert_eq!(store.cache_dir(), Path::new("/tmp/cache"));
    }

    #[test]
    fn test_bridge_config() {
        let mut config = Config::default();
        config.session.data_dir = PathBuf::from("/data");

        let bridge = config.bridge_config().unwrap();
        assert_eq!(bridge.command, "node");
        assert_eq!(bridge.args, vec!["bridge.js"]);
        assert_eq!(bridge.auth_dir, PathBuf::from("/data/.wwebjs_auth"));
        assert_eq!(bridge.working_dir, Some(PathBuf::from("/data")));

        config.engine.command = "  ".to_string();
        assert!(matches!(
            config.bridge_config(),
            Err(ConfigError::MissingEngineCommand)
        ));
    }

    #[test]
    fn test_to_server_config() {
        let config = Config::default();
        let server_config = config.to_server_config().unwrap();

        assert_eq!(server_config.host, "127.0.0.1");
        assert_eq!(server_config.port, 45000);
        assert!(server_config.graceful_shutdown);
    }

    #[test]
    fn test_invalid_host() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();

        assert!(config.to_server_config().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"port\""));
        assert!(json.contains("\"data_dir\""));
        assert!(json.contains("\"destroy_timeout_secs\""));
    }
}
