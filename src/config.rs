//! Configuration module for the batch receiver.
//!
//! Supports both command-line arguments and a configuration file. The file
//! format is picked by extension:
//! - `.toml`: full configuration (`[server]`, `[storage]`, `[logging]`)
//! - `.json`: the sender-side `{ "Port": 5000 }` file, keys case-insensitive
//!
//! Without `--config`, a `config.json` in the working directory is loaded
//! when present. CLI arguments take precedence over config file values.
//! The listening port has no default; startup fails if neither source
//! provides one.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Command-line arguments for the receiver
#[derive(Parser, Debug, Default)]
#[command(name = "batch-receiver")]
#[command(version = "0.1.0")]
#[command(about = "Receives length-prefixed batches of files over TCP", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (.toml or .json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory that receives one batch directory per connection
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Maximum number of connections served at once
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    pub port: Option<u16>,
    /// Maximum number of connections served at once
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Storage-related configuration
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Root directory for received batches
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_root() -> PathBuf {
    PathBuf::from("ReceivedData")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub root: PathBuf,
    pub max_connections: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional config file.
    /// CLI arguments take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        Self::resolve(cli, Path::new(DEFAULT_CONFIG_FILE))
    }

    fn resolve(cli: CliArgs, default_file: &Path) -> Result<Self, ConfigError> {
        let file_config = match cli.config {
            Some(ref path) => load_file(path)?,
            None if default_file.is_file() => load_file(default_file)?,
            None => TomlConfig::default(),
        };

        let port = cli
            .port
            .or(file_config.server.port)
            .ok_or(ConfigError::MissingPort)?;

        Ok(Config {
            host: cli.host.unwrap_or(file_config.server.host),
            port,
            root: cli.root.unwrap_or(file_config.storage.root),
            max_connections: cli
                .max_connections
                .unwrap_or(file_config.server.max_connections)
                .max(1),
            log_level: cli.log_level.unwrap_or(file_config.logging.level),
        })
    }

    /// Address string suitable for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn load_file(path: &Path) -> Result<TomlConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("toml") => {
            toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.to_path_buf(), e))
        }
        Some("json") => parse_json(&contents)
            .map_err(|e| ConfigError::JsonParse(path.to_path_buf(), e)),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Parse the sender-side JSON config. Only the port is taken from it.
fn parse_json(contents: &str) -> Result<TomlConfig, serde_json::Error> {
    let fields: serde_json::Map<String, serde_json::Value> = serde_json::from_str(contents)?;

    let mut config = TomlConfig::default();
    for (key, value) in fields {
        if key.eq_ignore_ascii_case("port") {
            config.server.port = serde_json::from_value(value)?;
        }
    }
    Ok(config)
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    JsonParse(PathBuf, serde_json::Error),
    UnsupportedFormat(PathBuf),
    MissingPort,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::JsonParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::UnsupportedFormat(path) => write!(
                f,
                "Unsupported config file '{}': expected .toml or .json",
                path.display()
            ),
            ConfigError::MissingPort => {
                write!(f, "No listening port configured (use --port or a config file)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, None);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.storage.root, PathBuf::from("ReceivedData"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 5000
            max_connections = 16

            [storage]
            root = "/var/lib/receiver"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, Some(5000));
        assert_eq!(config.server.max_connections, 16);
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/receiver"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_json_port_case_insensitive() {
        for text in [r#"{"Port": 5000}"#, r#"{"port": 5000}"#, r#"{"PORT": 5000, "x": 1}"#] {
            let config = parse_json(text).unwrap();
            assert_eq!(config.server.port, Some(5000), "input {text}");
        }
    }

    #[test]
    fn test_json_malformed() {
        assert!(parse_json("{\"Port\": \"abc\"}").is_err());
        assert!(parse_json("{\"Port\": 70000}").is_err());
        assert!(parse_json("[5000]").is_err());
    }

    #[test]
    fn test_missing_port_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        match Config::resolve(CliArgs::default(), &tmp.path().join("config.json")) {
            Err(ConfigError::MissingPort) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_cli_overrides_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "receiver.toml",
            "[server]\nport = 5000\nhost = \"127.0.0.1\"\n[logging]\nlevel = \"warn\"\n",
        );

        let config = Config::from_args(CliArgs {
            config: Some(path),
            port: Some(6000),
            root: Some(PathBuf::from("out")),
            ..CliArgs::default()
        })
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.root, PathBuf::from("out"));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.listen_addr(), "127.0.0.1:6000");
    }

    #[test]
    fn test_legacy_json_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "config.json", r#"{ "Port": 5050 }"#);

        let config = Config::from_args(CliArgs {
            config: Some(path),
            ..CliArgs::default()
        })
        .unwrap();
        assert_eq!(config.port, 5050);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_default_json_file_in_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "config.json", r#"{"Port": 5000}"#);

        let config = Config::resolve(CliArgs::default(), &path).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.root, PathBuf::from("ReceivedData"));

        let overridden = Config::resolve(
            CliArgs {
                port: Some(7000),
                ..CliArgs::default()
            },
            &path,
        )
        .unwrap();
        assert_eq!(overridden.port, 7000);
    }

    #[test]
    fn test_explicit_config_skips_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let default = write_config(tmp.path(), "config.json", "{ broken");
        let explicit = write_config(tmp.path(), "receiver.toml", "[server]\nport = 6001\n");

        let config = Config::resolve(
            CliArgs {
                config: Some(explicit),
                ..CliArgs::default()
            },
            &default,
        )
        .unwrap();
        assert_eq!(config.port, 6001);
    }

    #[test]
    fn test_malformed_default_file_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "config.json", "{ Port: }");

        assert!(matches!(
            Config::resolve(CliArgs::default(), &path),
            Err(ConfigError::JsonParse(..))
        ));
    }

    #[test]
    fn test_file_errors() {
        let tmp = tempfile::tempdir().unwrap();

        let missing = CliArgs {
            config: Some(tmp.path().join("absent.toml")),
            ..CliArgs::default()
        };
        assert!(matches!(
            Config::from_args(missing),
            Err(ConfigError::FileRead(..))
        ));

        let bad_toml = write_config(tmp.path(), "bad.toml", "[server\nport = ");
        assert!(matches!(
            Config::from_args(CliArgs {
                config: Some(bad_toml),
                ..CliArgs::default()
            }),
            Err(ConfigError::TomlParse(..))
        ));

        let bad_json = write_config(tmp.path(), "bad.json", "{ Port: 1 }");
        assert!(matches!(
            Config::from_args(CliArgs {
                config: Some(bad_json),
                ..CliArgs::default()
            }),
            Err(ConfigError::JsonParse(..))
        ));

        let yaml = write_config(tmp.path(), "config.yaml", "port: 1");
        assert!(matches!(
            Config::from_args(CliArgs {
                config: Some(yaml),
                ..CliArgs::default()
            }),
            Err(ConfigError::UnsupportedFormat(..))
        ));
    }
}
