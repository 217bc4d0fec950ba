//! Configuration module for the load generator.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values. The resolved
//! `Config` is validated once and immutable afterwards; validation failures
//! are fatal before any worker spawns.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Lower bound on the run duration.
pub const MIN_DURATION: Duration = Duration::from_secs(10);

/// Lower bound on connect and send/recv timeouts.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

/// What each worker sends on every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadMode {
    /// `"Hello from <worker>\n"`
    FixedText,
    /// Pseudo-random printable bytes with a newline terminator.
    RandomBytes,
}

/// Command-line arguments for the load generator
#[derive(Parser, Debug)]
#[command(name = "echobench")]
#[command(version = "0.1.0")]
#[command(about = "A concurrent TCP load generator for echo-style services", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Target hostname
    #[arg(long)]
    pub host: Option<String>,

    /// Target port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Number of workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Number of pooled connections, reused round-robin (defaults to the
    /// worker count)
    #[arg(long)]
    pub connections: Option<usize>,

    /// Messages sent per connection before it is closed and reopened
    #[arg(short = 's', long)]
    pub send: Option<usize>,

    /// Delay between cycles, e.g. "10ms" (0 to disable)
    #[arg(long)]
    pub delay: Option<String>,

    /// Test duration, e.g. "60s"
    #[arg(short = 'd', long)]
    pub duration: Option<String>,

    /// Connect timeout, e.g. "200ms"
    #[arg(short = 'c', long)]
    pub connect_timeout: Option<String>,

    /// Send/recv timeout, e.g. "200ms"
    #[arg(short = 't', long)]
    pub io_timeout: Option<String>,

    /// Payload sent on each cycle
    #[arg(long, value_enum)]
    pub payload: Option<PayloadMode>,

    /// Random payload size in bytes, terminator included
    #[arg(long)]
    pub payload_size: Option<usize>,

    /// Compare echoed bytes against the sent payload
    #[arg(long)]
    pub validate: bool,

    /// Measurement log file (creation is refused if it already exists)
    #[arg(short = 'o', long)]
    pub stat: Option<PathBuf>,

    /// Log worker lifecycle and unclassified error causes
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub payload: PayloadConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target endpoint
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Load shape: concurrency, quota, pacing
#[derive(Debug, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 0 means "same as workers"
    #[serde(default)]
    pub connections: usize,
    #[serde(default = "default_send")]
    pub send: usize,
    #[serde(default = "default_delay")]
    pub delay: String,
    #[serde(default = "default_test_duration")]
    pub duration: String,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            connections: 0,
            send: default_send(),
            delay: default_delay(),
            duration: default_test_duration(),
        }
    }
}

/// Deadlines for connect and send/recv
#[derive(Debug, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_timeout")]
    pub connect: String,
    #[serde(default = "default_timeout")]
    pub io: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: default_timeout(),
            io: default_timeout(),
        }
    }
}

/// Payload generation and validation
#[derive(Debug, Deserialize)]
pub struct PayloadConfig {
    #[serde(default = "default_payload_mode")]
    pub mode: PayloadMode,
    #[serde(default = "default_payload_size")]
    pub size: usize,
    #[serde(default)]
    pub validate: bool,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            mode: default_payload_mode(),
            size: default_payload_size(),
            validate: false,
        }
    }
}

/// Measurement log output
#[derive(Debug, Deserialize, Default)]
pub struct OutputConfig {
    pub stat_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
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
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_workers() -> usize {
    10
}

fn default_send() -> usize {
    1
}

fn default_delay() -> String {
    "0".to_string()
}

fn default_test_duration() -> String {
    "60s".to_string()
}

fn default_timeout() -> String {
    "200ms".to_string()
}

fn default_payload_mode() -> PayloadMode {
    PayloadMode::FixedText
}

fn default_payload_size() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration, immutable after validation.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    pub workers: usize,
    pub connections: usize,
    pub send_per_conn: usize,
    pub delay: Duration,
    pub duration: Duration,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub payload_mode: PayloadMode,
    pub payload_size: usize,
    pub validate: bool,
    pub stat_file: PathBuf,
    pub verbose: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn resolve(cli: CliArgs, toml: TomlConfig) -> Result<Self, ConfigError> {
        let mut host = cli.host.unwrap_or(toml.target.host);
        if host.is_empty() {
            host = default_host();
        }
        let port = cli.port.unwrap_or(toml.target.port);
        if port == 0 {
            return Err(ConfigError::Invalid {
                name: "port",
                value: port.to_string(),
            });
        }

        let workers = cli.workers.unwrap_or(toml.load.workers);
        if workers < 1 {
            return Err(ConfigError::Invalid {
                name: "workers",
                value: workers.to_string(),
            });
        }
        let mut connections = cli.connections.unwrap_or(toml.load.connections);
        if connections == 0 {
            connections = workers;
        } else if connections < workers {
            return Err(ConfigError::LowConnections {
                connections,
                workers,
            });
        }
        let send_per_conn = cli.send.unwrap_or(toml.load.send);
        if send_per_conn < 1 {
            return Err(ConfigError::Invalid {
                name: "send",
                value: send_per_conn.to_string(),
            });
        }

        let delay = parse_duration_min(
            cli.delay.as_deref().unwrap_or(&toml.load.delay),
            Duration::ZERO,
            "delay",
        )?;
        let duration = parse_duration_min(
            cli.duration.as_deref().unwrap_or(&toml.load.duration),
            MIN_DURATION,
            "duration",
        )?;
        let connect_timeout = parse_duration_min(
            cli.connect_timeout
                .as_deref()
                .unwrap_or(&toml.timeouts.connect),
            MIN_TIMEOUT,
            "connect timeout",
        )?;
        let io_timeout = parse_duration_min(
            cli.io_timeout.as_deref().unwrap_or(&toml.timeouts.io),
            MIN_TIMEOUT,
            "timeout",
        )?;

        let payload_mode = cli.payload.unwrap_or(toml.payload.mode);
        let payload_size = cli.payload_size.unwrap_or(toml.payload.size);
        if payload_mode == PayloadMode::RandomBytes && payload_size < 2 {
            return Err(ConfigError::Invalid {
                name: "payload size",
                value: payload_size.to_string(),
            });
        }
        let validate = cli.validate || toml.payload.validate;

        let stat_file = cli
            .stat
            .or(toml.output.stat_file)
            .ok_or(ConfigError::MissingStatFile)?;

        Ok(Config {
            addr: format!("{host}:{port}"),
            workers,
            connections,
            send_per_conn,
            delay,
            duration,
            connect_timeout,
            io_timeout,
            payload_mode,
            payload_size,
            validate,
            stat_file,
            verbose: cli.verbose,
            log_level: cli.log_level.unwrap_or(toml.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("invalid {name} value: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("low {name} value: {value}, must be {min} or greater")]
    LowDuration {
        name: &'static str,
        value: String,
        min: String,
    },
    #[error(
        "low connections value: {connections}, must be equal workers count ({workers}) or greater"
    )]
    LowConnections { connections: usize, workers: usize },
    #[error("stat file must be set")]
    MissingStatFile,
}

/// Parse a duration like `"200ms"`, `"60s"`, `"2m"`. A bare `"0"` is zero.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let value: u64 = s[..split].parse().ok()?;
    match &s[split..] {
        "us" => Some(Duration::from_micros(value)),
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

/// Render a duration the way `parse_duration` accepts it.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        "0s".to_string()
    } else if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else if d.as_micros() % 1000 == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}us", d.as_micros())
    }
}

fn parse_duration_min(s: &str, min: Duration, name: &'static str) -> Result<Duration, ConfigError> {
    let d = parse_duration(s).ok_or_else(|| ConfigError::Invalid {
        name,
        value: s.to_string(),
    })?;
    if d < min {
        return Err(ConfigError::LowDuration {
            name,
            value: format_duration(d),
            min: format_duration(min),
        });
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_cli() -> CliArgs {
        CliArgs {
            config: None,
            host: None,
            port: None,
            workers: None,
            connections: None,
            send: None,
            delay: None,
            duration: None,
            connect_timeout: None,
            io_timeout: None,
            payload: None,
            payload_size: None,
            validate: false,
            stat: Some("bench.log".into()),
            verbose: false,
            log_level: None,
        }
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.target.host, "127.0.0.1");
        assert_eq!(config.target.port, 1234);
        assert_eq!(config.load.workers, 10);
        assert_eq!(config.load.connections, 0);
        assert_eq!(config.load.send, 1);
        assert_eq!(config.timeouts.connect, "200ms");
        assert_eq!(config.payload.mode, PayloadMode::FixedText);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [target]
            host = "10.1.2.3"
            port = 7777

            [load]
            workers = 4
            connections = 16
            send = 3
            delay = "5ms"
            duration = "2m"

            [timeouts]
            connect = "100ms"
            io = "250ms"

            [payload]
            mode = "random-bytes"
            size = 128
            validate = true

            [output]
            stat_file = "run.log"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.target.host, "10.1.2.3");
        assert_eq!(config.target.port, 7777);
        assert_eq!(config.load.workers, 4);
        assert_eq!(config.load.connections, 16);
        assert_eq!(config.load.send, 3);
        assert_eq!(config.load.delay, "5ms");
        assert_eq!(config.load.duration, "2m");
        assert_eq!(config.timeouts.connect, "100ms");
        assert_eq!(config.timeouts.io, "250ms");
        assert_eq!(config.payload.mode, PayloadMode::RandomBytes);
        assert_eq!(config.payload.size, 128);
        assert!(config.payload.validate);
        assert_eq!(config.output.stat_file, Some("run.log".into()));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn resolve_applies_defaults() {
        let config = Config::resolve(bare_cli(), TomlConfig::default()).unwrap();
        assert_eq!(config.addr, "127.0.0.1:1234");
        assert_eq!(config.workers, 10);
        // connections default to the worker count
        assert_eq!(config.connections, 10);
        assert_eq!(config.send_per_conn, 1);
        assert_eq!(config.delay, Duration::ZERO);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_millis(200));
        assert_eq!(config.io_timeout, Duration::from_millis(200));
        assert_eq!(config.payload_mode, PayloadMode::FixedText);
        assert!(!config.validate);
    }

    #[test]
    fn cli_takes_precedence_over_toml() {
        let toml: TomlConfig = toml::from_str(
            r#"
            [load]
            workers = 4
            duration = "30s"
            [logging]
            level = "debug"
        "#,
        )
        .unwrap();
        let mut cli = bare_cli();
        cli.workers = Some(8);
        cli.duration = Some("90s".to_string());

        let config = Config::resolve(cli, toml).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.duration, Duration::from_secs(90));
        // untouched by CLI: TOML wins
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn cli_flags_parse() {
        let cli = CliArgs::try_parse_from([
            "echobench",
            "--host",
            "192.168.0.9",
            "-p",
            "9000",
            "-w",
            "2",
            "--connections",
            "8",
            "-s",
            "5",
            "-d",
            "30s",
            "-c",
            "50ms",
            "-t",
            "80ms",
            "--payload",
            "random-bytes",
            "--payload-size",
            "256",
            "--validate",
            "-o",
            "out.log",
        ])
        .unwrap();

        let config = Config::resolve(cli, TomlConfig::default()).unwrap();
        assert_eq!(config.addr, "192.168.0.9:9000");
        assert_eq!(config.workers, 2);
        assert_eq!(config.connections, 8);
        assert_eq!(config.send_per_conn, 5);
        assert_eq!(config.duration, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_millis(50));
        assert_eq!(config.io_timeout, Duration::from_millis(80));
        assert_eq!(config.payload_mode, PayloadMode::RandomBytes);
        assert_eq!(config.payload_size, 256);
        assert!(config.validate);
        assert_eq!(config.stat_file, PathBuf::from("out.log"));
    }

    #[test]
    fn rejects_zero_workers() {
        let mut cli = bare_cli();
        cli.workers = Some(0);
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::Invalid {
                name: "workers",
                ..
            })
        ));
    }

    #[test]
    fn rejects_fewer_connections_than_workers() {
        let mut cli = bare_cli();
        cli.workers = Some(4);
        cli.connections = Some(3);
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::LowConnections {
                connections: 3,
                workers: 4
            })
        ));
    }

    #[test]
    fn rejects_zero_send() {
        let mut cli = bare_cli();
        cli.send = Some(0);
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::Invalid { name: "send", .. })
        ));
    }

    #[test]
    fn rejects_zero_port() {
        let mut cli = bare_cli();
        cli.port = Some(0);
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::Invalid { name: "port", .. })
        ));
    }

    #[test]
    fn rejects_short_duration() {
        let mut cli = bare_cli();
        cli.duration = Some("9s".to_string());
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::LowDuration {
                name: "duration",
                ..
            })
        ));
        let mut cli = bare_cli();
        cli.duration = Some("10s".to_string());
        assert!(Config::resolve(cli, TomlConfig::default()).is_ok());
    }

    #[test]
    fn rejects_short_timeouts() {
        let mut cli = bare_cli();
        cli.connect_timeout = Some("9ms".to_string());
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::LowDuration {
                name: "connect timeout",
                ..
            })
        ));
        let mut cli = bare_cli();
        cli.io_timeout = Some("5ms".to_string());
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::LowDuration { name: "timeout", .. })
        ));
    }

    #[test]
    fn rejects_malformed_duration() {
        let mut cli = bare_cli();
        cli.delay = Some("soon".to_string());
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::Invalid { name: "delay", .. })
        ));
    }

    #[test]
    fn rejects_undersized_random_payload() {
        let mut cli = bare_cli();
        cli.payload = Some(PayloadMode::RandomBytes);
        cli.payload_size = Some(1);
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::Invalid {
                name: "payload size",
                ..
            })
        ));
    }

    #[test]
    fn missing_stat_file_is_fatal() {
        let mut cli = bare_cli();
        cli.stat = None;
        assert!(matches!(
            Config::resolve(cli, TomlConfig::default()),
            Err(ConfigError::MissingStatFile)
        ));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("250us"), Some(Duration::from_micros(250)));
        assert_eq!(parse_duration("200ms"), Some(Duration::from_millis(200)));
        assert_eq!(parse_duration("15s"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration(" 60s "), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("12"), None);
        assert_eq!(parse_duration("ms"), None);
        assert_eq!(parse_duration("10sec"), None);
        assert_eq!(parse_duration("-5s"), None);
    }

    #[test]
    fn format_duration_roundtrips() {
        for s in ["0s", "200ms", "15s", "1500us"] {
            let d = parse_duration(s).unwrap();
            assert_eq!(format_duration(d), s);
            assert_eq!(parse_duration(&format_duration(d)), Some(d));
        }
        assert_eq!(format_duration(Duration::from_secs(120)), "120s");
    }
}
