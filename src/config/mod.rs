//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

#[cfg(test)]
mod tests;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "rondo";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BATCH_SIZE: usize = 1;
const DEFAULT_TIMEZONE: &str = "Asia/Seoul";
const DEFAULT_CACHE_CONNECT_ATTEMPTS: u32 = 3;
const DEFAULT_CACHE_CONNECT_RETRY_SECS: u64 = 1;
const DEFAULT_DISPATCH_TIMES: &[&str] = &[
    "08:30", "10:00", "11:30", "13:00", "14:30", "16:00", "17:30", "19:00", "20:30",
];

/// Command-line arguments for the rondo binary.
#[derive(Debug, Parser)]
#[command(name = "rondo", version, about = "Rondo phrase digest bot")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "RONDO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    pub fn overrides(&self) -> Overrides {
        match &self.command {
            Some(Command::Serve(overrides)) | Some(Command::SendNow(overrides)) => {
                overrides.clone()
            }
            None => Overrides::default(),
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the scheduler and dispatch digests at the configured times.
    Serve(Overrides),
    /// Dispatch a single digest immediately, then exit.
    #[command(name = "send-now")]
    SendNow(Overrides),
}

/// CLI overrides, highest precedence in the configuration stack.
#[derive(Debug, Args, Clone, Default)]
pub struct Overrides {
    /// Postgres connection URL.
    #[arg(long = "database-url", env = "RONDO_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Redis connection URL; omit to use the in-process cache.
    #[arg(long = "cache-url", env = "RONDO_CACHE_URL")]
    pub cache_url: Option<String>,

    /// Phrases per digest.
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,

    /// Slack bot token.
    #[arg(long = "slack-bot-token", env = "RONDO_SLACK_BOT_TOKEN")]
    pub slack_bot_token: Option<String>,

    /// Slack channel id.
    #[arg(long = "slack-channel-id", env = "RONDO_SLACK_CHANNEL_ID")]
    pub slack_channel_id: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Force JSON log output.
    #[arg(long = "log-json")]
    pub log_json: bool,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("invalid setting `{field}`: {message}")]
    InvalidValue { field: &'static str, message: String },
}

impl SettingsError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for SettingsError {
    fn from(err: config::ConfigError) -> Self {
        Self::Load(err.to_string())
    }
}

/// A wall-clock dispatch time, `HH:MM`, in the dispatch timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct DispatchTime {
    pub hour: u8,
    pub minute: u8,
}

impl FromStr for DispatchTime {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = value
            .split_once(':')
            .ok_or_else(|| format!("`{value}` is not in HH:MM form"))?;
        let hour: u8 = hour
            .parse()
            .map_err(|_| format!("`{value}` has a non-numeric hour"))?;
        let minute: u8 = minute
            .parse()
            .map_err(|_| format!("`{value}` has a non-numeric minute"))?;
        if hour > 23 || minute > 59 {
            return Err(format!("`{value}` is outside the 24-hour clock"));
        }
        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for DispatchTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for DispatchTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

// ============================================================================
// Raw (deserialized) settings
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub database: RawDatabase,
    pub cache: RawCache,
    pub dispatch: RawDispatch,
    pub slack: RawSlack,
    pub logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawDatabase {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCache {
    pub url: Option<String>,
    pub connect_attempts: Option<u32>,
    pub connect_retry_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawDispatch {
    pub batch_size: Option<usize>,
    pub timezone: Option<String>,
    pub times: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSlack {
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawLogging {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl RawSettings {
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.database_url {
            self.database.url = Some(url.clone());
        }
        if let Some(url) = &overrides.cache_url {
            self.cache.url = Some(url.clone());
        }
        if let Some(batch_size) = overrides.batch_size {
            self.dispatch.batch_size = Some(batch_size);
        }
        if let Some(token) = &overrides.slack_bot_token {
            self.slack.bot_token = Some(token.clone());
        }
        if let Some(channel) = &overrides.slack_channel_id {
            self.slack.channel_id = Some(channel.clone());
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = Some(level.clone());
        }
        if overrides.log_json {
            self.logging.format = Some("json".to_string());
        }
    }
}

// ============================================================================
// Validated settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub dispatch: DispatchSettings,
    pub slack: SlackSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// `None` selects the in-process cache backend.
    pub url: Option<String>,
    pub connect_attempts: u32,
    pub connect_retry: Duration,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub batch_size: NonZeroUsize,
    pub timezone: Tz,
    pub times: Vec<DispatchTime>,
}

#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Settings {
    pub fn from_raw(raw: RawSettings) -> Result<Self, SettingsError> {
        let database = DatabaseSettings {
            url: raw
                .database
                .url
                .ok_or_else(|| SettingsError::invalid("database.url", "must be set"))?,
            max_connections: raw
                .database
                .max_connections
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        };

        let cache = CacheSettings {
            url: raw.cache.url,
            connect_attempts: raw
                .cache
                .connect_attempts
                .unwrap_or(DEFAULT_CACHE_CONNECT_ATTEMPTS)
                .max(1),
            connect_retry: Duration::from_secs(
                raw.cache
                    .connect_retry_secs
                    .unwrap_or(DEFAULT_CACHE_CONNECT_RETRY_SECS),
            ),
        };

        let batch_size = raw.dispatch.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        let batch_size = NonZeroUsize::new(batch_size)
            .ok_or_else(|| SettingsError::invalid("dispatch.batch_size", "must be at least 1"))?;

        let timezone_name = raw
            .dispatch
            .timezone
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| SettingsError::invalid("dispatch.timezone", "unknown timezone"))?;

        let raw_times = raw.dispatch.times.unwrap_or_else(|| {
            DEFAULT_DISPATCH_TIMES
                .iter()
                .map(|time| time.to_string())
                .collect()
        });
        if raw_times.is_empty() {
            return Err(SettingsError::invalid(
                "dispatch.times",
                "at least one dispatch time is required",
            ));
        }
        let mut times = Vec::with_capacity(raw_times.len());
        for value in &raw_times {
            times.push(
                value
                    .parse::<DispatchTime>()
                    .map_err(|err| SettingsError::invalid("dispatch.times", err))?,
            );
        }

        let level = match raw.logging.level {
            Some(value) => LevelFilter::from_str(&value)
                .map_err(|_| SettingsError::invalid("logging.level", "unknown level"))?,
            None => LevelFilter::INFO,
        };
        let format = match raw.logging.format.as_deref() {
            None | Some("compact") => LogFormat::Compact,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(SettingsError::invalid(
                    "logging.format",
                    format!("`{other}` is not `compact` or `json`"),
                ));
            }
        };

        Ok(Self {
            database,
            cache,
            dispatch: DispatchSettings {
                batch_size,
                timezone,
                times,
            },
            slack: SlackSettings {
                bot_token: raw.slack.bot_token,
                channel_id: raw.slack.channel_id,
            },
            logging: LoggingSettings { level, format },
        })
    }
}

/// Load settings with layered precedence: packaged defaults, a local
/// `rondo.toml`, an explicit `--config-file`, `RONDO_*` environment
/// variables, then CLI flags.
pub fn load(args: &CliArgs) -> Result<Settings, SettingsError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = &args.config_file {
        builder = builder.add_source(File::from(path.clone()));
    }

    let config = builder
        .add_source(Environment::with_prefix("RONDO").separator("__"))
        .build()?;

    let mut raw: RawSettings = config.try_deserialize()?;
    raw.apply_overrides(&args.overrides());
    Settings::from_raw(raw)
}
