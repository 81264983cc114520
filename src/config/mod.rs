//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::types::Category;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "defter";
const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_TABLE: &str = "blog_posts";
const DEFAULT_CHANNEL: &str = "blog_posts_channel";
const DEFAULT_HEARTBEAT_SECS: u64 = 30;
const DEFAULT_SESSION_FILE: &str = ".defter/session.json";

/// Command-line arguments for the defter binary.
#[derive(Debug, Parser)]
#[command(name = "defter", version, about = "Read and write posts on a hosted blog")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "DEFTER_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the backend project URL.
    #[arg(long = "supabase-url", value_name = "URL", global = true)]
    pub supabase_url: Option<String>,

    /// Override the public (anon) API key.
    #[arg(long = "supabase-anon-key", value_name = "KEY", global = true)]
    pub supabase_anon_key: Option<String>,

    /// Override where the signed-in session is stored.
    #[arg(long = "session-file", value_name = "PATH", global = true)]
    pub session_file: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Sign in with email and password.
    #[command(name = "sign-in")]
    SignIn(SignInArgs),
    /// Sign out and forget the stored session.
    #[command(name = "sign-out")]
    SignOut,
    /// Show the signed-in identity.
    Whoami,
    /// List posts, newest first by default.
    List(FilterArgs),
    /// Show a single post.
    Show(ShowArgs),
    /// Publish a new post.
    Create(CreateArgs),
    /// Replace the content of an existing post.
    Edit(EditArgs),
    /// Keep the post list on screen and refresh it as the collection changes.
    Watch(FilterArgs),
}

#[derive(Debug, Args, Clone)]
pub struct SignInArgs {
    #[arg(long, value_name = "EMAIL")]
    pub email: String,

    /// Read the password from a file (takes precedence over env).
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub password_file: Option<PathBuf>,

    /// Password from env (CLI flag intentionally disabled to avoid shell history leaks).
    #[arg(hide = true, env = "DEFTER_PASSWORD", hide_env_values = true)]
    pub password_env: Option<String>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct FilterArgs {
    /// Only show posts of this category (Yazı, Şiir, Anı, Deneme).
    #[arg(long, value_parser = parse_category)]
    pub category: Option<Category>,

    /// Oldest posts first.
    #[arg(long, action = ArgAction::SetTrue)]
    pub oldest: bool,

    /// Only show posts carrying at least one of these tags (up to 5).
    #[arg(long = "tag", value_name = "TAG", action = ArgAction::Append)]
    pub tags: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    pub id: String,
}

#[derive(Debug, Args, Clone)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub summary: String,
    #[arg(long, value_parser = parse_category, default_value = "Yazı")]
    pub category: Category,
    #[arg(long = "cover-image", value_name = "URL")]
    pub cover_image: String,
    #[arg(long)]
    pub content: Option<String>,
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub content_file: Option<PathBuf>,
    #[arg(long = "tag", value_name = "TAG", action = ArgAction::Append)]
    pub tags: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub content: Option<String>,
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub content_file: Option<PathBuf>,
}

fn parse_category(value: &str) -> Result<Category, String> {
    value.parse::<Category>().map_err(|err| err.to_string())
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub supabase: SupabaseSettings,
    pub realtime: RealtimeSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: Url,
    pub anon_key: String,
    pub schema: String,
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    pub channel: String,
    pub heartbeat: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DEFTER").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    supabase: RawSupabaseSettings,
    realtime: RawRealtimeSettings,
    session: RawSessionSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.supabase_url.as_ref() {
            self.supabase.url = Some(url.clone());
        }
        if let Some(key) = overrides.supabase_anon_key.as_ref() {
            self.supabase.anon_key = Some(key.clone());
        }
        if let Some(file) = overrides.session_file.as_ref() {
            self.session.file = Some(file.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            supabase: build_supabase_settings(raw.supabase)?,
            realtime: build_realtime_settings(raw.realtime)?,
            session: build_session_settings(raw.session),
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn build_supabase_settings(raw: RawSupabaseSettings) -> Result<SupabaseSettings, LoadError> {
    let url = non_blank(raw.url)
        .ok_or_else(|| LoadError::invalid("supabase.url", "is required"))?;
    let url = Url::parse(&url)
        .map_err(|err| LoadError::invalid("supabase.url", format!("failed to parse: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "supabase.url",
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }

    let anon_key = non_blank(raw.anon_key)
        .ok_or_else(|| LoadError::invalid("supabase.anon_key", "is required"))?;

    Ok(SupabaseSettings {
        url,
        anon_key,
        schema: non_blank(raw.schema).unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
        table: non_blank(raw.table).unwrap_or_else(|| DEFAULT_TABLE.to_string()),
    })
}

fn build_realtime_settings(raw: RawRealtimeSettings) -> Result<RealtimeSettings, LoadError> {
    let seconds = raw.heartbeat_seconds.unwrap_or(DEFAULT_HEARTBEAT_SECS);
    let seconds = NonZeroU64::new(seconds)
        .ok_or_else(|| LoadError::invalid("realtime.heartbeat_seconds", "must be greater than zero"))?;

    Ok(RealtimeSettings {
        channel: non_blank(raw.channel).unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
        heartbeat: Duration::from_secs(seconds.get()),
    })
}

fn build_session_settings(raw: RawSessionSettings) -> SessionSettings {
    SessionSettings {
        file: raw
            .file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE)),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSupabaseSettings {
    url: Option<String>,
    anon_key: Option<String>,
    schema: Option<String>,
    table: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRealtimeSettings {
    channel: Option<String>,
    heartbeat_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}
