//! Shell configuration
//!
//! Everything has a working default. Overrides come from `NCERT_*`
//! environment variables and are read through a lookup function so the
//! parsing can be tested without touching the process environment.

use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
const LOOPBACK_HOST: &str = "127.0.0.1";

/// Arguments forwarded to the web application's `run` call, plus the two
/// config keys the shell sets before calling it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub use_reloader: bool,
    pub threaded: bool,
    /// `SEND_FILE_MAX_AGE_DEFAULT`, in seconds
    pub send_file_max_age_default: u64,
    /// `TEMPLATES_AUTO_RELOAD`
    pub templates_auto_reload: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug: false,
            use_reloader: false,
            threaded: true,
            send_file_max_age_default: 0,
            templates_auto_reload: true,
        }
    }
}

impl ServerOptions {
    /// Host a client should connect to. A wildcard bind is reached via
    /// loopback.
    pub fn connect_host(&self) -> String {
        match self.host.trim().parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => LOOPBACK_HOST.to_string(),
            Ok(IpAddr::V6(ip)) => format!("[{}]", ip),
            Ok(IpAddr::V4(ip)) => ip.to_string(),
            Err(_) => self.host.trim().to_string(),
        }
    }

    /// URL shown in the embedded view and opened in the browser
    pub fn server_url(&self) -> Result<Url> {
        let url = Url::parse(&format!("http://{}:{}/", self.connect_host(), self.port))?;
        Ok(url)
    }
}

/// How the external web application is started
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSettings {
    pub python: String,
    pub app_module: String,
    pub app_object: String,
    /// Working directory for the server process; the module is imported from here
    pub app_dir: Option<PathBuf>,
    /// Replaces the generated python invocation entirely
    pub custom_command: Option<Vec<String>>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        let python = if cfg!(target_os = "windows") {
            "python"
        } else {
            "python3"
        };
        Self {
            python: python.to_string(),
            app_module: "app".to_string(),
            app_object: "app".to_string(),
            app_dir: None,
            custom_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellConfig {
    pub server: ServerOptions,
    pub launch: LaunchSettings,
    /// Delay between starting the server and the first embed attempt
    pub embed_delay: Duration,
    /// Delay between pressing Refresh and the next embed attempt
    pub refresh_delay: Duration,
    pub probe_enabled: bool,
    pub probe_timeout: Duration,
    pub retry: RetryPolicy,
    /// When false the shell never tries to embed and goes straight to fallback
    pub embed_enabled: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            launch: LaunchSettings::default(),
            embed_delay: Duration::from_secs(5),
            refresh_delay: Duration::from_secs(1),
            probe_enabled: true,
            probe_timeout: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            embed_enabled: true,
        }
    }
}

impl ShellConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = ShellConfig::default();

        if let Some(host) = get("NCERT_HOST") {
            config.server.host = host;
        }
        if let Some(port) = get("NCERT_PORT") {
            config.server.port = parse_port(&port)?;
        }
        if let Some(value) = get("NCERT_DEBUG") {
            config.server.debug = parse_flag("NCERT_DEBUG", &value)?;
        }
        if let Some(value) = get("NCERT_THREADED") {
            config.server.threaded = parse_flag("NCERT_THREADED", &value)?;
        }

        if let Some(value) = get("NCERT_EMBED_DELAY_MS") {
            config.embed_delay = parse_millis("NCERT_EMBED_DELAY_MS", &value)?;
        }
        if let Some(value) = get("NCERT_REFRESH_DELAY_MS") {
            config.refresh_delay = parse_millis("NCERT_REFRESH_DELAY_MS", &value)?;
        }
        if let Some(value) = get("NCERT_PROBE") {
            config.probe_enabled = parse_flag("NCERT_PROBE", &value)?;
        }
        if let Some(value) = get("NCERT_PROBE_TIMEOUT_MS") {
            config.probe_timeout = parse_millis("NCERT_PROBE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("NCERT_EMBED") {
            config.embed_enabled = parse_flag("NCERT_EMBED", &value)?;
        }

        // 0 attempts means poll until the server answers
        if let Some(value) = get("NCERT_RETRY_MAX_ATTEMPTS") {
            let attempts: u32 = value
                .parse()
                .map_err(|_| AppError::config("NCERT_RETRY_MAX_ATTEMPTS", "not a whole number"))?;
            config.retry.max_attempts = if attempts == 0 { None } else { Some(attempts) };
        }
        if let Some(value) = get("NCERT_RETRY_INTERVAL_MS") {
            config.retry.interval = parse_millis("NCERT_RETRY_INTERVAL_MS", &value)?;
            if config.retry.max_interval < config.retry.interval {
                config.retry.max_interval = config.retry.interval;
            }
        }
        if let Some(value) = get("NCERT_RETRY_MULTIPLIER") {
            let multiplier: f64 = value
                .parse()
                .map_err(|_| AppError::config("NCERT_RETRY_MULTIPLIER", "not a number"))?;
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(AppError::config(
                    "NCERT_RETRY_MULTIPLIER",
                    "must be a number >= 1.0",
                ));
            }
            config.retry.multiplier = multiplier;
        }

        if let Some(python) = get("NCERT_PYTHON") {
            config.launch.python = python;
        }
        if let Some(module) = get("NCERT_APP_MODULE") {
            config.launch.app_module = module;
        }
        if let Some(object) = get("NCERT_APP_OBJECT") {
            config.launch.app_object = object;
        }
        if let Some(dir) = get("NCERT_APP_DIR") {
            config.launch.app_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = get("NCERT_SERVER_CMD") {
            let pieces = shlex::split(&raw)
                .ok_or_else(|| AppError::config("NCERT_SERVER_CMD", "unbalanced quoting"))?;
            if pieces.is_empty() {
                return Err(AppError::config("NCERT_SERVER_CMD", "empty command"));
            }
            config.launch.custom_command = Some(pieces);
        }

        Ok(config)
    }
}

fn parse_port(value: &str) -> Result<u16> {
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(AppError::config(
            "NCERT_PORT",
            format!("expected a port between 1 and 65535, got {value:?}"),
        )),
        Ok(port) => Ok(port),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::config(key, format!("expected a boolean, got {value:?}"))),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| AppError::config(key, format!("expected milliseconds, got {value:?}")))
}
