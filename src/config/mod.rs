mod options;

pub use options::{is_slack_url, read_options, write_options, Options, OptionsPatch};

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{PresenceError, Result};

/// Process-level configuration: the control surface address, the browser to
/// drive and the loop's timing knobs. Distinct from [`Options`], which is the
/// runtime-mutated state persisted to `options.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub timeouts: TimeoutsConfig,

    /// Path of the persisted runtime options file.
    pub options_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            browser: BrowserConfig::default(),
            timeouts: TimeoutsConfig::default(),
            options_file: PathBuf::from("options.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host the HTTP/WebSocket surface binds to. Also used to compose the
    /// DevTools link shown on re-login.
    pub host: String,
    pub port: u16,

    /// Externally reachable base URL of this server, attached to
    /// notifications as a link when set.
    pub remote_url_base: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            remote_url_base: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Browser executable path (overrides auto-discovery)
    pub executable: Option<String>,

    /// CDP port the browser is launched with
    pub cdp_port: u16,

    /// Run the browser headless
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            cdp_port: 9222,
            headless: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Default budget for the "chat shell rendered" probe.
    pub wait_load_ms: u64,
    /// Default budget for the "presence indicator active" probe.
    pub wait_active_ms: u64,
    /// Interval of the indefinite re-login recovery poll.
    pub relogin_poll_ms: u64,
    /// Per-attempt probe budget inside the recovery poll.
    pub relogin_probe_timeout_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            wait_load_ms: 20_000,
            wait_active_ms: 20_000,
            relogin_poll_ms: 500,
            relogin_probe_timeout_ms: 1_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources (defaults, file, environment).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("SLACK_PRESENCE_").split("__"))
            .extract()
            .map_err(|e| PresenceError::ConfigError(e.to_string()))
    }

    /// Default configuration file path.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("slack-presence")
            .join("config.toml")
    }
}
