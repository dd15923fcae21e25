use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// Keep your Slack status showing online by driving a background Chrome session
#[derive(Debug, Parser)]
#[command(name = "slack-presence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Host to bind the control surface on
    #[arg(long, env = "SLACK_PRESENCE_HOST")]
    pub host: Option<String>,

    /// Port to bind the control surface on
    #[arg(long, env = "SLACK_PRESENCE_PORT")]
    pub port: Option<u16>,

    /// App configuration file (TOML)
    #[arg(long, env = "SLACK_PRESENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Persisted runtime options file
    #[arg(long, env = "SLACK_PRESENCE_OPTIONS_FILE")]
    pub options_file: Option<PathBuf>,

    /// Browser executable path (overrides auto-discovery)
    #[arg(long, env = "SLACK_PRESENCE_BROWSER_PATH")]
    pub browser_path: Option<String>,

    /// Run the browser headless
    #[arg(long, env = "SLACK_PRESENCE_HEADLESS")]
    pub headless: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the layered configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(options_file) = &self.options_file {
            config.options_file = options_file.clone();
        }
        if let Some(browser_path) = &self.browser_path {
            config.browser.executable = Some(browser_path.clone());
        }
        if self.headless {
            config.browser.headless = true;
        }
    }
}
