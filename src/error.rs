use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Browser not found. Install Chrome, Chromium, Brave, or Edge, or set browser.executable.")]
    BrowserNotFound,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("CDP connection failed: {0}")]
    CdpConnectionFailed(String),

    #[error("Presence service has not been initialized")]
    ServiceNotInitialized,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PresenceError>;
