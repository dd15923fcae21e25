use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::sleep;

use super::discovery::discover_browser;
use crate::error::{PresenceError, Result};

/// Launches a Chromium-family browser with CDP enabled and a persistent
/// user-data directory, so login cookies survive restarts.
pub struct BrowserLauncher {
    executable: PathBuf,
    cdp_port: u16,
    headless: bool,
    user_data_dir: PathBuf,
}

impl BrowserLauncher {
    pub fn new(
        executable: Option<PathBuf>,
        user_data_dir: &str,
        cdp_port: u16,
        headless: bool,
    ) -> Result<Self> {
        let executable = match executable {
            Some(path) if path.exists() => path,
            Some(path) => {
                return Err(PresenceError::BrowserLaunchFailed(format!(
                    "Browser not found at: {}",
                    path.display()
                )))
            }
            None => discover_browser()?.path,
        };

        let user_data_dir = PathBuf::from(shellexpand::tilde(user_data_dir).to_string());

        Ok(Self {
            executable,
            cdp_port,
            headless,
            user_data_dir,
        })
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.cdp_port),
            format!("--user-data-dir={}", self.user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-infobars".to_string(),
            "--window-size=1280,1024".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args
    }

    /// Launch the browser process.
    pub fn launch(&self) -> Result<Child> {
        std::fs::create_dir_all(&self.user_data_dir)?;

        let args = self.build_args();
        tracing::debug!(
            "Launching browser: {:?} with args: {:?}",
            self.executable,
            args
        );

        let child = Command::new(&self.executable)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                PresenceError::BrowserLaunchFailed(format!(
                    "Failed to launch {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;

        Ok(child)
    }

    /// Launch the browser and wait for its CDP endpoint to come up.
    pub async fn launch_and_wait(&self) -> Result<(Child, String)> {
        let child = self.launch()?;
        let cdp_url = self.wait_for_cdp().await?;
        Ok((child, cdp_url))
    }

    /// Poll `/json/version` until the WebSocket debugger URL appears.
    async fn wait_for_cdp(&self) -> Result<String> {
        let url = format!("http://127.0.0.1:{}/json/version", self.cdp_port);

        // Bypass any configured proxy for localhost
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        // Try for up to 10 seconds
        for i in 0..20 {
            sleep(Duration::from_millis(500)).await;

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await.map_err(|e| {
                        PresenceError::CdpConnectionFailed(format!(
                            "Failed to parse CDP response: {}",
                            e
                        ))
                    })?;

                    if let Some(ws_url) = json.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
                    {
                        tracing::info!("CDP ready at: {}", ws_url);
                        return Ok(ws_url.to_string());
                    }
                }
                Ok(_) => {
                    tracing::debug!("CDP not ready yet (attempt {})", i + 1);
                }
                Err(e) => {
                    tracing::debug!("CDP connection attempt {} failed: {}", i + 1, e);
                }
            }
        }

        Err(PresenceError::CdpConnectionFailed(
            "Timeout waiting for CDP to be ready".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_explicit_executable_is_rejected() {
        let result = BrowserLauncher::new(
            Some(PathBuf::from("/definitely/not/a/browser")),
            "chrome",
            9222,
            true,
        );
        assert!(matches!(
            result,
            Err(PresenceError::BrowserLaunchFailed(_))
        ));
    }

    #[test]
    fn headless_flag_changes_args() {
        // Only run where a browser can actually be discovered.
        let Ok(info) = discover_browser() else {
            return;
        };
        let launcher =
            BrowserLauncher::new(Some(info.path), "chrome", 9321, true).unwrap();
        assert!(launcher
            .build_args()
            .iter()
            .any(|a| a == "--headless=new"));
        assert!(launcher
            .build_args()
            .iter()
            .any(|a| a == "--remote-debugging-port=9321"));
    }
}
