use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Resolves a human-usable URL to the live browser session, shown to the
/// user when manual re-login is required. May fail silently: `None` simply
/// omits the link from the status payload.
#[async_trait]
pub trait DebugUrlProvider: Send + Sync {
    async fn debug_url(&self) -> Option<String>;
}

/// Queries the Chrome debug endpoint for the DevTools frontend URL of the
/// first open page.
pub struct DevToolsService {
    client: reqwest::Client,
    host: String,
    cdp_port: u16,
}

impl DevToolsService {
    pub fn new(host: impl Into<String>, cdp_port: u16) -> Self {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            host: host.into(),
            cdp_port,
        }
    }
}

#[async_trait]
impl DebugUrlProvider for DevToolsService {
    async fn debug_url(&self) -> Option<String> {
        let base = format!("http://{}:{}", self.host, self.cdp_port);
        let response = self.client.get(format!("{base}/json")).send().await.ok()?;
        let pages: serde_json::Value = response.json().await.ok()?;
        let frontend = pages.get(0)?.get("devtoolsFrontendUrl")?.as_str()?;
        debug!("DevTools URL: {}", frontend);
        Some(format!("{base}{frontend}"))
    }
}
