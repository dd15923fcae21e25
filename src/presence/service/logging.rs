use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::presence::types::{PresenceService, UserActiveData};
use crate::util::measure;

/// Decorates a [`PresenceService`] with timing and outcome logging, so the
/// loop's own log stays focused on state transitions.
pub struct LoggingService<S> {
    inner: S,
}

impl<S> LoggingService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: PresenceService> PresenceService for LoggingService<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn init(&self) -> Result<()> {
        info!("Initializing {} service", self.name());
        self.inner.init().await
    }

    async fn load(&self, url: &str) -> Result<bool> {
        info!("Loading {} service: {}...", self.name(), url);
        let (result, elapsed) = measure(self.inner.load(url)).await;
        match &result {
            Ok(true) => info!("Loaded {} in {:.1?}", url, elapsed),
            Ok(false) => warn!("Failed to load {} after {:.1?}", url, elapsed),
            Err(e) => error!("Error loading {}: {}", url, e),
        }
        result
    }

    async fn wait_loaded(&self, timeout: Option<Duration>) -> Result<bool> {
        info!("Waiting for {} to fully load the page...", self.name());
        let (result, elapsed) = measure(self.inner.wait_loaded(timeout)).await;
        match &result {
            Ok(true) => info!("{} has loaded the page in {:.1?}", self.name(), elapsed),
            Ok(false) => warn!(
                "{} failed to load the page within {:.1?}",
                self.name(),
                elapsed
            ),
            Err(e) => error!("Error waiting for {} page load: {}", self.name(), e),
        }
        result
    }

    async fn wait_active(&self, timeout: Option<Duration>) -> Result<bool> {
        info!("Waiting for {} to become active...", self.name());
        let (result, elapsed) = measure(self.inner.wait_active(timeout)).await;
        match &result {
            Ok(true) => info!("{} has become active in {:.1?}", self.name(), elapsed),
            Ok(false) => warn!(
                "{} did not become active within {:.1?}",
                self.name(),
                elapsed
            ),
            Err(e) => error!("Error waiting for {} activity: {}", self.name(), e),
        }
        result
    }

    async fn get_active_data(&self) -> Result<UserActiveData> {
        self.inner.get_active_data().await
    }

    async fn get_screenshot(&self) -> Result<Vec<u8>> {
        info!("Taking screenshot of {}", self.name());
        self.inner.get_screenshot().await
    }

    async fn close(&self) -> Result<()> {
        info!("Closing {} service", self.name());
        self.inner.close().await
    }
}
