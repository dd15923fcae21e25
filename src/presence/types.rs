use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::Options;
use crate::error::Result;

/// Current observable state of the presence loop. Exactly one is active at a
/// time; the wire shape tags the variant with a `status` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PresenceStatus {
    Inactive,
    Loading,
    #[serde(rename_all = "camelCase")]
    Active {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        avatar_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        avatar_url_2x: Option<String>,
        #[serde(rename = "endISOTime", skip_serializing_if = "Option::is_none")]
        end_iso_time: Option<DateTime<Local>>,
    },
    #[serde(rename_all = "camelCase")]
    NeedsReLogin {
        #[serde(skip_serializing_if = "Option::is_none")]
        devtools_frontend_url: Option<String>,
    },
    OutOfSchedule {
        #[serde(rename = "startISOTime", skip_serializing_if = "Option::is_none")]
        start_iso_time: Option<DateTime<Local>>,
    },
    FailedToLoad,
}

impl PresenceStatus {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PresenceStatus::Inactive => "inactive",
            PresenceStatus::Loading => "loading",
            PresenceStatus::Active { .. } => "active",
            PresenceStatus::NeedsReLogin { .. } => "needsReLogin",
            PresenceStatus::OutOfSchedule { .. } => "outOfSchedule",
            PresenceStatus::FailedToLoad => "failedToLoad",
        }
    }
}

/// Display data scraped from an active session. Best-effort: empty values
/// never block the active transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserActiveData {
    /// Primary avatar URL first, retina variant second when present.
    pub avatar_urls: Vec<String>,
    pub user_name: String,
}

/// Default probe budgets for [`PresenceService::wait_loaded`] and
/// [`PresenceService::wait_active`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceTimeouts {
    pub wait_load: Duration,
    pub wait_active: Duration,
}

impl Default for ServiceTimeouts {
    fn default() -> Self {
        Self {
            wait_load: Duration::from_secs(20),
            wait_active: Duration::from_secs(20),
        }
    }
}

/// The capability the loop depends on to establish presence.
///
/// `Ok(false)` expresses the recoverable "condition not met" outcomes the
/// loop reacts to by policy; `Err` expresses environment failures (service
/// not initialized, CDP breakage) the loop escalates as fatal.
#[async_trait]
pub trait PresenceService: Send + Sync {
    fn name(&self) -> &str;

    /// Must be called before first use; safe to call again after `close`.
    async fn init(&self) -> Result<()>;

    /// Navigate to `url`. Navigation failure is `Ok(false)`, not an error.
    async fn load(&self, url: &str) -> Result<bool>;

    /// Wait until the chat shell is rendered; `Ok(false)` on timeout.
    async fn wait_loaded(&self, timeout: Option<Duration>) -> Result<bool>;

    /// Wait until the presence indicator shows active; `Ok(false)` on timeout.
    async fn wait_active(&self, timeout: Option<Duration>) -> Result<bool>;

    async fn get_active_data(&self) -> Result<UserActiveData>;

    /// Diagnostic screenshot for notification attachments.
    async fn get_screenshot(&self) -> Result<Vec<u8>>;

    /// Release the session; safe to call multiple times.
    async fn close(&self) -> Result<()>;
}

/// Supplementary link attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierUrl {
    pub url: String,
    pub url_title: String,
}

/// Best-effort notification delivery. Implementations catch and log their own
/// failures; nothing propagates back into the loop.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        title: &str,
        message: &str,
        image: Option<&[u8]>,
        link: Option<&NotifierUrl>,
    );
}

/// Events broadcast by the presence loop, at most once per actual change.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Status(PresenceStatus),
    Options(Options),
}
