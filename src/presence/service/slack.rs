use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::browser::BrowserLauncher;
use crate::error::{PresenceError, Result};
use crate::presence::types::{PresenceService, ServiceTimeouts, UserActiveData};
use crate::util::wait_for_condition;

// The Slack client markup these anchor to shifts occasionally; keep them in
// one place.
const TOP_NAV_SELECTOR: &str = "body > div.p-client_container > div > div.p-top_nav";
const PRESENCE_SELECTOR: &str = "#c-coachmark-anchor > button > div > \
     i.c-icon.p-ia__nav__user__presence.c-presence.c-presence--active.c-icon--presence-online";
const AVATAR_SELECTOR: &str = "#c-coachmark-anchor > button > div > span > span > img";
const NAME_SELECTOR: &str = "body > div.ReactModalPortal > div > div > div > div > div > div > \
     div:nth-child(1) > div > div.p-ia__main_menu__user__details > div > span";

const PROBE_POLL: Duration = Duration::from_millis(100);

struct Session {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

/// Drives a real Slack workspace through a CDP-attached browser.
pub struct SlackService {
    launcher: BrowserLauncher,
    timeouts: ServiceTimeouts,
    session: Mutex<Option<Session>>,
}

impl SlackService {
    pub fn new(launcher: BrowserLauncher, timeouts: ServiceTimeouts) -> Self {
        Self {
            launcher,
            timeouts,
            session: Mutex::new(None),
        }
    }

    async fn page(&self) -> Result<Page> {
        let session = self.session.lock().await;
        session
            .as_ref()
            .map(|s| s.page.clone())
            .ok_or(PresenceError::ServiceNotInitialized)
    }
}

fn cdp_err(e: impl std::fmt::Display) -> PresenceError {
    PresenceError::CdpConnectionFailed(e.to_string())
}

#[async_trait]
impl PresenceService for SlackService {
    fn name(&self) -> &str {
        "Slack"
    }

    async fn init(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            debug!("Browser session already initialized");
            return Ok(());
        }

        let (_child, cdp_url) = self.launcher.launch_and_wait().await?;

        let (browser, mut handler) = Browser::connect(&cdp_url)
            .await
            .map_err(|e| cdp_err(format!("Failed to connect to browser: {e}")))?;

        // The handler multiplexes CDP events; it has to be polled for the
        // connection to make progress.
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let pages = browser.pages().await.map_err(cdp_err)?;
        let page = match pages.into_iter().next() {
            Some(page) => page,
            None => browser.new_page("about:blank").await.map_err(cdp_err)?,
        };

        *session = Some(Session {
            browser,
            page,
            handler_task,
        });
        info!("Browser session initialized");
        Ok(())
    }

    async fn load(&self, url: &str) -> Result<bool> {
        let page = self.page().await?;
        match page.goto(url).await {
            Ok(_) => Ok(true),
            Err(e) => {
                error!("Navigation to {} failed: {}", url, e);
                Ok(false)
            }
        }
    }

    async fn wait_loaded(&self, timeout: Option<Duration>) -> Result<bool> {
        let page = self.page().await?;
        let timeout = timeout.unwrap_or(self.timeouts.wait_load);
        let met = wait_for_condition(
            || {
                let page = page.clone();
                async move {
                    page.find_element(TOP_NAV_SELECTOR).await.is_ok()
                        && page.find_element(PRESENCE_SELECTOR).await.is_ok()
                }
            },
            Some(timeout),
            PROBE_POLL,
        )
        .await;
        Ok(met)
    }

    async fn wait_active(&self, timeout: Option<Duration>) -> Result<bool> {
        let page = self.page().await?;
        let timeout = timeout.unwrap_or(self.timeouts.wait_active);
        let met = wait_for_condition(
            || {
                let page = page.clone();
                async move { is_active(&page).await }
            },
            Some(timeout),
            PROBE_POLL,
        )
        .await;
        Ok(met)
    }

    async fn get_active_data(&self) -> Result<UserActiveData> {
        let page = self.page().await?;
        Ok(UserActiveData {
            avatar_urls: avatar_urls(&page).await,
            user_name: user_name(&page).await,
        })
    }

    async fn get_screenshot(&self) -> Result<Vec<u8>> {
        let page = self.page().await?;
        page.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build(),
        )
        .await
        .map_err(cdp_err)
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            if let Err(e) = session.browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            session.handler_task.abort();
            info!("Browser session closed");
        }
        Ok(())
    }
}

async fn is_active(page: &Page) -> bool {
    let js = format!(
        r#"!!document.querySelector("{PRESENCE_SELECTOR}")?.title?.toLowerCase()?.includes("active")"#
    );
    page.evaluate(js)
        .await
        .ok()
        .and_then(|result| result.into_value::<bool>().ok())
        .unwrap_or(false)
}

/// Best-effort scrape of the avatar image: `src` first, the first `srcset`
/// entry as the retina variant.
async fn avatar_urls(page: &Page) -> Vec<String> {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector("{AVATAR_SELECTOR}");
            if (!el) return [];
            const urls = [];
            const src = el.getAttribute('src');
            if (src) urls.push(src);
            const srcset = el.getAttribute('srcset');
            if (srcset) urls.push(srcset.split(/\s/)[0]);
            return urls;
        }})()"#
    );
    let urls: Vec<String> = page
        .evaluate(js)
        .await
        .ok()
        .and_then(|result| result.into_value().ok())
        .unwrap_or_default();
    debug!("Got avatar URLs: {:?}", urls);
    urls
}

/// The display name lives inside the user menu, which only exists in the DOM
/// after the avatar button has been clicked once.
async fn user_name(page: &Page) -> String {
    if let Some(name) = query_text(page, NAME_SELECTOR).await {
        return name;
    }

    debug!("User name not in DOM, opening the user menu");
    if let Ok(avatar) = page.find_element(AVATAR_SELECTOR).await {
        let _ = avatar.click().await;
        let found = wait_for_condition(
            || {
                let page = page.clone();
                async move { query_text(&page, NAME_SELECTOR).await.is_some() }
            },
            Some(Duration::from_secs(2)),
            PROBE_POLL,
        )
        .await;
        if found {
            if let Some(name) = query_text(page, NAME_SELECTOR).await {
                return name;
            }
        }
    }
    String::new()
}

async fn query_text(page: &Page, selector: &str) -> Option<String> {
    let js = format!(r#"document.querySelector("{selector}")?.innerHTML ?? null"#);
    page.evaluate(js)
        .await
        .ok()
        .and_then(|result| result.into_value::<Option<String>>().ok())
        .flatten()
        .filter(|s| !s.is_empty())
}
