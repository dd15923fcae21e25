use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{write_options, Options, OptionsPatch};
use crate::devtools::DebugUrlProvider;
use crate::error::Result;
use crate::presence::schedule::{Schedule, ScheduleEdge};
use crate::presence::types::{
    Notifier, NotifierUrl, PresenceEvent, PresenceService, PresenceStatus, UserActiveData,
};
use crate::util::wait_for_condition;

const IDLE_POLL: Duration = Duration::from_secs(1);
const ENABLED_POLL: Duration = Duration::from_millis(200);
const EVENT_CAPACITY: usize = 16;

/// Timing knobs and notification plumbing for the loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Interval of the indefinite re-login recovery poll.
    pub relogin_poll: Duration,
    /// Per-attempt probe budget inside the recovery poll.
    pub relogin_probe_timeout: Duration,
    /// Externally reachable base URL of this server, attached to
    /// notifications as a link when set.
    pub remote_url_base: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            relogin_poll: Duration::from_millis(500),
            relogin_probe_timeout: Duration::from_secs(1),
            remote_url_base: None,
        }
    }
}

/// The presence orchestration loop.
///
/// Owns the current [`Options`] and [`PresenceStatus`] snapshots, the
/// schedule, the presence service and the notifiers. All mutation goes
/// through [`save_options`](Self::save_options); the main loop, the schedule
/// triggers and the control surface never touch state any other way.
pub struct PresenceLoop {
    service: Arc<dyn PresenceService>,
    notifiers: Vec<Arc<dyn Notifier>>,
    devtools: Arc<dyn DebugUrlProvider>,
    schedule: Schedule,
    schedule_rx: Mutex<Option<mpsc::UnboundedReceiver<ScheduleEdge>>>,
    config: LoopConfig,
    options_path: PathBuf,

    options: RwLock<Options>,
    status: RwLock<PresenceStatus>,
    /// Serializes mutations; the snapshot locks above are only held for
    /// reads and whole-value writes.
    mutation: Mutex<()>,
    events: broadcast::Sender<PresenceEvent>,
    started: AtomicBool,
    /// Whether the "presence started" notification already fired for the
    /// current enable cycle.
    started_notified: AtomicBool,
}

impl PresenceLoop {
    pub fn new(
        service: Arc<dyn PresenceService>,
        notifiers: Vec<Arc<dyn Notifier>>,
        devtools: Arc<dyn DebugUrlProvider>,
        options: Options,
        options_path: PathBuf,
        config: LoopConfig,
    ) -> Arc<Self> {
        if options.start.is_some() != options.end.is_some() {
            warn!("Only one of start/end schedule times is set; the missing edge is disabled");
        }

        let (schedule, schedule_rx) =
            Schedule::new(options.start.as_deref(), options.end.as_deref());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!("Presence loop created; status: inactive");
        Arc::new(Self {
            service,
            notifiers,
            devtools,
            schedule,
            schedule_rx: Mutex::new(Some(schedule_rx)),
            config,
            options_path,
            options: RwLock::new(options),
            status: RwLock::new(PresenceStatus::Inactive),
            mutation: Mutex::new(()),
            events,
            started: AtomicBool::new(false),
            started_notified: AtomicBool::new(false),
        })
    }

    /// Current options snapshot.
    pub fn options(&self) -> Options {
        self.options.read().expect("options lock poisoned").clone()
    }

    /// Current status snapshot.
    pub fn status(&self) -> PresenceStatus {
        self.status.read().expect("status lock poisoned").clone()
    }

    /// Subscribe to status/options change events. No replay: new subscribers
    /// should pull the current snapshots themselves.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    /// Initializes the service and launches the main loop. The loop is
    /// spawned exactly once per process lifetime; later calls are no-ops.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Presence loop already started");
            return Ok(());
        }

        self.service.init().await?;

        // Schedule triggers reach the loop through the same mutation entry
        // point as every other caller.
        if let Some(mut rx) = self.schedule_rx.lock().await.take() {
            let loop_ref = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(edge) = rx.recv().await {
                    loop_ref.on_schedule_edge(edge).await;
                }
            });
        }

        tokio::spawn(async move { self.run().await });
        Ok(())
    }

    /// Releases the browser session. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.service.close().await
    }

    /// Merges `patch` over the current options, persists the result and
    /// applies side effects. A patch that changes nothing is a no-op: no
    /// persistence, no event.
    pub async fn save_options(&self, patch: OptionsPatch) -> Result<()> {
        let _guard = self.mutation.lock().await;

        let prev = self.options();
        let merged = prev.merged(&patch);
        if merged == prev {
            info!("Nothing to do, new options are equal to previous options");
            return Ok(());
        }
        merged.validate()?;

        if merged.start != prev.start || merged.end != prev.end {
            if self
                .schedule
                .reschedule(merged.start.as_deref(), merged.end.as_deref())
            {
                match self.status() {
                    PresenceStatus::OutOfSchedule { .. } => {
                        self.set_status(PresenceStatus::OutOfSchedule {
                            start_iso_time: self.schedule.next_start(),
                        });
                    }
                    PresenceStatus::Active {
                        name,
                        avatar_url,
                        avatar_url_2x,
                        ..
                    } => {
                        self.set_status(PresenceStatus::Active {
                            name,
                            avatar_url,
                            avatar_url_2x,
                            end_iso_time: self.schedule.next_end(),
                        });
                    }
                    _ => {}
                }
            }
        }

        *self.options.write().expect("options lock poisoned") = merged.clone();
        write_options(&self.options_path, &merged)?;

        if prev.enabled && !merged.enabled {
            info!("Loop stopped");
            self.notify(
                "Slack presence stopped",
                "Stopping to appear online on Slack.",
                false,
                None,
            )
            .await;
        }
        if !prev.enabled && merged.enabled {
            self.started_notified.store(false, Ordering::SeqCst);
        }

        let _ = self.events.send(PresenceEvent::Options(merged));
        Ok(())
    }

    async fn on_schedule_edge(&self, edge: ScheduleEdge) {
        let patch = match edge {
            ScheduleEdge::Start => {
                info!("[schedule] Presence enabled");
                OptionsPatch {
                    enabled: Some(true),
                    ..Default::default()
                }
            }
            ScheduleEdge::End => {
                info!("[schedule] Presence disabled");
                OptionsPatch {
                    enabled: Some(false),
                    ..Default::default()
                }
            }
        };
        if let Err(e) = self.save_options(patch).await {
            error!("Failed to apply schedule trigger: {}", e);
        }
    }

    async fn run(&self) {
        loop {
            if let Err(e) = self.run_pass().await {
                error!("Unexpected presence loop error: {}", e);
                self.notify(
                    "Slack presence failed",
                    &format!("Unexpected error occurred: {e}. Exiting."),
                    false,
                    None,
                )
                .await;
                std::process::exit(1);
            }
        }
    }

    /// One full pass of the state machine: the enabled loop, the idle-gate
    /// status recompute and the wait for re-enable. Service/environment
    /// errors propagate to [`run`], which treats them as fatal.
    async fn run_pass(&self) -> Result<()> {
        while self.options().enabled {
            self.set_status(PresenceStatus::Loading);

            let url = self.options().slack_url;
            if !self.service.load(&url).await? {
                self.react_with_failed().await?;
                break;
            }
            if !self.service.wait_loaded(None).await? {
                self.react_with_needs_re_login().await?;
                break;
            }
            if !self.service.wait_active(None).await? {
                self.react_with_needs_re_login().await?;
                break;
            }

            self.react_with_active().await?;

            let interval = Duration::from_secs(u64::from(self.options().interval_minutes) * 60);
            info!("Waiting {:?} until the next presence check...", interval);
            let this = self;
            wait_for_condition(
                move || async move { !this.options().enabled },
                Some(interval),
                ENABLED_POLL,
            )
            .await;
        }

        // The enable flag is down: never silently stay "active".
        match self.status() {
            PresenceStatus::Inactive | PresenceStatus::Active { .. } => {
                if self.options().start.is_some() {
                    self.set_status(PresenceStatus::OutOfSchedule {
                        start_iso_time: self.schedule.next_start(),
                    });
                } else {
                    self.set_status(PresenceStatus::Inactive);
                }
            }
            _ => {}
        }

        let this = self;
        wait_for_condition(
            move || async move { this.options().enabled },
            None,
            IDLE_POLL,
        )
        .await;

        info!("Loop starting...");
        Ok(())
    }

    async fn react_with_failed(&self) -> Result<()> {
        self.disable().await?;
        self.notify(
            "Failed to load Slack",
            "Slack presence failed to load your Slack workspace.",
            true,
            None,
        )
        .await;
        self.set_status(PresenceStatus::FailedToLoad);
        Ok(())
    }

    async fn react_with_needs_re_login(&self) -> Result<()> {
        self.disable().await?;

        let devtools_frontend_url = self.devtools.debug_url().await;
        self.set_status(PresenceStatus::NeedsReLogin {
            devtools_frontend_url,
        });

        self.notify(
            "Re-login to Slack",
            "Slack presence failed to load your Slack workspace. \
             Please open the app and re-login to Slack manually there.",
            true,
            self.remote_url("/", "Open Slack presence"),
        )
        .await;

        self.wait_for_re_login().await
    }

    /// Indefinite recovery wait: probe the page with short budgets until the
    /// session looks logged in again (auto re-enable) or someone re-enables
    /// the loop externally. Deliberately unbounded; it is waiting for a
    /// human.
    async fn wait_for_re_login(&self) -> Result<()> {
        info!("Waiting for re-login or re-enable...");
        let probe = Some(self.config.relogin_probe_timeout);
        loop {
            let loaded = self.service.wait_loaded(probe).await?;
            let active = loaded && self.service.wait_active(probe).await?;
            if loaded && active {
                self.enable().await?;
                self.notify(
                    "Slack presence restarted",
                    "Slack presence has managed to log in to Slack again.",
                    true,
                    None,
                )
                .await;
                return Ok(());
            }
            if self.options().enabled {
                // Re-enabled externally; resume the full sequence.
                return Ok(());
            }
            tokio::time::sleep(self.config.relogin_poll).await;
        }
    }

    async fn react_with_active(&self) -> Result<()> {
        let UserActiveData {
            avatar_urls,
            user_name,
        } = self.service.get_active_data().await?;

        let mut urls = avatar_urls.into_iter();
        self.set_status(PresenceStatus::Active {
            name: Some(user_name).filter(|name| !name.is_empty()),
            avatar_url: urls.next(),
            avatar_url_2x: urls.next(),
            end_iso_time: self.schedule.next_end(),
        });

        if !self.started_notified.swap(true, Ordering::SeqCst) {
            let options = self.options();
            let window = match (&options.start, &options.end) {
                (Some(start), Some(end)) => format!(" from {start} to {end}"),
                _ => String::new(),
            };
            self.notify(
                "Slack presence started",
                &format!(
                    "Starting to appear online on Slack at {}{}.",
                    options.slack_url, window
                ),
                false,
                None,
            )
            .await;
        }
        Ok(())
    }

    async fn enable(&self) -> Result<()> {
        self.save_options(OptionsPatch {
            enabled: Some(true),
            ..Default::default()
        })
        .await
    }

    async fn disable(&self) -> Result<()> {
        self.save_options(OptionsPatch {
            enabled: Some(false),
            ..Default::default()
        })
        .await
    }

    /// Replaces the status if it actually changed; consecutive identical
    /// statuses never produce two events.
    fn set_status(&self, status: PresenceStatus) {
        {
            let mut current = self.status.write().expect("status lock poisoned");
            if *current == status {
                debug!("Status unchanged: {}", status.kind());
                return;
            }
            info!("Status change: {} -> {}", current.kind(), status.kind());
            *current = status.clone();
        }
        let _ = self.events.send(PresenceEvent::Status(status));
    }

    /// Fans a notification out to every registered notifier concurrently and
    /// awaits settlement; outcomes never feed back into loop control flow.
    async fn notify(&self, title: &str, message: &str, screenshot: bool, link: Option<NotifierUrl>) {
        if self.notifiers.is_empty() {
            return;
        }

        let image = if screenshot {
            match self.service.get_screenshot().await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Screenshot for notification failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let image = image.as_deref();
        let link = link.as_ref();
        join_all(
            self.notifiers
                .iter()
                .map(|notifier| notifier.notify(title, message, image, link)),
        )
        .await;
    }

    fn remote_url(&self, path: &str, title: &str) -> Option<NotifierUrl> {
        self.config
            .remote_url_base
            .as_ref()
            .map(|base| NotifierUrl {
                url: format!("{base}{path}"),
                url_title: title.to_string(),
            })
    }
}
