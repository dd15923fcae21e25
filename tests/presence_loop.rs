//! State machine tests of the presence loop against a scripted in-memory
//! service. Time is paused, so interval and recovery waits advance instantly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use slack_presence::config::{read_options, Options, OptionsPatch};
use slack_presence::devtools::DebugUrlProvider;
use slack_presence::error::{PresenceError, Result};
use slack_presence::presence::{
    LoopConfig, Notifier, NotifierUrl, PresenceEvent, PresenceLoop, PresenceService,
    PresenceStatus, UserActiveData,
};

const DEBUG_URL: &str = "http://localhost:9222/devtools/inspector.html";

#[derive(Clone, Copy)]
struct Script {
    load: bool,
    loaded: bool,
    active: bool,
}

struct MockService {
    script: Mutex<Script>,
    load_calls: AtomicUsize,
}

impl MockService {
    fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                load: false,
                loaded: false,
                active: false,
            }),
            load_calls: AtomicUsize::new(0),
        }
    }

    fn set(&self, load: bool, loaded: bool, active: bool) {
        *self.script.lock().unwrap() = Script {
            load,
            loaded,
            active,
        };
    }

    fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresenceService for MockService {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self, _url: &str) -> Result<bool> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.lock().unwrap().load)
    }

    async fn wait_loaded(&self, _timeout: Option<Duration>) -> Result<bool> {
        Ok(self.script.lock().unwrap().loaded)
    }

    async fn wait_active(&self, _timeout: Option<Duration>) -> Result<bool> {
        Ok(self.script.lock().unwrap().active)
    }

    async fn get_active_data(&self) -> Result<UserActiveData> {
        Ok(UserActiveData {
            avatar_urls: vec![
                "https://avatars.example/jane-32.png".to_string(),
                "https://avatars.example/jane-64.png".to_string(),
            ],
            user_name: "Jane Doe".to_string(),
        })
    }

    async fn get_screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    delivered: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    fn count(&self, title: &str) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == title)
            .count()
    }

    fn had_image(&self, title: &str) -> bool {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .any(|(t, image)| t == title && *image)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        title: &str,
        _message: &str,
        image: Option<&[u8]>,
        _link: Option<&NotifierUrl>,
    ) {
        self.delivered
            .lock()
            .unwrap()
            .push((title.to_string(), image.is_some()));
    }
}

struct StaticDebugUrl;

#[async_trait]
impl DebugUrlProvider for StaticDebugUrl {
    async fn debug_url(&self) -> Option<String> {
        Some(DEBUG_URL.to_string())
    }
}

struct Harness {
    presence: Arc<PresenceLoop>,
    service: Arc<MockService>,
    notifier: Arc<RecordingNotifier>,
    options_path: PathBuf,
    _dir: tempfile::TempDir,
}

fn harness(options: Options) -> (Harness, broadcast::Receiver<PresenceEvent>) {
    let dir = tempfile::tempdir().unwrap();
    let options_path = dir.path().join("options.json");
    let service = Arc::new(MockService::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let presence = PresenceLoop::new(
        service.clone(),
        vec![notifier.clone() as Arc<dyn Notifier>],
        Arc::new(StaticDebugUrl),
        options,
        options_path.clone(),
        LoopConfig::default(),
    );
    let events = presence.subscribe();

    (
        Harness {
            presence,
            service,
            notifier,
            options_path,
            _dir: dir,
        },
        events,
    )
}

fn unscheduled(enabled: bool) -> Options {
    Options {
        enabled,
        start: None,
        end: None,
        ..Default::default()
    }
}

async fn await_status(
    events: &mut broadcast::Receiver<PresenceEvent>,
    pred: impl Fn(&PresenceStatus) -> bool,
) -> PresenceStatus {
    timeout(Duration::from_secs(3600), async {
        loop {
            match events.recv().await {
                Ok(PresenceEvent::Status(status)) if pred(&status) => return status,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("expected status never emitted")
}

async fn await_condition(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(3600), async {
        while !condition() {
            sleep(Duration::from_secs(1)).await;
        }
    })
    .await
    .expect("condition never met");
}

// Scenario: disabled with a configured schedule settles in outOfSchedule
// carrying the next weekday start instant.
#[tokio::test(start_paused = true)]
async fn disabled_with_schedule_settles_out_of_schedule() {
    let (h, mut events) = harness(Options::default());
    h.presence.clone().start().await.unwrap();

    let status = await_status(&mut events, |s| {
        matches!(s, PresenceStatus::OutOfSchedule { .. })
    })
    .await;

    let PresenceStatus::OutOfSchedule { start_iso_time } = status else {
        unreachable!();
    };
    let next = start_iso_time.expect("schedule is configured");
    assert!(next.weekday().number_from_monday() <= 5);
    assert_eq!((next.hour(), next.minute(), next.second()), (9, 0, 0));
    assert_eq!(h.service.load_calls(), 0);
}

// Scenario: everything succeeds; status becomes active and the "presence
// started" notification fires exactly once across poll cycles.
#[tokio::test(start_paused = true)]
async fn active_loop_notifies_started_once() {
    let (h, mut events) = harness(unscheduled(true));
    h.service.set(true, true, true);
    h.presence.clone().start().await.unwrap();

    let status = await_status(&mut events, |s| {
        matches!(s, PresenceStatus::Active { .. })
    })
    .await;

    let PresenceStatus::Active {
        name,
        avatar_url,
        avatar_url_2x,
        end_iso_time,
    } = status
    else {
        unreachable!();
    };
    assert_eq!(name.as_deref(), Some("Jane Doe"));
    assert_eq!(
        avatar_url.as_deref(),
        Some("https://avatars.example/jane-32.png")
    );
    assert_eq!(
        avatar_url_2x.as_deref(),
        Some("https://avatars.example/jane-64.png")
    );
    assert_eq!(end_iso_time, None);

    let service = h.service.clone();
    await_condition(move || service.load_calls() >= 3).await;
    assert_eq!(h.notifier.count("Slack presence started"), 1);
}

// Scenario: the shell never renders; the loop disables itself, reports
// needsReLogin with the DevTools link and notifies once per transition.
#[tokio::test(start_paused = true)]
async fn wait_loaded_failure_enters_needs_re_login() {
    let (h, mut events) = harness(unscheduled(true));
    h.service.set(true, false, false);
    h.presence.clone().start().await.unwrap();

    let status = await_status(&mut events, |s| {
        matches!(s, PresenceStatus::NeedsReLogin { .. })
    })
    .await;

    let PresenceStatus::NeedsReLogin {
        devtools_frontend_url,
    } = status
    else {
        unreachable!();
    };
    assert_eq!(devtools_frontend_url.as_deref(), Some(DEBUG_URL));
    assert!(!h.presence.options().enabled);

    // Let the recovery poll spin for a while; the notification must not
    // repeat per attempt.
    sleep(Duration::from_secs(30)).await;
    assert_eq!(h.notifier.count("Re-login to Slack"), 1);
    assert!(h.notifier.had_image("Re-login to Slack"));
}

// Scenario: an external enabled=true during the recovery wait is observed
// within one polling interval and brings the loop back to loading.
#[tokio::test(start_paused = true)]
async fn external_enable_resumes_from_recovery() {
    let (h, mut events) = harness(unscheduled(true));
    h.service.set(true, false, false);
    h.presence.clone().start().await.unwrap();

    await_status(&mut events, |s| {
        matches!(s, PresenceStatus::NeedsReLogin { .. })
    })
    .await;

    h.presence
        .save_options(OptionsPatch {
            enabled: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();

    await_status(&mut events, |s| matches!(s, PresenceStatus::Loading)).await;
}

// Scenario: navigation fails outright; enabled flips off, status becomes
// failedToLoad and the notification carries a screenshot.
#[tokio::test(start_paused = true)]
async fn load_failure_disables_and_notifies_with_screenshot() {
    let (h, mut events) = harness(unscheduled(true));
    h.service.set(false, false, false);
    h.presence.clone().start().await.unwrap();

    await_status(&mut events, |s| matches!(s, PresenceStatus::FailedToLoad)).await;

    assert!(!h.presence.options().enabled);
    assert_eq!(h.notifier.count("Failed to load Slack"), 1);
    assert!(h.notifier.had_image("Failed to load Slack"));
    // One navigation attempt, then the loop parked itself.
    assert_eq!(h.service.load_calls(), 1);
}

// Once the page looks logged in again, the loop re-enables itself and says so.
#[tokio::test(start_paused = true)]
async fn recovery_auto_detects_re_login() {
    let (h, mut events) = harness(unscheduled(true));
    h.service.set(true, false, false);
    h.presence.clone().start().await.unwrap();

    await_status(&mut events, |s| {
        matches!(s, PresenceStatus::NeedsReLogin { .. })
    })
    .await;

    h.service.set(true, true, true);
    await_status(&mut events, |s| {
        matches!(s, PresenceStatus::Active { .. })
    })
    .await;

    assert!(h.presence.options().enabled);
    assert_eq!(h.notifier.count("Slack presence restarted"), 1);
}

// Disabling without a schedule yields inactive, never outOfSchedule, and
// fires the stopped notification.
#[tokio::test(start_paused = true)]
async fn disable_without_schedule_yields_inactive() {
    let (h, mut events) = harness(unscheduled(true));
    h.service.set(true, true, true);
    h.presence.clone().start().await.unwrap();

    await_status(&mut events, |s| {
        matches!(s, PresenceStatus::Active { .. })
    })
    .await;

    h.presence
        .save_options(OptionsPatch {
            enabled: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();

    await_status(&mut events, |s| matches!(s, PresenceStatus::Inactive)).await;
    assert_eq!(h.notifier.count("Slack presence stopped"), 1);
}

// A schedule change that leaves the displayed metadata identical must not
// produce a duplicate status event.
#[tokio::test(start_paused = true)]
async fn unchanged_status_is_not_re_emitted() {
    let (h, mut events) = harness(Options::default());
    h.presence.clone().start().await.unwrap();

    await_status(&mut events, |s| {
        matches!(s, PresenceStatus::OutOfSchedule { .. })
    })
    .await;

    // Moves the end edge only; the recomputed outOfSchedule payload equals
    // the current one, so only the options event may be emitted.
    h.presence
        .save_options(OptionsPatch {
            end: Some(Some("19:00".to_string())),
            ..Default::default()
        })
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(3600), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        PresenceEvent::Options(options) => {
            assert_eq!(options.end.as_deref(), Some("19:00"));
        }
        PresenceEvent::Status(status) => {
            panic!("unexpected status event: {status:?}");
        }
    }
}

// The persisted file reflects the defaults deep-merged with every applied
// patch, in call order.
#[tokio::test]
async fn persisted_file_reflects_patches_in_order() {
    let (h, _events) = harness(Options::default());

    h.presence
        .save_options(OptionsPatch {
            interval_minutes: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    h.presence
        .save_options(OptionsPatch {
            slack_url: Some("https://my-team.slack.com".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    h.presence
        .save_options(OptionsPatch {
            enabled: Some(true),
            interval_minutes: Some(7),
            ..Default::default()
        })
        .await
        .unwrap();

    let expected = Options {
        enabled: true,
        interval_minutes: 7,
        slack_url: "https://my-team.slack.com".to_string(),
        ..Default::default()
    };
    assert_eq!(h.presence.options(), expected);
    assert_eq!(read_options(&h.options_path), expected);
}

// A patch equal to the current options is a no-op: no persistence, no event.
#[tokio::test]
async fn equal_patch_is_a_no_op() {
    let (h, mut events) = harness(Options::default());

    h.presence
        .save_options(OptionsPatch::default())
        .await
        .unwrap();
    h.presence
        .save_options(OptionsPatch {
            interval_minutes: Some(2),
            start: Some(Some("09:00".to_string())),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(!h.options_path.exists());
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

// Invalid values are rejected at the mutation entry point and leave no trace.
#[tokio::test]
async fn invalid_patch_is_rejected() {
    let (h, mut events) = harness(Options::default());

    let result = h
        .presence
        .save_options(OptionsPatch {
            interval_minutes: Some(0),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(PresenceError::InvalidOption(_))));

    let result = h
        .presence
        .save_options(OptionsPatch {
            slack_url: Some("https://not-slack.example".to_string()),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(PresenceError::InvalidOption(_))));

    assert_eq!(h.presence.options(), Options::default());
    assert!(!h.options_path.exists());
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

// Every accepted mutation emits exactly one options event.
#[tokio::test]
async fn each_change_emits_one_options_event() {
    let (h, mut events) = harness(Options::default());

    h.presence
        .save_options(OptionsPatch {
            interval_minutes: Some(3),
            ..Default::default()
        })
        .await
        .unwrap();
    h.presence
        .save_options(OptionsPatch {
            interval_minutes: Some(4),
            ..Default::default()
        })
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PresenceEvent::Options(options) = event {
            seen.push(options.interval_minutes);
        }
    }
    assert_eq!(seen, vec![3, 4]);
}
