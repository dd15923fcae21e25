use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slack_presence::browser::BrowserLauncher;
use slack_presence::cli::Cli;
use slack_presence::config::{read_options, AppConfig};
use slack_presence::devtools::DevToolsService;
use slack_presence::error::Result;
use slack_presence::presence::notifier::PushoverNotifier;
use slack_presence::presence::service::{LoggingService, SlackService};
use slack_presence::presence::{LoopConfig, Notifier, PresenceLoop, ServiceTimeouts};
use slack_presence::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with filters to suppress noisy chromiumoxide errors
    // from CDP events the library doesn't recognize
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive("chromiumoxide::conn=warn".parse().expect("valid directive"))
            .add_directive(
                "chromiumoxide::handler=warn"
                    .parse()
                    .expect("valid directive"),
            )
    });
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let options = read_options(&config.options_file);
    info!("Options: {:?}", options);

    let launcher = BrowserLauncher::new(
        config.browser.executable.as_ref().map(PathBuf::from),
        &options.user_data_dir,
        config.browser.cdp_port,
        config.browser.headless,
    )?;
    let timeouts = ServiceTimeouts {
        wait_load: Duration::from_millis(config.timeouts.wait_load_ms),
        wait_active: Duration::from_millis(config.timeouts.wait_active_ms),
    };
    let service = Arc::new(LoggingService::new(SlackService::new(launcher, timeouts)));

    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    match PushoverNotifier::from_env() {
        Some(pushover) => {
            if pushover.validate().await {
                notifiers.push(Arc::new(pushover));
            } else {
                warn!("Pushover credentials failed validation; notifications disabled");
            }
        }
        None => info!("No Pushover credentials. Notifications disabled."),
    }

    let devtools = Arc::new(DevToolsService::new(
        config.server.host.clone(),
        config.browser.cdp_port,
    ));

    let presence = PresenceLoop::new(
        service,
        notifiers,
        devtools,
        options,
        config.options_file.clone(),
        LoopConfig {
            relogin_poll: Duration::from_millis(config.timeouts.relogin_poll_ms),
            relogin_probe_timeout: Duration::from_millis(config.timeouts.relogin_probe_timeout_ms),
            remote_url_base: config.server.remote_url_base.clone(),
        },
    );

    Arc::clone(&presence).start().await?;

    server::serve(
        Arc::clone(&presence),
        &config.server.host,
        config.server.port,
        async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        },
    )
    .await?;

    presence.close().await?;
    Ok(())
}
