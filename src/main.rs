use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use unilive::api::PortalApi;
use unilive::arguments;
use unilive::config::{self, EnvSettings, SettingsStore};
use unilive::logger::{self, LogTag};
use unilive::realtime::{FeedOptions, LiveFeed, RealtimeSession, SessionConfig};

/// Main entry point for the unilive monitor
///
/// Loads configuration, builds the shared realtime session, then:
/// - subscribes to every --channel given on the command line
/// - starts a fallback-polling feed for every --route
/// and logs status transitions and traffic until Ctrl-C.
#[tokio::main]
async fn main() -> Result<()> {
    logger::init();

    if arguments::is_help_requested() {
        print_help();
        return Ok(());
    }

    logger::info(LogTag::System, "unilive starting up");

    config::load_config().map_err(|e| anyhow!("failed to load config: {}", e))?;
    let cfg = config::get_config_clone();

    let settings: Arc<dyn SettingsStore> = Arc::new(EnvSettings);

    // Master switch: with realtime off, every feed polls and channel
    // subscriptions have nothing to ride on
    let session = if cfg.realtime.enabled {
        Some(RealtimeSession::new(
            SessionConfig::from_config(&cfg),
            Arc::clone(&settings),
        ))
    } else {
        logger::warning(LogTag::System, "Realtime disabled in config, polling only");
        None
    };

    let mut observers = Vec::new();
    let mut subscriptions = Vec::new();
    if let Some(session) = &session {
        observers.push(session.on_status_change(|state| {
            logger::info(LogTag::Realtime, &format!("Connection state: {}", state));
        }));
        observers.push(session.on_channel_list_change(|channels| {
            logger::info(
                LogTag::Channels,
                &format!("Server channels: {:?}", channels),
            );
        }));

        for channel in arguments::get_arg_values("--channel") {
            logger::info(LogTag::Channels, &format!("Subscribing to '{}'", channel));
            let name = channel.clone();
            subscriptions.push(session.subscribe(&channel, move |payload| {
                logger::info(LogTag::Channels, &format!("[{}] {}", name, payload));
            }));
        }
    } else if !arguments::get_arg_values("--channel").is_empty() {
        logger::warning(
            LogTag::Channels,
            "--channel ignored: realtime is disabled in config",
        );
    }

    let mut feeds = Vec::new();
    let routes = arguments::get_arg_values("--route");
    if !routes.is_empty() {
        let api = PortalApi::from_config(&cfg).context("cannot build API client")?;

        for route in routes {
            logger::info(LogTag::Poller, &format!("Starting feed for '{}'", route));
            let feed = LiveFeed::start(
                &route,
                api.fetcher(&route),
                session.clone(),
                Arc::clone(&settings),
                FeedOptions::from_realtime(&cfg.realtime),
            );

            let mut updates = feed.watch();
            let route_name = route.clone();
            tokio::spawn(async move {
                while updates.changed().await.is_ok() {
                    let count = updates.borrow().len();
                    logger::info(
                        LogTag::Poller,
                        &format!("Feed '{}' now holds {} item(s)", route_name, count),
                    );
                }
            });
            feeds.push(feed);
        }
    }

    // Run until Ctrl-C
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let shutdown_trigger = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        shutdown_trigger.notify_one();
    })
    .context("cannot install Ctrl-C handler")?;
    shutdown.notified().await;

    logger::info(LogTag::System, "Shutting down");
    for feed in &feeds {
        feed.stop();
    }
    drop(subscriptions);
    drop(observers);
    if let Some(session) = &session {
        session.disconnect();
    }
    Ok(())
}

fn print_help() {
    println!("unilive - realtime monitor for the UniHub portal\n");
    println!("Usage: unilive [OPTIONS]\n");
    println!("Options:");
    println!("  --channel <name>      Subscribe to a realtime channel (repeatable)");
    println!("  --route <route>       Start a fallback-polling feed for a route (repeatable)");
    println!("  --debug-<module>      Enable debug logs for a module");
    println!("                        (realtime, channels, poller, direct, api)");
    println!("  --verbose             Enable verbose logs everywhere");
    println!("  --quiet               Warnings and errors only");
    println!("  --help                Show this help message");
    println!();
    println!("Configuration is read from data/config.toml; the auth token from");
    println!("the PORTAL_AUTH_TOKEN environment variable.");
}
