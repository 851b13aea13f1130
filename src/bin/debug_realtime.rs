/// Realtime Debug Tool - connection diagnostics for the portal endpoint
///
/// Walks the whole connection lifecycle step by step:
/// - resolves the realtime endpoint from config/environment
/// - connects and authenticates (token from PORTAL_AUTH_TOKEN, else public mode)
/// - optionally subscribes to a channel and counts traffic
/// - prints the session's diagnostic buffers at the end
///
/// Usage:
///   cargo run --bin debug_realtime
///   cargo run --bin debug_realtime -- --duration 60
///   cargo run --bin debug_realtime -- --channel reports
use colored::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use unilive::arguments;
use unilive::config::{self, EnvSettings, SettingsStore, AUTH_TOKEN_KEY};
use unilive::logger;
use unilive::realtime::{endpoint, ConnectionState, RealtimeSession, SessionConfig};

fn print_header(title: &str) {
    println!("\n{}", "=".repeat(72).dimmed());
    println!("  {}", title.bold());
    println!("{}\n", "=".repeat(72).dimmed());
}

fn print_step(step: &str, status: &str) {
    let marker = match status {
        "OK" => "[ OK ]".green().bold(),
        "FAIL" => "[FAIL]".red().bold(),
        "WARN" => "[WARN]".yellow().bold(),
        _ => "[....]".dimmed(),
    };
    println!("{} {}", marker, step);
}

#[tokio::main]
async fn main() {
    logger::init();
    print_header("REALTIME DEBUG TOOL - CONNECTION DIAGNOSTICS");

    let duration: u64 = arguments::get_arg_value("--duration")
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let channel = arguments::get_arg_value("--channel");

    if arguments::is_help_requested() {
        println!("Usage: cargo run --bin debug_realtime [OPTIONS]\n");
        println!("Options:");
        println!("  --duration <seconds>    Duration to monitor (default: 30)");
        println!("  --channel <name>        Channel to subscribe to");
        println!("  --help                  Show this help message");
        return;
    }

    // Step 1: configuration and endpoint resolution
    print_step("Loading configuration", "....");
    if let Err(e) = config::load_config() {
        print_step(&format!("Failed to load config: {}", e), "FAIL");
        return;
    }
    let cfg = config::get_config_clone();
    let session_cfg = SessionConfig::from_config(&cfg);
    print_step(&format!("Portal URL: {}", session_cfg.portal_url), "OK");

    match endpoint::resolve_ws_url(&session_cfg, 1) {
        Ok(url) => print_step(&format!("Realtime endpoint: {}", url), "OK"),
        Err(e) => {
            print_step(&format!("Endpoint unresolvable: {}", e), "FAIL");
            return;
        }
    }

    let settings: Arc<dyn SettingsStore> = Arc::new(EnvSettings);
    match settings.get(AUTH_TOKEN_KEY) {
        Some(_) => print_step("Auth token found, authenticating with credential", "OK"),
        None => print_step("No auth token, using public mode", "WARN"),
    }

    // Step 2: connect and authenticate
    print_header("CONNECTING");
    let session = RealtimeSession::new(session_cfg, settings);
    let _observer = session.on_status_change(|state| {
        println!("       state -> {}", state.to_string().cyan());
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    let outcome = loop {
        let state = session.status();
        if state == ConnectionState::Authenticated || state.is_terminal() {
            break state;
        }
        if tokio::time::Instant::now() > deadline {
            break state;
        }
        sleep(Duration::from_millis(50)).await;
    };

    match outcome {
        ConnectionState::Authenticated => print_step("Authenticated", "OK"),
        ConnectionState::AuthFailed => {
            print_step("Authentication rejected - check PORTAL_AUTH_TOKEN", "FAIL")
        }
        other => print_step(&format!("Stuck in state '{}'", other), "FAIL"),
    }

    let channels = session.supported_channels();
    if channels.is_empty() {
        print_step("Server declared no channels", "WARN");
    } else {
        print_step(&format!("Server channels: {:?}", channels), "OK");
    }

    // Step 3: optional channel subscription
    let received = Arc::new(AtomicU32::new(0));
    let _subscription = channel.as_ref().map(|name| {
        print_header("SUBSCRIBING");
        if !session.is_channel_supported(name) {
            print_step(
                &format!("Channel '{}' not in the server's list, trying anyway", name),
                "WARN",
            );
        }
        let counter = Arc::clone(&received);
        let label = name.clone();
        let subscription = session.subscribe(name, move |payload| {
            counter.fetch_add(1, Ordering::SeqCst);
            println!("       [{}] {}", label, payload);
        });
        print_step(&format!("Subscribed to '{}'", name), "OK");
        subscription
    });

    // Step 4: monitor
    print_header(&format!("MONITORING FOR {}s", duration));
    sleep(Duration::from_secs(duration)).await;

    // Step 5: final statistics from the session's own diagnostics
    print_header("FINAL STATISTICS");
    let info = session.debug_info();
    println!("Connection attempts:  {}", info.attempts.len());
    println!("Connection events:    {}", info.events.len());
    println!("Messages recorded:    {}", info.history.len());
    if let Some(channel) = &channel {
        println!(
            "Channel '{}' msgs:    {}",
            channel,
            received.load(Ordering::SeqCst)
        );
    }
    match &info.last_error {
        Some(error) => println!(
            "Last error:           {} ({})",
            error.message,
            error.detail.as_deref().unwrap_or("no detail")
        ),
        None => println!("Last error:           none"),
    }
    println!("Final state:          {}", session.status());

    session.disconnect();
    print_step("Disconnected", "OK");
    println!();
}
