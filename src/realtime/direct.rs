//! Legacy per-route dedicated socket feed
//!
//! Predates the shared session: each consumer opens its own socket at
//! `/ws/<route>/` instead of multiplexing channels. Kept because its
//! fallback semantics differ from `LiveFeed`: a dead route is promoted to
//! the process-wide failure cache immediately on abnormal closure, and a
//! normal closure ends the feed outright (an explicit user/server-initiated
//! end - no reconnect, no polling).

use super::endpoint;
use super::failures;
use super::poller::{FeedMode, Fetcher};
use super::session::SessionConfig;
use crate::config::{SettingsStore, REALTIME_DISABLED_KEY};
use crate::constants;
use crate::logger::{self, LogTag};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Timing and retry knobs for the dedicated socket path
#[derive(Debug, Clone)]
pub struct DirectOptions {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for DirectOptions {
    fn default() -> Self {
        Self {
            max_retries: constants::DIRECT_MAX_RETRIES,
            retry_delay_ms: constants::DIRECT_RETRY_DELAY_MS,
            connect_timeout_ms: constants::CONNECT_TIMEOUT_MS,
            poll_interval_ms: constants::POLL_INTERVAL_MS,
        }
    }
}

impl DirectOptions {
    pub fn from_realtime(cfg: &crate::config::RealtimeConfig) -> Self {
        Self {
            max_retries: cfg.direct_max_retries,
            retry_delay_ms: cfg.direct_retry_delay_ms,
            connect_timeout_ms: cfg.connect_timeout_ms,
            poll_interval_ms: cfg.poll_interval_ms,
        }
    }
}

/// Outcome of one socket lifetime
enum CloseOutcome {
    /// Code 1000: deliberate end, feed stops entirely
    Normal,
    /// Synthesized 1006 (reset/EOF/no close frame): route is dead
    NoRoute,
    /// Any other close code: worth a bounded retry
    Retryable,
}

struct DirectInner<T> {
    route: String,
    url: Option<String>,
    fetcher: Fetcher<T>,
    data: watch::Sender<Vec<T>>,
    mode: RwLock<FeedMode>,
    driver: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    options: DirectOptions,
}

impl<T> DirectInner<T> {
    fn set_mode(&self, mode: FeedMode) {
        *self.mode.write() = mode;
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Route-scoped feed over its own socket
pub struct DirectFeed<T: Clone + Send + Sync + 'static> {
    inner: Arc<DirectInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> DirectFeed<T> {
    pub fn start(
        cfg: &SessionConfig,
        route: &str,
        fetcher: Fetcher<T>,
        settings: Arc<dyn SettingsStore>,
        options: DirectOptions,
    ) -> Self {
        // An unresolvable endpoint is not fatal: the feed just polls
        let url = match endpoint::resolve_route_url(cfg, route) {
            Ok(url) => Some(url),
            Err(e) => {
                logger::warning(
                    LogTag::Direct,
                    &format!("Cannot resolve endpoint for '{}': {}", route, e),
                );
                None
            }
        };

        let (data, _) = watch::channel(Vec::new());
        let inner = Arc::new(DirectInner {
            route: route.to_string(),
            url,
            fetcher,
            data,
            mode: RwLock::new(FeedMode::Starting),
            driver: Mutex::new(None),
            stopped: AtomicBool::new(false),
            options,
        });

        let realtime_disabled = settings.flag(REALTIME_DISABLED_KEY);
        let driver_inner = Arc::clone(&inner);
        let driver = tokio::spawn(async move {
            drive(driver_inner, realtime_disabled).await;
        });
        *inner.driver.lock() = Some(driver);

        Self { inner }
    }

    pub fn route(&self) -> &str {
        &self.inner.route
    }

    pub fn current(&self) -> Vec<T> {
        self.inner.data.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.inner.data.subscribe()
    }

    pub fn mode(&self) -> FeedMode {
        *self.inner.mode.read()
    }

    /// Close the owned socket and cancel timers/intervals. Idempotent.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(driver) = self.inner.driver.lock().take() {
            driver.abort();
        }
        logger::debug(
            LogTag::Direct,
            &format!("Direct feed '{}' stopped", self.inner.route),
        );
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for DirectFeed<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drive<T: Clone + Send + Sync + 'static>(inner: Arc<DirectInner<T>>, realtime_disabled: bool) {
    refresh(&inner).await;
    if inner.is_stopped() {
        return;
    }

    let url = match &inner.url {
        Some(url) if !realtime_disabled && !failures::is_route_failed(&inner.route) => url.clone(),
        _ => {
            poll_loop(&inner).await;
            return;
        }
    };

    let connect_timeout = Duration::from_millis(inner.options.connect_timeout_ms);
    let mut retries = 0u32;

    loop {
        if inner.is_stopped() {
            return;
        }

        match timeout(connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                logger::info(
                    LogTag::Direct,
                    &format!("Direct feed '{}' connected: {}", inner.route, url),
                );
                inner.set_mode(FeedMode::Live);

                match pump_socket(&inner, ws).await {
                    CloseOutcome::Normal => {
                        logger::info(
                            LogTag::Direct,
                            &format!("Direct feed '{}' ended by server", inner.route),
                        );
                        return;
                    }
                    CloseOutcome::NoRoute => {
                        failures::mark_route_failed(&inner.route, "abnormal closure");
                        poll_loop(&inner).await;
                        return;
                    }
                    CloseOutcome::Retryable => {}
                }
            }
            Ok(Err(e)) => {
                logger::warning(
                    LogTag::Direct,
                    &format!("Direct feed '{}' connect failed: {}", inner.route, e),
                );
            }
            Err(_) => {
                logger::warning(
                    LogTag::Direct,
                    &format!("Direct feed '{}' connect timed out", inner.route),
                );
            }
        }

        retries += 1;
        if retries >= inner.options.max_retries {
            failures::mark_route_failed(&inner.route, "retries exhausted");
            poll_loop(&inner).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(inner.options.retry_delay_ms)).await;
    }
}

/// Read the socket until it closes; any text message triggers a re-fetch
async fn pump_socket<T: Clone + Send + Sync + 'static>(
    inner: &Arc<DirectInner<T>>,
    mut ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> CloseOutcome {
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Text(_text)) => {
                if inner.is_stopped() {
                    return CloseOutcome::Normal;
                }
                refresh(inner).await;
            }
            Ok(Message::Close(frame)) => {
                let code = frame
                    .map(|f| u16::from(f.code))
                    .unwrap_or(constants::CLOSE_ABNORMAL);
                logger::info(
                    LogTag::Direct,
                    &format!("Direct feed '{}' closed with code {}", inner.route, code),
                );
                return match code {
                    constants::CLOSE_NORMAL => CloseOutcome::Normal,
                    constants::CLOSE_ABNORMAL => CloseOutcome::NoRoute,
                    _ => CloseOutcome::Retryable,
                };
            }
            Ok(_) => {}
            Err(e) => {
                logger::warning(
                    LogTag::Direct,
                    &format!("Direct feed '{}' socket error: {}", inner.route, e),
                );
                return CloseOutcome::NoRoute;
            }
        }
    }
    // Stream ended without a close frame: the synthesized 1006 case
    CloseOutcome::NoRoute
}

async fn poll_loop<T: Clone + Send + Sync + 'static>(inner: &Arc<DirectInner<T>>) {
    inner.set_mode(FeedMode::Polling);
    logger::info(
        LogTag::Direct,
        &format!(
            "Direct feed '{}' polling every {}ms",
            inner.route, inner.options.poll_interval_ms
        ),
    );

    let mut ticker =
        tokio::time::interval(Duration::from_millis(inner.options.poll_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if inner.is_stopped() {
            return;
        }
        refresh(inner).await;
    }
}

async fn refresh<T: Clone + Send + Sync + 'static>(inner: &Arc<DirectInner<T>>) {
    match (inner.fetcher)().await {
        Ok(items) => {
            inner.data.send_replace(items);
        }
        Err(e) => {
            logger::warning(
                LogTag::Direct,
                &format!("Fetch for '{}' failed: {}", inner.route, e),
            );
            inner.data.send_replace(Vec::new());
        }
    }
}
