//! Fallback poller: live updates when possible, interval polling otherwise
//!
//! A `LiveFeed` gives a consumer "the current list for this route, kept
//! fresh" without the consumer knowing whether updates arrive over the
//! shared realtime session or by re-fetching on a timer. Channel messages
//! only *trigger* a re-fetch; the REST endpoint stays the source of truth,
//! trading bandwidth for consistency.
//!
//! Mode selection, per route:
//! - route in the failure cache, realtime disabled by preference, or no
//!   session at all: interval polling from the start;
//! - otherwise wait (1 s checks) until the session authenticates, then
//!   subscribe to the route's channel.
//!
//! A fetch failure is swallowed here and surfaces as an empty list; this
//! layer's job is availability of some data, not error propagation.

use super::failures;
use super::session::{RealtimeSession, Subscription};
use crate::config::{SettingsStore, REALTIME_DISABLED_KEY};
use crate::constants;
use crate::errors::LiveError;
use crate::logger::{self, LogTag};
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Async data-fetch collaborator: returns the full current list
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>, LiveError>> + Send + Sync>;

/// Which delivery path a feed ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Initial fetch done, delivery path not yet decided
    Starting,
    /// Riding the shared session's channel
    Live,
    /// Fixed-interval re-fetching
    Polling,
}

/// Timing knobs; defaults are the deployment values
#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub poll_interval_ms: u64,
    pub status_poll_interval_ms: u64,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::POLL_INTERVAL_MS,
            status_poll_interval_ms: constants::STATUS_POLL_INTERVAL_MS,
        }
    }
}

impl FeedOptions {
    pub fn from_realtime(cfg: &crate::config::RealtimeConfig) -> Self {
        Self {
            poll_interval_ms: cfg.poll_interval_ms,
            status_poll_interval_ms: cfg.status_poll_interval_ms,
        }
    }
}

struct FeedInner<T> {
    route: String,
    fetcher: Fetcher<T>,
    data: watch::Sender<Vec<T>>,
    mode: RwLock<FeedMode>,
    subscription: Mutex<Option<Subscription>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<T> FeedInner<T> {
    fn set_mode(&self, mode: FeedMode) {
        *self.mode.write() = mode;
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Per-consumer feed handle. Exactly one delivery path is active at a
/// time; `stop()` (or drop) tears down whichever one it is.
pub struct LiveFeed<T: Clone + Send + Sync + 'static> {
    inner: Arc<FeedInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> LiveFeed<T> {
    /// Start a feed for `route`. Fetches immediately regardless of mode,
    /// then settles on live delivery or polling.
    pub fn start(
        route: &str,
        fetcher: Fetcher<T>,
        session: Option<Arc<RealtimeSession>>,
        settings: Arc<dyn SettingsStore>,
        options: FeedOptions,
    ) -> Self {
        let (data, _) = watch::channel(Vec::new());
        let inner = Arc::new(FeedInner {
            route: route.to_string(),
            fetcher,
            data,
            mode: RwLock::new(FeedMode::Starting),
            subscription: Mutex::new(None),
            driver: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        let driver_inner = Arc::clone(&inner);
        let driver = tokio::spawn(async move {
            drive(driver_inner, session, settings, options).await;
        });
        *inner.driver.lock() = Some(driver);

        Self { inner }
    }

    /// Route identifier this feed serves
    pub fn route(&self) -> &str {
        &self.inner.route
    }

    /// Latest data snapshot
    pub fn current(&self) -> Vec<T> {
        self.inner.data.borrow().clone()
    }

    /// Receiver that observes every data replacement
    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.inner.data.subscribe()
    }

    /// Delivery path currently active
    pub fn mode(&self) -> FeedMode {
        *self.inner.mode.read()
    }

    /// Tear down whichever delivery path is active: pending timers, the
    /// polling interval, and the shared-channel subscription. Idempotent.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(driver) = self.inner.driver.lock().take() {
            driver.abort();
        }
        // Dropping the subscription unsubscribes from the shared channel
        self.inner.subscription.lock().take();
        logger::debug(
            LogTag::Poller,
            &format!("Feed '{}' stopped", self.inner.route),
        );
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for LiveFeed<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drive<T: Clone + Send + Sync + 'static>(
    inner: Arc<FeedInner<T>>,
    session: Option<Arc<RealtimeSession>>,
    settings: Arc<dyn SettingsStore>,
    options: FeedOptions,
) {
    // Consumers see data before any realtime decision completes
    refresh(&inner).await;
    if inner.is_stopped() {
        return;
    }

    let realtime_disabled = settings.flag(REALTIME_DISABLED_KEY);
    let route_failed = failures::is_route_failed(&inner.route);

    let session = match session {
        Some(session) if !realtime_disabled && !route_failed => session,
        _ => {
            if realtime_disabled {
                logger::debug(
                    LogTag::Poller,
                    &format!("Feed '{}': realtime disabled by preference", inner.route),
                );
            } else if route_failed {
                logger::debug(
                    LogTag::Poller,
                    &format!("Feed '{}': route marked unusable, polling", inner.route),
                );
            }
            poll_loop(&inner, options.poll_interval_ms).await;
            return;
        }
    };

    // Wait for the session to authenticate before subscribing
    let status_interval = Duration::from_millis(options.status_poll_interval_ms);
    loop {
        if inner.is_stopped() {
            return;
        }
        if session.status().is_authenticated() {
            break;
        }
        tokio::time::sleep(status_interval).await;
    }

    // Every channel message triggers a re-fetch; the callback only nudges
    // this task so fetches never run inside the dispatch path
    let (note_tx, mut note_rx) = mpsc::unbounded_channel::<()>();
    let subscription = session.subscribe(&inner.route, move |_payload| {
        let _ = note_tx.send(());
    });
    *inner.subscription.lock() = Some(subscription);
    inner.set_mode(FeedMode::Live);
    logger::info(
        LogTag::Poller,
        &format!("Feed '{}' live via shared session", inner.route),
    );

    while note_rx.recv().await.is_some() {
        if inner.is_stopped() {
            return;
        }
        refresh(&inner).await;
    }
}

async fn poll_loop<T: Clone + Send + Sync + 'static>(inner: &Arc<FeedInner<T>>, interval_ms: u64) {
    inner.set_mode(FeedMode::Polling);
    logger::info(
        LogTag::Poller,
        &format!("Feed '{}' polling every {}ms", inner.route, interval_ms),
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The initial fetch already ran; skip the interval's immediate tick
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if inner.is_stopped() {
            return;
        }
        refresh(inner).await;
    }
}

async fn refresh<T: Clone + Send + Sync + 'static>(inner: &Arc<FeedInner<T>>) {
    match (inner.fetcher)().await {
        Ok(items) => {
            inner.data.send_replace(items);
        }
        Err(e) => {
            logger::warning(
                LogTag::Poller,
                &format!("Fetch for '{}' failed: {}", inner.route, e),
            );
            inner.data.send_replace(Vec::new());
        }
    }
}
