//! The realtime session: one socket, one state machine
//!
//! `RealtimeSession` owns at most one live WebSocket at a time and drives
//! it through connect -> authenticate -> dispatch -> close/retry. Channel
//! subscriptions are multiplexed over the single socket and replayed after
//! every successful (re)authentication, so consumers subscribe once and
//! survive reconnects for free.
//!
//! The session is constructed once at application start and injected into
//! consumers. It auto-connects on construction and must be created inside
//! a tokio runtime.
//!
//! Every connection attempt gets a generation number; socket and timer
//! events carry the generation they were created under and are ignored
//! once a newer attempt (or a disconnect) supersedes them. That is what
//! guarantees a deliberate `disconnect()` can never be resurrected by a
//! stale close event or reconnect timer.

use crate::config::{Config, RealtimeConfig, SettingsStore, AUTH_TOKEN_KEY};
use crate::constants;
use crate::logger::{self, LogTag};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::debug::{DebugInfo, DebugSink, Direction, EventLevel};
use super::endpoint;
use super::messages::{close_code_description, AuthStatus, ClientMessage, ServerMessage};
use super::state::ConnectionState;

/// Resolved configuration for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Portal base URL; scheme and host seed endpoint resolution
    pub portal_url: String,
    pub realtime: RealtimeConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            portal_url: "http://localhost:8000".to_string(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            portal_url: cfg.server.portal_url.clone(),
            realtime: cfg.realtime.clone(),
        }
    }
}

/// Callback invoked with the full payload of every message on a channel
pub type ChannelCallback = Arc<dyn Fn(&Value) + Send + Sync>;
type StatusCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;
type ChannelListCallback = Arc<dyn Fn(&[String]) + Send + Sync>;
/// Connectivity probe consulted before every connect
pub type OnlineProbe = Arc<dyn Fn() -> bool + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: ChannelCallback,
}

enum Outbound {
    Frame(String),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectKind {
    /// Explicit connect() from the application (e.g. a retry button)
    Manual,
    /// Auto-connect on construction or a fired reconnect timer
    Scheduled,
}

struct SessionInner {
    config: SessionConfig,
    settings: Arc<dyn SettingsStore>,
    online: OnlineProbe,
    state: RwLock<ConnectionState>,
    /// Current connection epoch; events from older epochs are ignored
    generation: AtomicU64,
    attempts: AtomicU32,
    has_credential: AtomicBool,
    outbound: RwLock<Option<mpsc::UnboundedSender<Outbound>>>,
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    supported_channels: RwLock<Vec<String>>,
    status_observers: RwLock<Vec<(u64, StatusCallback)>>,
    channel_observers: RwLock<Vec<(u64, ChannelListCallback)>>,
    next_id: AtomicU64,
    subscribe_sent: Mutex<HashMap<String, Instant>>,
    unsubscribe_sent: Mutex<HashMap<String, Instant>>,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    debug: DebugSink,
}

/// The shared realtime session. Construct once, inject everywhere.
pub struct RealtimeSession {
    inner: Arc<SessionInner>,
}

impl RealtimeSession {
    /// Create the session and start connecting immediately.
    pub fn new(config: SessionConfig, settings: Arc<dyn SettingsStore>) -> Arc<Self> {
        Self::with_online_probe(config, settings, Arc::new(|| true))
    }

    /// Create with a custom connectivity probe (the hosting application's
    /// online/visibility check).
    pub fn with_online_probe(
        config: SessionConfig,
        settings: Arc<dyn SettingsStore>,
        online: OnlineProbe,
    ) -> Arc<Self> {
        let history_limit = config.realtime.message_history_limit;
        let inner = Arc::new(SessionInner {
            config,
            settings,
            online,
            state: RwLock::new(ConnectionState::Disconnected),
            generation: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
            has_credential: AtomicBool::new(false),
            outbound: RwLock::new(None),
            subscribers: RwLock::new(HashMap::new()),
            supported_channels: RwLock::new(Vec::new()),
            status_observers: RwLock::new(Vec::new()),
            channel_observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            subscribe_sent: Mutex::new(HashMap::new()),
            unsubscribe_sent: Mutex::new(HashMap::new()),
            reconnect_timer: Mutex::new(None),
            debug: DebugSink::new(history_limit),
        });

        let connect_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            SessionInner::connect_with(&connect_inner, ConnectKind::Scheduled);
        });

        Arc::new(Self { inner })
    }

    /// Start a connection sequence. No-op while a socket is already
    /// connecting or established; restarts the attempt counter when
    /// retrying after a finished sequence.
    pub fn connect(&self) {
        SessionInner::connect_with(&self.inner, ConnectKind::Manual);
    }

    /// Close the socket and cancel all pending timers. The only path that
    /// guarantees no further automatic reconnection. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Current connection state
    pub fn status(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Attempts consumed in the current connect sequence
    pub fn connection_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Send a message; false (never an error) when the socket is not open
    /// or the send fails.
    pub fn send(&self, message: &ClientMessage) -> bool {
        self.inner.send_client(message)
    }

    /// Register a callback for every message on `channel`. The first
    /// subscriber triggers a server-side subscribe (debounced); the
    /// subscriber list itself survives reconnects.
    pub fn subscribe<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.add_subscriber(channel, Arc::new(callback));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            channel: channel.to_string(),
            id: Some(id),
        }
    }

    /// Membership test against the server-declared channel list
    pub fn is_channel_supported(&self, channel: &str) -> bool {
        self.inner
            .supported_channels
            .read()
            .iter()
            .any(|c| c == channel)
    }

    /// Server-declared channels; defensive copy
    pub fn supported_channels(&self) -> Vec<String> {
        self.inner.supported_channels.read().clone()
    }

    /// Diagnostics snapshot
    pub fn debug_info(&self) -> DebugInfo {
        self.inner.debug.snapshot()
    }

    /// Observe state changes. The callback fires synchronously once with
    /// the current state, then on every transition.
    pub fn on_status_change<F>(&self, callback: F) -> ObserverHandle
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = self.inner.add_status_observer(Arc::new(callback));
        ObserverHandle {
            inner: Arc::downgrade(&self.inner),
            kind: ObserverKind::Status,
            id: Some(id),
        }
    }

    /// Observe supported-channel-list changes, same contract as
    /// `on_status_change`.
    pub fn on_channel_list_change<F>(&self, callback: F) -> ObserverHandle
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        let id = self.inner.add_channel_observer(Arc::new(callback));
        ObserverHandle {
            inner: Arc::downgrade(&self.inner),
            kind: ObserverKind::ChannelList,
            id: Some(id),
        }
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.inner.disconnect();
    }
}

/// Handle returned by `subscribe`; removes exactly its own callback on
/// `unsubscribe()` or drop.
pub struct Subscription {
    inner: Weak<SessionInner>,
    channel: String,
    id: Option<u64>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(inner) = self.inner.upgrade() {
                inner.remove_subscriber(&self.channel, id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Copy)]
enum ObserverKind {
    Status,
    ChannelList,
}

/// Handle returned by the observer registrations
pub struct ObserverHandle {
    inner: Weak<SessionInner>,
    kind: ObserverKind,
    id: Option<u64>,
}

impl ObserverHandle {
    pub fn remove(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(inner) = self.inner.upgrade() {
                match self.kind {
                    ObserverKind::Status => {
                        inner.status_observers.write().retain(|(i, _)| *i != id);
                    }
                    ObserverKind::ChannelList => {
                        inner.channel_observers.write().retain(|(i, _)| *i != id);
                    }
                }
            }
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl SessionInner {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, new_state: ConnectionState) {
        {
            let mut state = self.state.write();
            if *state == new_state {
                return;
            }
            *state = new_state;
        }

        logger::debug(LogTag::Realtime, &format!("State -> {}", new_state));

        // Snapshot before invoking: an observer may deregister others (or
        // itself) without affecting this broadcast iteration
        let observers: Vec<StatusCallback> = self
            .status_observers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in observers {
            if catch_unwind(AssertUnwindSafe(|| callback(new_state))).is_err() {
                logger::error(LogTag::Realtime, "Status observer panicked");
            }
        }
    }

    fn connect_with(inner: &Arc<Self>, kind: ConnectKind) {
        if inner.state().is_active() {
            return;
        }

        // A fresh manual sequence restarts the attempt counter
        if kind == ConnectKind::Manual && inner.attempts.load(Ordering::SeqCst) > 1 {
            inner.attempts.store(0, Ordering::SeqCst);
        }

        if !(inner.online)() {
            inner
                .debug
                .record_event(EventLevel::Error, "network_unavailable", None);
            logger::error(LogTag::Realtime, "No network connectivity, staying offline");
            inner.set_state(ConnectionState::Error);
            return;
        }

        let max = inner.config.realtime.max_connection_attempts;
        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > max {
            inner.attempts.store(max, Ordering::SeqCst);
            inner.debug.record_event(
                EventLevel::Error,
                "max_attempts_reached",
                Some(format!("{} attempts", max)),
            );
            logger::error(LogTag::Realtime, "Connection attempts exhausted");
            inner.set_state(ConnectionState::Error);
            return;
        }

        let credential = inner.settings.get(AUTH_TOKEN_KEY);
        inner
            .has_credential
            .store(credential.is_some(), Ordering::SeqCst);

        // Supersede any stale socket and cancel the pending timer
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(timer) = inner.reconnect_timer.lock().take() {
            timer.abort();
        }

        let url = match endpoint::resolve_ws_url(&inner.config, attempt) {
            Ok(url) => url,
            Err(e) => {
                inner.debug.record_event(
                    EventLevel::Error,
                    "endpoint_unresolvable",
                    Some(e.to_string()),
                );
                logger::error(LogTag::Realtime, &format!("Cannot resolve endpoint: {}", e));
                inner.set_state(ConnectionState::Error);
                return;
            }
        };

        inner.debug.record_attempt(attempt);
        logger::info(
            LogTag::Realtime,
            &format!("Connecting (attempt {}/{}): {}", attempt, max, url),
        );
        inner.set_state(ConnectionState::Connecting);

        let task_inner = Arc::clone(inner);
        tokio::spawn(async move {
            run_connection(task_inner, generation, url, credential).await;
        });
    }

    fn disconnect(&self) {
        // Invalidate handlers first so the socket task's own close cannot
        // re-trigger reconnect logic
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = self.reconnect_timer.lock().take() {
            timer.abort();
        }
        if let Some(sender) = self.outbound.write().take() {
            let _ = sender.send(Outbound::Shutdown);
            logger::info(LogTag::Realtime, "Disconnected by request");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_close(inner: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        if !inner.is_current(generation) {
            return;
        }
        *inner.outbound.write() = None;
        inner.set_state(ConnectionState::Disconnected);

        let description = close_code_description(code);
        let level = if code == constants::CLOSE_NORMAL {
            EventLevel::Info
        } else {
            EventLevel::Warning
        };
        inner.debug.record_event(
            level,
            "socket_closed",
            Some(format!("code {} ({}): {}", code, description, reason)),
        );
        logger::info(
            LogTag::Realtime,
            &format!("Socket closed: code {} ({})", code, description),
        );

        if code == constants::CLOSE_NORMAL {
            return;
        }

        let attempts = inner.attempts.load(Ordering::SeqCst);
        let max = inner.config.realtime.max_connection_attempts;
        if attempts >= max {
            inner.debug.record_event(
                EventLevel::Error,
                "max_attempts_reached",
                Some(format!("{} attempts", attempts)),
            );
            logger::error(LogTag::Realtime, "Connection attempts exhausted, going offline");
            inner.set_state(ConnectionState::Error);
            return;
        }

        let delay = inner.reconnect_delay(attempts);
        logger::info(
            LogTag::Realtime,
            &format!("Reconnecting in {}ms", delay.as_millis()),
        );
        let timer_inner = Arc::clone(inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detach our own handle so connect_with doesn't abort the task
            // that is about to drive it
            timer_inner.reconnect_timer.lock().take();
            SessionInner::connect_with(&timer_inner, ConnectKind::Scheduled);
        });
        *inner.reconnect_timer.lock() = Some(timer);
    }

    /// Exponential backoff: base * multiplier^attempt, capped
    fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.config.realtime.reconnect_base_ms as f64;
        let cap = self.config.realtime.reconnect_cap_ms as f64;
        let delay = base * constants::RECONNECT_MULTIPLIER.powi(attempt as i32);
        Duration::from_millis(delay.min(cap) as u64)
    }

    fn send_client(&self, message: &ClientMessage) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                self.debug
                    .record_event(EventLevel::Error, "serialize_failed", Some(e.to_string()));
                return false;
            }
        };

        let sender = match self.outbound.read().as_ref() {
            Some(sender) => sender.clone(),
            None => return false,
        };

        self.debug
            .record_message(Direction::Outgoing, &message.redacted());

        if sender.send(Outbound::Frame(text)).is_err() {
            self.debug.record_event(
                EventLevel::Warning,
                "send_failed",
                Some("socket task gone".to_string()),
            );
            return false;
        }
        true
    }

    fn handle_message(self: &Arc<Self>, text: &str) {
        self.debug.record_message(Direction::Incoming, text);

        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                logger::warning(
                    LogTag::Realtime,
                    &format!("Dropping malformed message: {}", e),
                );
                self.debug
                    .record_event(EventLevel::Warning, "parse_failed", Some(e.to_string()));
                return;
            }
        };

        match message {
            ServerMessage::AuthResponse {
                status: AuthStatus::Success,
                message,
                available_channels,
            } => {
                logger::info(LogTag::Realtime, "Authenticated with realtime server");
                self.debug
                    .record_event(EventLevel::Info, "authenticated", message);
                self.set_state(ConnectionState::Authenticated);
                if let Some(channels) = available_channels {
                    self.replace_supported_channels(channels);
                }
                self.resubscribe_all();
            }
            ServerMessage::AuthResponse {
                status: AuthStatus::Failure,
                message,
                ..
            } => {
                let reason = message.unwrap_or_else(|| "authentication rejected".to_string());
                if self.has_credential.load(Ordering::SeqCst) {
                    // A credential problem, not a network problem: do not
                    // retry with the same token
                    self.debug
                        .record_event(EventLevel::Error, "auth_failed", Some(reason.clone()));
                    logger::error(
                        LogTag::Realtime,
                        &format!("Authentication failed: {}", reason),
                    );
                    self.set_state(ConnectionState::AuthFailed);
                } else {
                    // An anonymous dashboard must not be locked out by a
                    // transient auth hiccup; retry in public mode
                    logger::warning(
                        LogTag::Realtime,
                        &format!("Public authentication rejected ({}), retrying", reason),
                    );
                    self.send_client(&ClientMessage::authenticate(None));
                }
            }
            ServerMessage::ConnectionEstablished {
                message,
                version,
                available_channels,
            } => {
                let detail = match (&version, &message) {
                    (Some(v), _) => Some(format!("server version {}", v)),
                    (None, Some(m)) => Some(m.clone()),
                    (None, None) => None,
                };
                self.debug
                    .record_event(EventLevel::Info, "connection_established", detail);
                if let Some(channels) = available_channels {
                    self.replace_supported_channels(channels);
                }
            }
            ServerMessage::Channel { channel, payload } => {
                self.dispatch_channel(&channel, &payload);
            }
            ServerMessage::Unrecognized(value) => {
                logger::debug(
                    LogTag::Realtime,
                    &format!("Unrecognized message: {}", value),
                );
            }
        }
    }

    fn replace_supported_channels(&self, channels: Vec<String>) {
        *self.supported_channels.write() = channels.clone();
        logger::debug(
            LogTag::Channels,
            &format!("Supported channels: {:?}", channels),
        );

        let observers: Vec<ChannelListCallback> = self
            .channel_observers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in observers {
            if catch_unwind(AssertUnwindSafe(|| callback(&channels))).is_err() {
                logger::error(LogTag::Channels, "Channel-list observer panicked");
            }
        }
    }

    /// Replay server-side subscriptions after (re)authentication. Bypasses
    /// the debounce: a suppressed replay would leave the channel dead on
    /// the new socket.
    fn resubscribe_all(&self) {
        let channels: Vec<String> = self.subscribers.read().keys().cloned().collect();
        for channel in channels {
            self.send_subscribe(&channel, true);
        }
    }

    fn send_subscribe(&self, channel: &str, force: bool) -> bool {
        let window = Duration::from_millis(self.config.realtime.control_debounce_ms);
        {
            let mut sent = self.subscribe_sent.lock();
            if !force {
                if let Some(previous) = sent.get(channel) {
                    if previous.elapsed() < window {
                        logger::debug(
                            LogTag::Channels,
                            &format!("Subscribe for '{}' debounced", channel),
                        );
                        return false;
                    }
                }
            }
            sent.insert(channel.to_string(), Instant::now());
        }
        self.send_client(&ClientMessage::subscribe(channel))
    }

    fn send_unsubscribe(&self, channel: &str) -> bool {
        let window = Duration::from_millis(self.config.realtime.control_debounce_ms);
        {
            let mut sent = self.unsubscribe_sent.lock();
            if let Some(previous) = sent.get(channel) {
                if previous.elapsed() < window {
                    logger::debug(
                        LogTag::Channels,
                        &format!("Unsubscribe for '{}' debounced", channel),
                    );
                    return false;
                }
            }
            sent.insert(channel.to_string(), Instant::now());
        }
        self.send_client(&ClientMessage::unsubscribe(channel))
    }

    fn dispatch_channel(&self, channel: &str, payload: &Value) {
        // Snapshot the callback list: a subscriber may subscribe or
        // unsubscribe reentrantly without corrupting this dispatch
        let callbacks: Vec<ChannelCallback> = match self.subscribers.read().get(channel) {
            Some(list) => list.iter().map(|s| Arc::clone(&s.callback)).collect(),
            None => return,
        };

        logger::debug(
            LogTag::Channels,
            &format!(
                "Dispatching '{}' to {} subscriber(s)",
                channel,
                callbacks.len()
            ),
        );

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                logger::error(
                    LogTag::Channels,
                    &format!("Subscriber callback for '{}' panicked", channel),
                );
            }
        }
    }

    fn add_subscriber(&self, channel: &str, callback: ChannelCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let first = {
            let mut subscribers = self.subscribers.write();
            let list = subscribers.entry(channel.to_string()).or_default();
            let first = list.is_empty();
            list.push(Subscriber { id, callback });
            first
        };

        if first && self.state().is_authenticated() {
            self.send_subscribe(channel, false);
        }
        id
    }

    fn remove_subscriber(&self, channel: &str, id: u64) {
        let emptied = {
            let mut subscribers = self.subscribers.write();
            match subscribers.get_mut(channel) {
                Some(list) => {
                    list.retain(|s| s.id != id);
                    if list.is_empty() {
                        subscribers.remove(channel);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if emptied && self.state().is_authenticated() {
            self.send_unsubscribe(channel);
        }
    }

    fn add_status_observer(&self, callback: StatusCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.status_observers.write().push((id, Arc::clone(&callback)));

        // Deliver the current value synchronously at registration
        let current = self.state();
        if catch_unwind(AssertUnwindSafe(|| callback(current))).is_err() {
            logger::error(LogTag::Realtime, "Status observer panicked");
        }
        id
    }

    fn add_channel_observer(&self, callback: ChannelListCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.channel_observers
            .write()
            .push((id, Arc::clone(&callback)));

        let current = self.supported_channels.read().clone();
        if catch_unwind(AssertUnwindSafe(|| callback(&current))).is_err() {
            logger::error(LogTag::Channels, "Channel-list observer panicked");
        }
        id
    }
}

/// One connection attempt: open the socket, authenticate, pump messages
/// until close, then hand the close code back to the state machine.
async fn run_connection(
    inner: Arc<SessionInner>,
    generation: u64,
    url: String,
    credential: Option<String>,
) {
    let connect_timeout = Duration::from_millis(inner.config.realtime.connect_timeout_ms);
    let result = timeout(connect_timeout, connect_async(url.as_str())).await;

    if !inner.is_current(generation) {
        return;
    }

    let ws_stream = match result {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            inner
                .debug
                .record_event(EventLevel::Error, "connect_failed", Some(e.to_string()));
            logger::warning(LogTag::Realtime, &format!("Connection failed: {}", e));
            SessionInner::handle_close(&inner, generation, constants::CLOSE_ABNORMAL, "connect failed");
            return;
        }
        Err(_) => {
            inner.debug.record_event(
                EventLevel::Error,
                "connect_timeout",
                Some(format!("{}ms", connect_timeout.as_millis())),
            );
            logger::warning(LogTag::Realtime, "Connection timed out");
            SessionInner::handle_close(
                &inner,
                generation,
                constants::CLOSE_ABNORMAL,
                "connection timeout",
            );
            return;
        }
    };

    let (mut sink, mut stream) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    *inner.outbound.write() = Some(tx);

    inner.set_state(ConnectionState::Connected);
    inner.send_client(&ClientMessage::authenticate(credential.as_deref()));

    let mut close_code = constants::CLOSE_ABNORMAL;
    let mut close_reason = String::from("connection lost");

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        inner
                            .debug
                            .record_event(EventLevel::Error, "send_failed", Some(e.to_string()));
                        logger::warning(LogTag::Realtime, &format!("Send failed: {}", e));
                        // The read half will surface the close
                    }
                }
                Some(Outbound::Shutdown) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    // Deliberate shutdown: handlers already detached
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !inner.is_current(generation) {
                        return;
                    }
                    inner.handle_message(&text);
                }
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(f) => {
                            close_code = f.code.into();
                            close_reason = f.reason.to_string();
                        }
                        None => {
                            close_code = 1005;
                            close_reason = String::from("no status");
                        }
                    }
                    break;
                }
                Some(Ok(_)) => {} // ping/pong/binary handled by the transport
                Some(Err(e)) => {
                    inner
                        .debug
                        .record_event(EventLevel::Error, "socket_error", Some(e.to_string()));
                    logger::warning(LogTag::Realtime, &format!("Socket error: {}", e));
                    close_reason = e.to_string();
                    break;
                }
                None => {
                    close_reason = String::from("stream ended");
                    break;
                }
            }
        }
    }

    SessionInner::handle_close(&inner, generation, close_code, &close_reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySettings;
    use crate::realtime::testing::{AuthReply, ServerPlan, TestServer};
    use std::sync::atomic::AtomicU32;

    fn test_config(portal_url: &str) -> SessionConfig {
        let mut cfg = SessionConfig::default();
        cfg.portal_url = portal_url.to_string();
        cfg.realtime.connect_timeout_ms = 2_000;
        cfg.realtime.reconnect_base_ms = 20;
        cfg.realtime.reconnect_cap_ms = 100;
        cfg.realtime.control_debounce_ms = 300;
        cfg.realtime.status_poll_interval_ms = 20;
        cfg.realtime.poll_interval_ms = 100;
        cfg
    }

    async fn wait_for_state(
        session: &RealtimeSession,
        state: ConnectionState,
        timeout_ms: u64,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        while tokio::time::Instant::now() < deadline {
            if session.status() == state {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    async fn wait_until<F: Fn() -> bool>(cond: F, timeout_ms: u64) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    fn count_frames(frames: &[String], needle: &str) -> usize {
        frames.iter().filter(|f| f.contains(needle)).count()
    }

    #[tokio::test]
    async fn test_public_auth_flow_and_status_sequence() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success {
                channels: vec!["reports".into(), "societies".into(), "events".into()],
            },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);

        let seen: Arc<Mutex<Vec<ConnectionState>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _observer = session.on_status_change(move |state| {
            seen_clone.lock().push(state);
        });

        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        let states = seen.lock().clone();
        assert_eq!(
            states,
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Authenticated,
            ]
        );

        // Exactly one public-mode authenticate on the wire
        let frames = server.received();
        assert_eq!(count_frames(&frames, "\"authenticate\""), 1);
        assert_eq!(
            count_frames(&frames, "\"mode\":\"public\""),
            1,
            "expected public-mode authenticate, got {:?}",
            frames
        );
    }

    #[tokio::test]
    async fn test_token_auth_sent_and_redacted() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success { channels: vec![] },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        settings.set(AUTH_TOKEN_KEY, "tok123");
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);

        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        let frames = server.received();
        assert_eq!(count_frames(&frames, "\"token\":\"tok123\""), 1);

        // The credential never lands in diagnostics
        let info = session.debug_info();
        for record in &info.history {
            assert!(!record.text.contains("tok123"), "token leaked: {}", record.text);
        }
    }

    #[tokio::test]
    async fn test_auth_failure_with_credential_is_terminal() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Failure {
                message: "bad token".into(),
            },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        settings.set(AUTH_TOKEN_KEY, "expired");
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);

        assert!(wait_for_state(&session, ConnectionState::AuthFailed, 2_000).await);

        // No second authenticate with the same credential
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count_frames(&server.received(), "\"authenticate\""), 1);
        let last_error = session.debug_info().last_error.expect("auth failure recorded");
        assert_eq!(last_error.message, "auth_failed");
    }

    #[tokio::test]
    async fn test_auth_failure_without_credential_retries_public() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::FailThenSucceed {
                failures: 1,
                channels: vec!["reports".into()],
            },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);

        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        // Two public authenticates, never AuthFailed
        let frames = server.received();
        assert_eq!(count_frames(&frames, "\"mode\":\"public\""), 2);
    }

    #[tokio::test]
    async fn test_resubscribe_after_reconnect() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success { channels: vec![] },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        let _sub = session.subscribe("reports", |_payload| {});
        let server_ref = &server;
        assert!(
            wait_until(
                || count_frames(&server_ref.received(), "\"subscribe\"") == 1,
                1_000
            )
            .await
        );

        // Abnormal close -> reconnect -> re-auth -> exactly one replayed subscribe
        server.push_close(1011);
        assert!(wait_until(|| server_ref.connection_count() == 2, 2_000).await);
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);
        assert!(
            wait_until(
                || count_frames(&server_ref.received(), "\"subscribe\"") == 2,
                1_000
            )
            .await
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count_frames(&server.received(), "\"subscribe\""), 2);
    }

    #[tokio::test]
    async fn test_normal_close_never_reconnects() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success { channels: vec![] },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        server.push_close(1000);
        assert!(wait_for_state(&session, ConnectionState::Disconnected, 2_000).await);

        // Wait past several backoff windows: no new socket
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(server.connection_count(), 1);
        assert_eq!(session.status(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_attempts_exhausted_reaches_error_state() {
        // Bind then drop a listener to get a port that refuses connections
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut cfg = test_config(&format!("http://127.0.0.1:{}", port));
        cfg.realtime.max_connection_attempts = 5;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(cfg, settings);

        assert!(wait_for_state(&session, ConnectionState::Error, 5_000).await);
        assert_eq!(session.connection_attempts(), 5);
        assert_eq!(session.debug_info().attempts.len(), 5);

        // Past the maximum backoff window: still exhausted, no 6th attempt
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(session.connection_attempts(), 5);
        assert_eq!(session.status(), ConnectionState::Error);
        assert_eq!(session.debug_info().attempts.len(), 5);
    }

    #[tokio::test]
    async fn test_manual_connect_restarts_sequence_after_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut cfg = test_config(&format!("http://127.0.0.1:{}", port));
        cfg.realtime.max_connection_attempts = 2;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(cfg, settings);
        assert!(wait_for_state(&session, ConnectionState::Error, 3_000).await);
        assert_eq!(session.debug_info().attempts.len(), 2);

        // Manual retry resets the counter and runs a fresh sequence
        session.connect();
        assert!(wait_for_state(&session, ConnectionState::Error, 3_000).await);
        assert_eq!(session.connection_attempts(), 2);
        assert_eq!(session.debug_info().attempts.len(), 4);
    }

    #[tokio::test]
    async fn test_connect_noop_while_active() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success { channels: vec![] },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        session.connect();
        session.connect();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(session.connection_attempts(), 1);
        assert_eq!(server.connection_count(), 1);
        assert_eq!(session.status(), ConnectionState::Authenticated);
    }

    #[tokio::test]
    async fn test_offline_probe_blocks_connect() {
        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::with_online_probe(
            test_config("http://localhost:1"),
            settings,
            Arc::new(|| false),
        );

        assert!(wait_for_state(&session, ConnectionState::Error, 1_000).await);
        // No attempt consumed, no retry scheduled
        assert_eq!(session.connection_attempts(), 0);
        let info = session.debug_info();
        assert!(info.events.iter().any(|e| e.message == "network_unavailable"));
        assert!(info.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_debounce_within_window() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success { channels: vec![] },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        // Rapid mount/unmount churn: one subscribe, one unsubscribe on the wire
        let sub = session.subscribe("events", |_payload| {});
        sub.unsubscribe();
        let _sub2 = session.subscribe("events", |_payload| {});

        tokio::time::sleep(Duration::from_millis(150)).await;
        let frames = server.received();
        assert_eq!(count_frames(&frames, "\"subscribe\""), 1);
        assert_eq!(count_frames(&frames, "\"unsubscribe\""), 1);
    }

    #[tokio::test]
    async fn test_channel_dispatch_and_panic_isolation() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success { channels: vec![] },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        let delivered = Arc::new(AtomicU32::new(0));
        let delivered_clone = Arc::clone(&delivered);

        let _bad = session.subscribe("reports", |_payload| {
            panic!("subscriber bug");
        });
        let _good = session.subscribe("reports", move |payload| {
            assert_eq!(payload["action"], "created");
            delivered_clone.fetch_add(1, Ordering::SeqCst);
        });

        server.push_text(r#"{"channel":"reports","action":"created","id":42}"#);

        let delivered_ref = &delivered;
        assert!(wait_until(|| delivered_ref.load(Ordering::SeqCst) == 1, 1_000).await);
    }

    #[tokio::test]
    async fn test_supported_channels_defensive_copy() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success {
                channels: vec!["a".into(), "b".into(), "c".into()],
            },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        let mut channels = session.supported_channels();
        assert_eq!(channels, vec!["a", "b", "c"]);
        channels.push("mutated".to_string());

        assert_eq!(session.supported_channels(), vec!["a", "b", "c"]);
        assert!(session.is_channel_supported("b"));
        assert!(!session.is_channel_supported("mutated"));
    }

    #[tokio::test]
    async fn test_channel_list_observer_immediate_and_on_change() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success {
                channels: vec!["reports".into()],
            },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);

        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _observer = session.on_channel_list_change(move |channels| {
            seen_clone.lock().push(channels.to_vec());
        });

        // Immediate call with the (still empty) current value
        assert_eq!(seen.lock().first(), Some(&Vec::new()));

        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);
        let seen_ref = &seen;
        assert!(wait_until(|| seen_ref.lock().len() == 2, 1_000).await);
        assert_eq!(seen.lock()[1], vec!["reports".to_string()]);
    }

    #[tokio::test]
    async fn test_observer_removal_stops_notifications() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success { channels: vec![] },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let observer = session.on_status_change(move |_state| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let after_registration = count.load(Ordering::SeqCst);
        assert_eq!(after_registration, 1, "exactly one immediate call");

        observer.remove();
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);
        assert_eq!(count.load(Ordering::SeqCst), 1, "no calls after removal");
    }

    #[tokio::test]
    async fn test_send_returns_false_when_not_open() {
        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::with_online_probe(
            test_config("http://localhost:1"),
            settings,
            Arc::new(|| false),
        );
        assert!(wait_for_state(&session, ConnectionState::Error, 1_000).await);

        assert!(!session.send(&ClientMessage::subscribe("reports")));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_final() {
        let server = TestServer::spawn(ServerPlan {
            auth: AuthReply::Success { channels: vec![] },
        })
        .await;

        let settings = Arc::new(MemorySettings::new());
        let session = RealtimeSession::new(test_config(&server.portal_url()), settings);
        assert!(wait_for_state(&session, ConnectionState::Authenticated, 2_000).await);

        session.disconnect();
        session.disconnect();
        assert_eq!(session.status(), ConnectionState::Disconnected);

        // No automatic reconnection after a deliberate disconnect
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(session.status(), ConnectionState::Disconnected);
        assert_eq!(server.connection_count(), 1);
    }
}
