//! Rolling diagnostic buffers for the realtime session
//!
//! Everything here is observational: connection attempts, connection
//! events, recent message traffic, and the last error. Buffers are
//! bounded so a long-lived session cannot grow without limit, and reads
//! return snapshots, never references into shared state.

use crate::constants;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Severity of a recorded connection event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

/// One connect invocation
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

/// One noteworthy connection event (state change, close, failure)
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEvent {
    pub level: EventLevel,
    pub message: String,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// Direction of a recorded wire message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One wire message, already redacted by the caller where needed
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub direction: Direction,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Read-only snapshot returned by `RealtimeSession::debug_info()`
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub attempts: Vec<AttemptRecord>,
    pub events: Vec<ConnectionEvent>,
    pub history: Vec<MessageRecord>,
    pub last_error: Option<ConnectionEvent>,
}

/// Collector behind the session; all writes are cheap appends
#[derive(Debug)]
pub struct DebugSink {
    attempts: Mutex<VecDeque<AttemptRecord>>,
    events: Mutex<VecDeque<ConnectionEvent>>,
    history: Mutex<VecDeque<MessageRecord>>,
    last_error: Mutex<Option<ConnectionEvent>>,
    history_limit: usize,
}

impl DebugSink {
    pub fn new(history_limit: usize) -> Self {
        Self {
            attempts: Mutex::new(VecDeque::new()),
            events: Mutex::new(VecDeque::new()),
            history: Mutex::new(VecDeque::new()),
            last_error: Mutex::new(None),
            history_limit,
        }
    }

    pub fn record_attempt(&self, attempt: u32) {
        let mut attempts = self.attempts.lock();
        if attempts.len() >= constants::ATTEMPT_HISTORY_LIMIT {
            attempts.pop_front();
        }
        attempts.push_back(AttemptRecord {
            attempt,
            at: Utc::now(),
        });
    }

    pub fn record_event(&self, level: EventLevel, message: &str, detail: Option<String>) {
        let event = ConnectionEvent {
            level,
            message: message.to_string(),
            detail,
            at: Utc::now(),
        };

        if level == EventLevel::Error {
            *self.last_error.lock() = Some(event.clone());
        }

        let mut events = self.events.lock();
        if events.len() >= constants::EVENT_HISTORY_LIMIT {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn record_message(&self, direction: Direction, text: &str) {
        let mut history = self.history.lock();
        if history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(MessageRecord {
            direction,
            text: text.to_string(),
            at: Utc::now(),
        });
    }

    /// Snapshot for consumers; detached from internal buffers
    pub fn snapshot(&self) -> DebugInfo {
        DebugInfo {
            attempts: self.attempts.lock().iter().cloned().collect(),
            events: self.events.lock().iter().cloned().collect(),
            history: self.history.lock().iter().cloned().collect(),
            last_error: self.last_error.lock().clone(),
        }
    }
}
