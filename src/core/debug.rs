use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
    },
};

use chrono::{
    DateTime,
    Utc,
};
use serde::Serialize;
use serde_json::Value;

pub const DEBUG_ENV_VAR: &str = "YOMINE_READER_DEBUG";
const DEBUG_EVENT_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugScope {
    Reader,
    Drawer,
    Core,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugEvent {
    pub ts: DateTime<Utc>,
    pub scope: DebugScope,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugSnapshot<'a> {
    generated_at: DateTime<Utc>,
    debug_enabled: bool,
    extra: Value,
    events: &'a [DebugEvent],
}

/// Bounded in-memory record of drawer activity, attached to bug reports.
#[derive(Clone, Default)]
pub struct DebugLog {
    enabled: bool,
    events: Arc<Mutex<VecDeque<DebugEvent>>>,
}

impl DebugLog {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, events: Arc::new(Mutex::new(VecDeque::new())) }
    }

    pub fn from_env() -> Self {
        let enabled = std::env::var(DEBUG_ENV_VAR)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self::new(enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, scope: DebugScope, message: &str, details: Option<Value>) {
        if !self.enabled {
            return;
        }

        tracing::debug!(?scope, details = ?details, "{message}");

        let event = DebugEvent { ts: Utc::now(), scope, message: message.to_string(), details };
        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > DEBUG_EVENT_LIMIT {
                events.pop_front();
            }
        }
    }

    /// Newest `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<DebugEvent> {
        if limit == 0 {
            return Vec::new();
        }
        match self.events.lock() {
            Ok(events) => {
                let skip = events.len().saturating_sub(limit);
                events.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn snapshot(&self, extra: Option<Value>) -> Result<String, serde_json::Error> {
        let events = self.recent(100);
        let snapshot = DebugSnapshot {
            generated_at: Utc::now(),
            debug_enabled: self.enabled,
            extra: extra.unwrap_or_else(|| Value::Object(Default::default())),
            events: &events,
        };
        serde_json::to_string_pretty(&snapshot)
    }
}
