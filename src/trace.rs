//! Trace events.
//!
//! A trace event records the opcode, resolved input, a *shallow* diff of
//! visible state before/after, fuel before/after, optional result/error,
//! and an ISO timestamp. Deep structural diffs are explicitly out of
//! scope.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::value::{ErrorValue, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub op: String,
    pub input: Json,
    /// Keys whose value differs between the before/after state snapshots.
    pub state_diff: Vec<StateDiffEntry>,
    pub result: Option<Json>,
    pub error: Option<ErrorValue>,
    pub fuel_before: f64,
    pub fuel_after: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDiffEntry {
    pub key: String,
    pub before: Option<Json>,
    pub after: Option<Json>,
}

pub fn diff_state(
    before: &indexmap::IndexMap<String, Value>,
    after: &indexmap::IndexMap<String, Value>,
) -> Vec<StateDiffEntry> {
    let mut diffs = Vec::new();
    for (k, before_v) in before {
        match after.get(k) {
            Some(after_v) if after_v == before_v => {}
            Some(after_v) => diffs.push(StateDiffEntry {
                key: k.clone(),
                before: Some(before_v.to_json()),
                after: Some(after_v.to_json()),
            }),
            None => diffs.push(StateDiffEntry {
                key: k.clone(),
                before: Some(before_v.to_json()),
                after: None,
            }),
        }
    }
    for (k, after_v) in after {
        if !before.contains_key(k) {
            diffs.push(StateDiffEntry {
                key: k.clone(),
                before: None,
                after: Some(after_v.to_json()),
            });
        }
    }
    diffs
}

pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Append-only trace sink, shared across the run.
#[derive(Clone, Default)]
pub struct TraceSink(std::sync::Arc<tokio::sync::Mutex<Vec<TraceEvent>>>);

impl TraceSink {
    pub async fn push(&self, event: TraceEvent) {
        self.0.lock().await.push(event);
    }

    pub async fn drain(&self) -> Vec<TraceEvent> {
        self.0.lock().await.clone()
    }
}
