//! Bounded log store for captured browser events.
//!
//! Two fixed-capacity buffers (console and network) with strict FIFO
//! eviction, plus a query path that applies header redaction and a
//! deterministic byte-budget truncation: same entries and settings always
//! produce the same output prefix.

// ============================================================================
// Imports
// ============================================================================

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::settings::Settings;

// ============================================================================
// ConsoleEntry
// ============================================================================

/// A captured console message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    /// Console level ("log", "warn", "error", ...).
    pub level: String,

    /// Message text.
    pub text: String,

    /// Page URL the message originated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Peer-supplied capture timestamp, milliseconds since the epoch.
    #[serde(default)]
    pub timestamp_ms: u64,
}

// ============================================================================
// NetworkEntry
// ============================================================================

/// A captured network exchange.
///
/// Headers are kept in a `BTreeMap` so serialization order, and therefore
/// byte-budget accounting, is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    /// HTTP method.
    pub method: String,

    /// Request URL.
    pub url: String,

    /// Response status code, when a response arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Response status text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,

    /// Request headers; redacted at query time unless enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<BTreeMap<String, String>>,

    /// Response headers; redacted at query time unless enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<BTreeMap<String, String>>,

    /// Round-trip duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Peer-supplied capture timestamp, milliseconds since the epoch.
    #[serde(default)]
    pub timestamp_ms: u64,
}

// ============================================================================
// LogQueryResult
// ============================================================================

/// Result of a log query: the maximal prefix that fits the byte budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQueryResult {
    /// Entries in original order, already redacted.
    pub entries: Vec<Value>,

    /// Number of tail entries dropped by the byte budget.
    pub dropped: usize,
}

impl LogQueryResult {
    /// Returns `true` if the byte budget cut the result short.
    #[inline]
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }
}

// ============================================================================
// LogStore
// ============================================================================

/// Fixed-capacity FIFO buffers for captured events.
#[derive(Debug, Default)]
pub struct LogStore {
    console: Mutex<VecDeque<ConsoleEntry>>,
    network: Mutex<VecDeque<NetworkEntry>>,
}

impl LogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a console entry, evicting the oldest entry when the
    /// configured capacity is exceeded.
    pub fn append_console(&self, entry: ConsoleEntry, settings: &Settings) {
        let mut buffer = self.console.lock();
        buffer.push_back(entry);
        Self::evict(&mut buffer, settings.console_capacity);
    }

    /// Appends a network entry, evicting the oldest entry when the
    /// configured capacity is exceeded.
    pub fn append_network(&self, entry: NetworkEntry, settings: &Settings) {
        let mut buffer = self.network.lock();
        buffer.push_back(entry);
        Self::evict(&mut buffer, settings.network_capacity);
    }

    /// Re-applies capacities after a settings change so buffers never
    /// exceed the configured capacity after any operation.
    pub fn enforce_capacities(&self, settings: &Settings) {
        Self::evict(&mut self.console.lock(), settings.console_capacity);
        Self::evict(&mut self.network.lock(), settings.network_capacity);
    }

    /// Returns the number of retained console entries.
    #[must_use]
    pub fn console_len(&self) -> usize {
        self.console.lock().len()
    }

    /// Returns the number of retained network entries.
    #[must_use]
    pub fn network_len(&self) -> usize {
        self.network.lock().len()
    }

    /// Clears both buffers.
    pub fn clear(&self) {
        self.console.lock().clear();
        self.network.lock().clear();
    }

    /// Queries the console buffer under the current settings.
    #[must_use]
    pub fn query_console(&self, settings: &Settings) -> LogQueryResult {
        let snapshot: Vec<Value> = {
            let buffer = self.console.lock();
            buffer
                .iter()
                .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
                .collect()
        };
        Self::take_within_budget(snapshot, settings.query_byte_budget)
    }

    /// Queries the network buffer under the current settings, applying
    /// header redaction before the byte budget.
    #[must_use]
    pub fn query_network(&self, settings: &Settings) -> LogQueryResult {
        let snapshot: Vec<Value> = {
            let buffer = self.network.lock();
            buffer
                .iter()
                .map(|e| {
                    let mut entry = e.clone();
                    if !settings.include_request_headers {
                        entry.request_headers = None;
                    }
                    if !settings.include_response_headers {
                        entry.response_headers = None;
                    }
                    serde_json::to_value(&entry).unwrap_or(Value::Null)
                })
                .collect()
        };
        Self::take_within_budget(snapshot, settings.query_byte_budget)
    }

    fn evict<T>(buffer: &mut VecDeque<T>, capacity: usize) {
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }

    /// Accumulates entries in original order until the next entry would
    /// exceed the budget; the prefix is maximal and deterministic.
    fn take_within_budget(entries: Vec<Value>, budget: usize) -> LogQueryResult {
        let total = entries.len();
        let mut kept = Vec::with_capacity(total);
        let mut used = 0usize;

        for entry in entries {
            let size = serde_json::to_string(&entry).map(|s| s.len()).unwrap_or(0);
            if used + size > budget {
                break;
            }
            used += size;
            kept.push(entry);
        }

        let dropped = total - kept.len();
        LogQueryResult {
            entries: kept,
            dropped,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
