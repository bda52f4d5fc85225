//! Mutable capture settings.
//!
//! A single [`Settings`] record controls ring-buffer capacities, the query
//! byte budget, and header visibility. It is updated in place when the
//! peer sends a `settings-update` frame or the caller applies a patch,
//! and read by the log store at append and query time.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default console ring-buffer capacity.
pub const DEFAULT_CONSOLE_CAPACITY: usize = 500;

/// Default network ring-buffer capacity.
pub const DEFAULT_NETWORK_CAPACITY: usize = 200;

/// Default byte budget for a single log query.
pub const DEFAULT_QUERY_BYTE_BUDGET: usize = 16 * 1024;

// ============================================================================
// Settings
// ============================================================================

/// Capture and query settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Maximum retained console entries.
    pub console_capacity: usize,

    /// Maximum retained network entries.
    pub network_capacity: usize,

    /// Byte budget applied to query results.
    pub query_byte_budget: usize,

    /// Include request headers in query results.
    pub include_request_headers: bool,

    /// Include response headers in query results.
    pub include_response_headers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            console_capacity: DEFAULT_CONSOLE_CAPACITY,
            network_capacity: DEFAULT_NETWORK_CAPACITY,
            query_byte_budget: DEFAULT_QUERY_BYTE_BUDGET,
            include_request_headers: false,
            include_response_headers: false,
        }
    }
}

impl Settings {
    /// Applies a partial update, leaving unset fields untouched.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(capacity) = patch.console_capacity {
            self.console_capacity = capacity;
        }
        if let Some(capacity) = patch.network_capacity {
            self.network_capacity = capacity;
        }
        if let Some(budget) = patch.query_byte_budget {
            self.query_byte_budget = budget;
        }
        if let Some(include) = patch.include_request_headers {
            self.include_request_headers = include;
        }
        if let Some(include) = patch.include_response_headers {
            self.include_response_headers = include;
        }
    }
}

// ============================================================================
// SettingsPatch
// ============================================================================

/// Partial settings update; carried by `settings-update` frames and by
/// caller-side updates. Absent fields leave the current value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    /// New console capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_capacity: Option<usize>,

    /// New network capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_capacity: Option<usize>,

    /// New query byte budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_byte_budget: Option<usize>,

    /// New request-header visibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_request_headers: Option<bool>,

    /// New response-header visibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_response_headers: Option<bool>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.console_capacity, DEFAULT_CONSOLE_CAPACITY);
        assert_eq!(settings.network_capacity, DEFAULT_NETWORK_CAPACITY);
        assert!(!settings.include_request_headers);
    }

    #[test]
    fn test_apply_partial_patch() {
        let mut settings = Settings::default();
        let patch = SettingsPatch {
            console_capacity: Some(10),
            include_response_headers: Some(true),
            ..Default::default()
        };

        settings.apply(&patch);

        assert_eq!(settings.console_capacity, 10);
        assert!(settings.include_response_headers);
        // Untouched fields keep their values.
        assert_eq!(settings.network_capacity, DEFAULT_NETWORK_CAPACITY);
        assert_eq!(settings.query_byte_budget, DEFAULT_QUERY_BYTE_BUDGET);
    }

    #[test]
    fn test_patch_deserialize_camel_case() {
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"consoleCapacity": 25, "includeRequestHeaders": true}"#)
                .expect("parse");

        assert_eq!(patch.console_capacity, Some(25));
        assert_eq!(patch.include_request_headers, Some(true));
        assert_eq!(patch.network_capacity, None);
    }
}
