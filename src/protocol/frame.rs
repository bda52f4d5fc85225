//! Tagged frame unions for both directions.
//!
//! Frames are internally tagged on `type` with kebab-case tags, matching
//! what the browser-side agent emits. Parsing an unrecognized tag fails,
//! which the connection event loop reports as a protocol error and drops
//! rather than silently ignoring.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::RequestId;
use crate::logs::{ConsoleEntry, NetworkEntry};
use crate::settings::SettingsPatch;

// ============================================================================
// OutboundFrame
// ============================================================================

/// A frame sent from the relay to the browser-side agent.
///
/// # Format
///
/// ```json
/// { "type": "navigate-tab", "requestId": "uuid", "url": "https://..." }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundFrame {
    /// Liveness probe; the peer answers with `heartbeat-response`.
    Heartbeat,

    /// Capture the visible tab.
    TakeScreenshot {
        /// Correlation ID.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Image format ("png" or "jpeg").
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        /// JPEG quality (0-100).
        #[serde(skip_serializing_if = "Option::is_none")]
        quality: Option<u8>,
    },

    /// Navigate the active tab to a URL.
    NavigateTab {
        /// Correlation ID.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Destination URL.
        url: String,
    },

    /// Perform a DOM action (click, type, ...) in the active tab.
    DomAction {
        /// Correlation ID.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Action name, interpreted by the peer.
        action: String,
        /// Target selector, when the action needs one.
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Action payload (text to type, coordinates, ...).
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },

    /// Ask the peer for an authentication token.
    RetrieveAuthToken {
        /// Correlation ID.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Service the token is scoped to.
        #[serde(skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },

    /// The relay is shutting down; the peer should close without
    /// reconnect-retry.
    ServerShutdown,
}

impl OutboundFrame {
    /// Returns the correlation ID carried by this frame, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::TakeScreenshot { request_id, .. }
            | Self::NavigateTab { request_id, .. }
            | Self::DomAction { request_id, .. }
            | Self::RetrieveAuthToken { request_id, .. } => Some(*request_id),
            Self::Heartbeat | Self::ServerShutdown => None,
        }
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// A frame received from the browser-side agent.
///
/// Correlated replies carry the `requestId` of the command they answer.
/// Screenshot replies are allowed to omit it for compatibility with older
/// peer builds; see [`crate::relay::CorrelationRegistry`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundFrame {
    /// Answer to a `heartbeat` probe.
    HeartbeatResponse,

    /// Successful screenshot capture.
    ScreenshotData {
        /// Correlation ID; may be absent on legacy peers.
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        /// Base64-encoded image data.
        data: String,
        /// Image format reported by the peer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },

    /// Failed screenshot capture.
    ScreenshotError {
        /// Correlation ID; may be absent on legacy peers.
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        /// Error message from the peer.
        error: String,
    },

    /// Answer to `navigate-tab`.
    NavigationResponse {
        /// Correlation ID.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// URL the tab ended up at.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Error message when navigation failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Answer to `dom-action`.
    DomActionResponse {
        /// Correlation ID.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Action result payload.
        #[serde(default)]
        result: Value,
        /// Error message when the action failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Answer to `retrieve-auth-token`.
    RetrieveAuthTokenResponse {
        /// Correlation ID.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// The retrieved token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        /// Error message when retrieval failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A captured console entry.
    ConsoleEvent {
        /// The entry to append to the console buffer.
        #[serde(flatten)]
        entry: ConsoleEntry,
    },

    /// A captured network entry.
    NetworkEvent {
        /// The entry to append to the network buffer.
        #[serde(flatten)]
        entry: NetworkEntry,
    },

    /// Partial settings update pushed by the peer.
    SettingsUpdate {
        /// Fields to change.
        #[serde(flatten)]
        patch: SettingsPatch,
    },
}

impl InboundFrame {
    /// Returns the correlation info for reply frames.
    ///
    /// `None` for frames that never resolve a pending request (heartbeat
    /// responses, capture events, settings updates).
    #[must_use]
    pub fn correlation(&self) -> Option<(Option<RequestId>, ReplyKind)> {
        match self {
            Self::ScreenshotData { request_id, .. } | Self::ScreenshotError { request_id, .. } => {
                Some((*request_id, ReplyKind::Screenshot))
            }
            Self::NavigationResponse { request_id, .. } => {
                Some((Some(*request_id), ReplyKind::Navigation))
            }
            Self::DomActionResponse { request_id, .. } => {
                Some((Some(*request_id), ReplyKind::DomAction))
            }
            Self::RetrieveAuthTokenResponse { request_id, .. } => {
                Some((Some(*request_id), ReplyKind::AuthToken))
            }
            Self::HeartbeatResponse | Self::ConsoleEvent { .. } | Self::NetworkEvent { .. }
            | Self::SettingsUpdate { .. } => None,
        }
    }
}

// ============================================================================
// ReplyKind
// ============================================================================

/// The class of reply a pending request expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// `screenshot-data` or `screenshot-error`.
    Screenshot,
    /// `navigation-response`.
    Navigation,
    /// `dom-action-response`.
    DomAction,
    /// `retrieve-auth-token-response`.
    AuthToken,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_tags() {
        let id = RequestId::generate();
        let frame = OutboundFrame::NavigateTab {
            request_id: id,
            url: "https://example.com".to_string(),
        };

        let json = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(json["type"], "navigate-tab");
        assert_eq!(json["requestId"], id.to_string());
        assert_eq!(json["url"], "https://example.com");
    }

    #[test]
    fn test_outbound_unit_variants() {
        let json = serde_json::to_value(OutboundFrame::Heartbeat).expect("serialize");
        assert_eq!(json, serde_json::json!({ "type": "heartbeat" }));

        let json = serde_json::to_value(OutboundFrame::ServerShutdown).expect("serialize");
        assert_eq!(json, serde_json::json!({ "type": "server-shutdown" }));
    }

    #[test]
    fn test_outbound_request_id() {
        assert!(OutboundFrame::Heartbeat.request_id().is_none());

        let id = RequestId::generate();
        let frame = OutboundFrame::TakeScreenshot {
            request_id: id,
            format: None,
            quality: None,
        };
        assert_eq!(frame.request_id(), Some(id));
    }

    #[test]
    fn test_inbound_screenshot_with_id() {
        let json = r#"{
            "type": "screenshot-data",
            "requestId": "550e8400-e29b-41d4-a716-446655440000",
            "data": "aGVsbG8="
        }"#;

        let frame: InboundFrame = serde_json::from_str(json).expect("parse");
        let (id, kind) = frame.correlation().expect("correlated");
        assert!(id.is_some());
        assert_eq!(kind, ReplyKind::Screenshot);
    }

    #[test]
    fn test_inbound_screenshot_without_id() {
        let json = r#"{ "type": "screenshot-data", "data": "aGVsbG8=" }"#;

        let frame: InboundFrame = serde_json::from_str(json).expect("parse");
        let (id, kind) = frame.correlation().expect("correlated");
        assert!(id.is_none());
        assert_eq!(kind, ReplyKind::Screenshot);
    }

    #[test]
    fn test_inbound_navigation_response() {
        let json = r#"{
            "type": "navigation-response",
            "requestId": "550e8400-e29b-41d4-a716-446655440000",
            "url": "https://example.com/"
        }"#;

        let frame: InboundFrame = serde_json::from_str(json).expect("parse");
        match &frame {
            InboundFrame::NavigationResponse { url, error, .. } => {
                assert_eq!(url.as_deref(), Some("https://example.com/"));
                assert!(error.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(frame.correlation().map(|(_, k)| k), Some(ReplyKind::Navigation));
    }

    #[test]
    fn test_inbound_console_event() {
        let json = r#"{
            "type": "console-event",
            "level": "error",
            "text": "boom",
            "timestampMs": 1000
        }"#;

        let frame: InboundFrame = serde_json::from_str(json).expect("parse");
        assert!(frame.correlation().is_none());
        match frame {
            InboundFrame::ConsoleEvent { entry } => {
                assert_eq!(entry.level, "error");
                assert_eq!(entry.text, "boom");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_inbound_settings_update() {
        let json = r#"{ "type": "settings-update", "consoleCapacity": 50 }"#;

        let frame: InboundFrame = serde_json::from_str(json).expect("parse");
        match frame {
            InboundFrame::SettingsUpdate { patch } => {
                assert_eq!(patch.console_capacity, Some(50));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let json = r#"{ "type": "mystery-frame", "data": 1 }"#;
        assert!(serde_json::from_str::<InboundFrame>(json).is_err());
    }

    #[test]
    fn test_missing_tag_rejected() {
        let json = r#"{ "data": 1 }"#;
        assert!(serde_json::from_str::<InboundFrame>(json).is_err());
    }
}
