//! Error types for the browser relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use browser_relay::{Result, Error};
//!
//! async fn example(relay: &RelayService) -> Result<()> {
//!     let shot = relay.capture_screenshot(Default::default()).await?;
//!     println!("{} bytes", shot.data.len());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Connection | [`Error::NotConnected`], [`Error::ConnectionLost`] |
//! | Correlation | [`Error::Timeout`], [`Error::DuplicateRequest`] |
//! | Protocol | [`Error::Protocol`], [`Error::Peer`] |
//! | Discovery | [`Error::Discovery`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::HttpClient`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging. Callers always
/// receive one of these, never an unhandled crash: a malformed inbound
/// frame is logged and dropped, and every failed in-flight request settles
/// with exactly one variant.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// No live peer connection at send time.
    ///
    /// Returned when an operation is issued while no browser-side agent
    /// is attached.
    #[error("Not connected: no live peer")]
    NotConnected,

    /// Peer disconnected or heartbeat-timed-out while a request was in flight.
    #[error("Connection lost: {message}")]
    ConnectionLost {
        /// Description of how the connection was lost.
        message: String,
    },

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// No matching reply within the operation's budget.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    Timeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A request with this ID is already pending.
    ///
    /// The registry never holds two entries with the same ID.
    #[error("Duplicate request id: {request_id}")]
    DuplicateRequest {
        /// The ID that was already registered.
        request_id: RequestId,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Frame failed to parse or carried an unrecognized `type`.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The browser-side agent reported an operation failure.
    ///
    /// Returned when the peer answers with an error frame
    /// (e.g. `screenshot-error`) instead of the expected payload.
    #[error("Peer error: {message}")]
    Peer {
        /// Error message reported by the peer.
        message: String,
    },

    // ========================================================================
    // Discovery Errors
    // ========================================================================
    /// No candidate produced a valid signed identity.
    #[error("Discovery failed: {message}")]
    Discovery {
        /// Description of the discovery failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error during a discovery probe.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connection lost error.
    #[inline]
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::Timeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a duplicate request error.
    #[inline]
    pub fn duplicate_request(request_id: RequestId) -> Self {
        Self::DuplicateRequest { request_id }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a peer-reported error.
    #[inline]
    pub fn peer(message: impl Into<String>) -> Self {
        Self::Peer {
            message: message.into(),
        }
    }

    /// Creates a discovery error.
    #[inline]
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionLost { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry against a fresh connection.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::ConnectionLost { .. }
                | Self::Timeout { .. }
                | Self::Discovery { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection_lost("peer went away");
        assert_eq!(err.to_string(), "Connection lost: peer went away");
    }

    #[test]
    fn test_not_connected_display() {
        assert_eq!(
            Error::NotConnected.to_string(),
            "Not connected: no live peer"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::timeout(RequestId::generate(), 5000);
        let other_err = Error::protocol("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let not_connected = Error::NotConnected;
        let lost = Error::connection_lost("test");
        let other = Error::discovery("test");

        assert!(not_connected.is_connection_error());
        assert!(lost.is_connection_error());
        assert!(!other.is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        let lost = Error::connection_lost("test");
        let protocol = Error::protocol("test");

        assert!(lost.is_recoverable());
        assert!(!protocol.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
