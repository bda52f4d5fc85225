//! Wire protocol message types.
//!
//! This module defines the JSON frame vocabulary exchanged between the
//! relay and the browser-side agent, plus the HTTP identity/status
//! payloads used by discovery.
//!
//! # Frame Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | [`OutboundFrame`] | Relay → Peer | Heartbeats, correlated commands, shutdown |
//! | [`InboundFrame`] | Peer → Relay | Replies, capture events, settings updates |
//!
//! Every frame is a JSON object with a mandatory `type` discriminator;
//! correlated frames additionally carry `requestId`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Tagged frame unions for both directions |
//! | `identity` | Identity probe body, signature constant, status report |

// ============================================================================
// Submodules
// ============================================================================

/// Tagged frame unions for both directions.
pub mod frame;

/// Identity probe and status payloads.
pub mod identity;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{InboundFrame, OutboundFrame, ReplyKind};
pub use identity::{
    IdentityProbe, ServerIdentity, StatusReport, IDENTITY_PATH, IDENTITY_SIGNATURE, SESSION_PATH,
    STATUS_PATH,
};
