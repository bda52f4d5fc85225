//! Browser relay - bridge between an automated tool caller and a live
//! browser-side agent.
//!
//! The relay owns the single persistent WebSocket connection to the
//! browser-side agent, correlates asynchronous request/response pairs,
//! watches liveness with heartbeats, and buffers captured console and
//! network events. A companion [`DiscoveryClient`] locates the relay
//! from the calling process by probing candidates for a signed identity.
//!
//! # Architecture
//!
//! - **Relay side**: [`RelayService`] binds one listener serving the
//!   identity probe, the status endpoint, and the peer WebSocket
//!   upgrade. At most one peer is live; a newer connection evicts the
//!   previous one.
//! - **Caller side**: [`DiscoveryClient`] probes candidate addresses,
//!   caches the winner, and wraps relay calls with one bounded
//!   rediscovery retry.
//!
//! # Quick Start
//!
//! ```no_run
//! use browser_relay::{RelayConfig, RelayService, ScreenshotFormat, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let relay = RelayService::bind(RelayConfig::new()).await?;
//!     println!("relay listening on {}", relay.local_addr());
//!
//!     // The browser-side agent connects to ws://127.0.0.1:PORT/session.
//!     // Once attached, operations round-trip through it:
//!     let shot = relay.capture_screenshot(ScreenshotFormat::Png).await?;
//!     println!("captured {} base64 bytes", shot.data.len());
//!
//!     relay.shutdown().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Relay and discovery configuration |
//! | [`discovery`] | Candidate probing and call wrapping |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`logs`] | Bounded console/network capture buffers |
//! | [`protocol`] | Wire frame and identity types |
//! | [`relay`] | Connection, correlation, heartbeat, service |
//! | [`retry`] | Bounded retry policy |
//! | [`settings`] | Mutable capture settings |

// ============================================================================
// Modules
// ============================================================================

/// Relay and discovery configuration.
pub mod config;

/// Discovery client for the calling process.
pub mod discovery;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for relay entities.
pub mod identifiers;

/// Bounded log store for captured browser events.
pub mod logs;

/// Wire protocol message types.
pub mod protocol;

/// The relay core: connection ownership, correlation, liveness.
pub mod relay;

/// Bounded retry with capped backoff.
pub mod retry;

/// Mutable capture settings.
pub mod settings;

/// HTTP route wiring.
mod server;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{DiscoveryConfig, RelayConfig, DEFAULT_PORT};

// Discovery
pub use discovery::DiscoveryClient;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, RequestId};

// Log types
pub use logs::{ConsoleEntry, LogQueryResult, LogStore, NetworkEntry};

// Protocol types
pub use protocol::{
    IdentityProbe, InboundFrame, OutboundFrame, ReplyKind, ServerIdentity, StatusReport,
    IDENTITY_PATH, IDENTITY_SIGNATURE,
};

// Relay types
pub use relay::{
    ConnectionState, DomAction, NavigationOutcome, RelayService, Screenshot, ScreenshotFormat,
};

// Retry policy
pub use retry::RetryPolicy;

// Settings
pub use settings::{Settings, SettingsPatch};
