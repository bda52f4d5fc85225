//! The relay core: connection ownership, correlation, liveness.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐        WebSocket        ┌─────────────────┐
//! │ RelayService │◄───────────────────────►│  Browser agent  │
//! │              │      localhost:PORT     │  (peer)         │
//! │  Connection  │                         └─────────────────┘
//! │  Manager     │
//! │  Correlation │        HTTP             ┌─────────────────┐
//! │  Registry    │◄───────────────────────►│  Tool caller    │
//! │  Heartbeat   │  /.identity  /status    │  (discovery)    │
//! └──────────────┘                         └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Single live peer connection and its event loop |
//! | `registry` | Pending-request correlation table |
//! | `heartbeat` | Periodic liveness probing and timeout |
//! | `service` | Owned service object and caller-facing operations |

// ============================================================================
// Submodules
// ============================================================================

/// Single live peer connection and its event loop.
pub mod connection;

/// Periodic liveness probing and timeout.
pub(crate) mod heartbeat;

/// Pending-request correlation table.
pub mod registry;

/// Owned service object and caller-facing operations.
pub mod service;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectionManager, ConnectionState};
pub use registry::CorrelationRegistry;
pub use service::{DomAction, NavigationOutcome, RelayService, Screenshot, ScreenshotFormat};
