//! Liveness monitoring.
//!
//! One monitor task runs per connection. Each tick it checks how long the
//! peer has been silent: past the liveness timeout it declares the
//! connection dead (reject all pending requests, force-close the
//! transport, back to disconnected); otherwise it sends a heartbeat frame
//! plus a transport-level ping and goes back to sleep.
//!
//! Failure handling is idempotent. The force-close gate in the connection
//! manager succeeds exactly once per connection, so a second overdue tick
//! after the transition, or a racing event-loop cleanup, is a no-op.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::identifiers::ConnectionId;
use crate::protocol::OutboundFrame;

use super::connection::LIVENESS_CLOSE_CODE;
use super::service::RelayCore;

// ============================================================================
// Monitor Task
// ============================================================================

/// Runs the heartbeat monitor for connection `id` until that connection
/// is gone or declared dead.
pub(crate) async fn run(core: Arc<RelayCore>, id: ConnectionId) {
    debug_assert!(
        core.config.liveness_timeout > core.config.heartbeat_interval,
        "liveness timeout must exceed the probe interval"
    );

    let mut ticker = interval(core.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately.
    ticker.tick().await;

    debug!(connection = %id, "Heartbeat monitor started");

    loop {
        ticker.tick().await;

        if core.manager.current_id() != Some(id) {
            // Replaced or closed; the monitor retires with it.
            break;
        }

        if core
            .manager
            .liveness_overdue(id, core.config.liveness_timeout)
        {
            // Exactly one transition per connection: the gate fails if
            // eviction or event-loop cleanup got there first.
            if core
                .manager
                .force_close_if_current(id, LIVENESS_CLOSE_CODE, "liveness timeout")
            {
                core.registry
                    .reject_all(|| Error::connection_lost("liveness timeout"));
                warn!(
                    connection = %id,
                    timeout_ms = core.config.liveness_timeout.as_millis() as u64,
                    "Peer declared dead after liveness timeout"
                );
            }
            break;
        }

        // Healthy: probe. Any inbound frame refreshes liveness, not just
        // the heartbeat response.
        if core.manager.send(&OutboundFrame::Heartbeat).is_err() {
            break;
        }
        core.manager.ping(id);
        trace!(connection = %id, "Heartbeat probe sent");
    }

    debug!(connection = %id, "Heartbeat monitor stopped");
}
