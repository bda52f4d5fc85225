//! Request/reply correlation.
//!
//! Every asynchronous relay operation registers a pending request keyed
//! by its caller-generated [`RequestId`] and waits on a oneshot future.
//! An entry is removed exactly once, by whichever of {matching reply,
//! timeout, connection loss} happens first; later occurrences are no-ops.
//! Removal always happens under the table lock before the future is
//! settled, so the race between "timeout" and "late reply" has exactly
//! one winner.

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{InboundFrame, ReplyKind};

// ============================================================================
// Types
// ============================================================================

/// Receiver half of a pending request.
pub type ReplyReceiver = oneshot::Receiver<Result<InboundFrame>>;

/// A registered request waiting for its reply.
struct PendingRequest {
    /// Reply class this request expects.
    kind: ReplyKind,
    /// Insertion sequence, used by the legacy oldest-pending fallback.
    seq: u64,
    /// Registration time.
    created_at: Instant,
    /// Settles the caller's future.
    tx: oneshot::Sender<Result<InboundFrame>>,
}

// ============================================================================
// CorrelationRegistry
// ============================================================================

/// Table of in-flight correlated requests.
///
/// The registry never holds two entries with the same [`RequestId`];
/// registering a duplicate fails instead of silently replacing the
/// earlier entry.
#[derive(Default)]
pub struct CorrelationRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    pending: FxHashMap<RequestId, PendingRequest>,
    next_seq: u64,
}

impl CorrelationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request and returns the receiver its reply
    /// (or failure) will be delivered on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRequest`] if `request_id` is already
    /// pending.
    pub fn register(&self, request_id: RequestId, kind: ReplyKind) -> Result<ReplyReceiver> {
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.lock();
        if inner.pending.contains_key(&request_id) {
            return Err(Error::duplicate_request(request_id));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.pending.insert(
            request_id,
            PendingRequest {
                kind,
                seq,
                created_at: Instant::now(),
                tx,
            },
        );

        trace!(request_id = %request_id, ?kind, "Request registered");
        Ok(rx)
    }

    /// Resolves the entry matching `request_id` with `frame`.
    ///
    /// Returns `false` when no entry matches (late duplicate, unknown id,
    /// or reply class mismatch); such frames are ignored without error.
    pub fn resolve(&self, request_id: RequestId, frame: InboundFrame) -> bool {
        let entry = {
            let mut inner = self.inner.lock();
            let kind_matches = inner
                .pending
                .get(&request_id)
                .is_some_and(|pending| pending.kind == frame_kind(&frame));
            if kind_matches {
                inner.pending.remove(&request_id)
            } else {
                None
            }
        };

        match entry {
            Some(pending) => {
                trace!(
                    request_id = %request_id,
                    elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                    "Request resolved"
                );
                let _ = pending.tx.send(Ok(frame));
                true
            }
            None => {
                debug!(request_id = %request_id, "Reply for unknown request ignored");
                false
            }
        }
    }

    /// Resolves the *oldest* pending entry of `kind` with an unlabeled
    /// reply frame.
    ///
    /// Compatibility shim for peers that omit `requestId` on screenshot
    /// replies; not a general correlation rule. With two requests of the
    /// same kind in flight this can misroute, which is why it is gated by
    /// configuration at the call site.
    pub fn resolve_unlabeled(&self, kind: ReplyKind, frame: InboundFrame) -> bool {
        let entry = {
            let mut inner = self.inner.lock();
            let oldest = inner
                .pending
                .iter()
                .filter(|(_, p)| p.kind == kind)
                .min_by_key(|(_, p)| p.seq)
                .map(|(id, _)| *id);

            oldest.and_then(|id| inner.pending.remove(&id).map(|p| (id, p)))
        };

        match entry {
            Some((request_id, pending)) => {
                debug!(
                    request_id = %request_id,
                    ?kind,
                    "Unlabeled reply resolved against oldest pending request"
                );
                let _ = pending.tx.send(Ok(frame));
                true
            }
            None => {
                debug!(?kind, "Unlabeled reply with no pending request ignored");
                false
            }
        }
    }

    /// Removes a pending entry without settling it.
    ///
    /// Used by the timeout path and by send failures. Returns `false`
    /// when the entry was already gone (a reply or rejection won).
    pub fn remove(&self, request_id: RequestId) -> bool {
        self.inner.lock().pending.remove(&request_id).is_some()
    }

    /// Empties the table, rejecting every pending request.
    ///
    /// `make_err` is invoked once per entry so each future receives its
    /// own error value.
    pub fn reject_all<F>(&self, make_err: F)
    where
        F: Fn() -> Error,
    {
        let drained: Vec<PendingRequest> = {
            let mut inner = self.inner.lock();
            inner.pending.drain().map(|(_, p)| p).collect()
        };

        let count = drained.len();
        for pending in drained {
            let _ = pending.tx.send(Err(make_err()));
        }

        if count > 0 {
            debug!(count, "Rejected all pending requests");
        }
    }

    /// Returns the number of in-flight requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns `true` if no requests are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps a reply frame to the class it settles.
fn frame_kind(frame: &InboundFrame) -> ReplyKind {
    frame
        .correlation()
        .map(|(_, kind)| kind)
        // Non-reply frames never reach resolve(); fall through to a kind
        // that cannot match a pending entry of another class.
        .unwrap_or(ReplyKind::Screenshot)
}

// ============================================================================
// Tests
// ============================================================================
