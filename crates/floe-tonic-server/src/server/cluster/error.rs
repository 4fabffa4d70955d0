//! Fatal bootstrap errors.
//!
//! Every variant aborts startup: serving with an unverified worker id or
//! an out-of-tolerance clock risks silent duplicate IDs across the fleet,
//! which no downstream consumer can detect. There is no degraded or
//! partial serving mode.

use crate::server::cluster::store::StoreError;

/// Errors that terminate the startup sequence.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Every worker slot in `0..=max` is held by a live process; this
    /// datacenter is at its concurrency capacity.
    #[error("no free worker id in 0..={max}: every registry slot is held by a live process")]
    WorkerIdExhausted { max: u64 },

    /// A peer's self-reported worker id disagrees with the registry key it
    /// is listed under. The registry is corrupt or stale and must be
    /// repaired by an operator.
    #[error("peer {addr} is registered as worker {registered} but reports worker {reported}")]
    PeerMismatch {
        addr: String,
        registered: u64,
        reported: i64,
    },

    /// A registered peer could not be reached or failed the identity RPC.
    /// A registry entry without a reachable process behind it is an
    /// inconsistency, not a tolerable degradation.
    #[error("peer {addr} (worker {worker_id}) is unreachable: {reason}")]
    PeerUnreachable {
        addr: String,
        worker_id: u64,
        reason: String,
    },

    /// The local clock disagrees with the mean of peer clocks by more than
    /// the fixed tolerance.
    #[error(
        "local clock {local_millis} ms deviates {deviation_millis} ms from the fleet mean \
         {mean_millis} ms (tolerance {tolerance_millis} ms)"
    )]
    ClockSkewExceeded {
        local_millis: i64,
        mean_millis: i64,
        deviation_millis: i64,
        tolerance_millis: i64,
    },

    /// A registry child key or value does not parse as a worker
    /// registration. Treated like [`BootstrapError::PeerMismatch`]: the
    /// registry is not in a state worth trusting.
    #[error("registry entry {key:?} under {path} is malformed: {reason}")]
    MalformedRegistration {
        path: String,
        key: String,
        reason: String,
    },

    /// No datacenter id override was configured and the coordination store
    /// has no value at the configured path.
    #[error("no datacenter id at {path} and no static override configured")]
    DatacenterIdUnavailable { path: String },

    /// The coordination store could not serve a required operation.
    #[error(transparent)]
    Coordination(#[from] StoreError),
}
