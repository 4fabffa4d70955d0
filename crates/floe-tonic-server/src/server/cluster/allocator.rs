//! Worker slot allocation.

use floe_tonic_core::floe::MAX_WORKER_ID;

use crate::server::cluster::error::BootstrapError;
use crate::server::cluster::store::{CoordinationStore, CreateOutcome};

/// Claims a worker id for this process by registering in the shared
/// coordination store.
///
/// The registry is the fleet's mutual-exclusion mechanism for the worker
/// half of the (datacenter, worker) identity: whoever atomically creates
/// `registry_path/<idx>` owns worker id `idx` for as long as its
/// liveness-bound registration survives.
pub struct WorkerIdAllocator<'a, S> {
    store: &'a S,
    registry_path: &'a str,
    advertised_addr: &'a str,
}

impl<'a, S> WorkerIdAllocator<'a, S>
where
    S: CoordinationStore,
{
    pub fn new(store: &'a S, registry_path: &'a str, advertised_addr: &'a str) -> Self {
        Self {
            store,
            registry_path,
            advertised_addr,
        }
    }

    /// Resolves this process's worker id.
    ///
    /// A `configured` override (already range-validated by the config
    /// layer) is used directly with no store interaction. Otherwise each
    /// candidate index is tried in ascending order with an atomic
    /// create-if-absent: a held slot means move on to the next candidate,
    /// not re-contend. One linear scan, no backoff.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::WorkerIdExhausted`] when every slot in range is
    /// held, and [`BootstrapError::Coordination`] on any store failure;
    /// both are fatal to startup.
    pub async fn allocate(&self, configured: Option<u64>) -> Result<u64, BootstrapError> {
        if let Some(worker_id) = configured {
            tracing::info!("using statically configured worker id {worker_id}");
            return Ok(worker_id);
        }

        for candidate in 0..=MAX_WORKER_ID {
            let path = format!("{}/{candidate}", self.registry_path.trim_end_matches('/'));
            match self.store.create_live(&path, self.advertised_addr).await? {
                CreateOutcome::Created => {
                    tracing::info!(
                        "claimed worker id {candidate} ({path} -> {})",
                        self.advertised_addr
                    );
                    return Ok(candidate);
                }
                CreateOutcome::AlreadyExists => continue,
            }
        }

        Err(BootstrapError::WorkerIdExhausted { max: MAX_WORKER_ID })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::cluster::store::testing::{MemoryStore, UnavailableStore};

    const REGISTRY: &str = "/t/workers";

    #[tokio::test]
    async fn first_process_claims_slot_zero() {
        let store = MemoryStore::new();
        let allocator = WorkerIdAllocator::new(&store, REGISTRY, "10.0.0.1:7609");

        assert_eq!(allocator.allocate(None).await.unwrap(), 0);
        assert_eq!(store.get("/t/workers/0").as_deref(), Some("10.0.0.1:7609"));
    }

    #[tokio::test]
    async fn scan_skips_held_slots_and_returns_the_first_free_one() {
        let store = MemoryStore::new();
        for held in 0..3 {
            store.insert(&format!("{REGISTRY}/{held}"), "peer:1");
        }

        let allocator = WorkerIdAllocator::new(&store, REGISTRY, "10.0.0.9:7609");
        assert_eq!(allocator.allocate(None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn full_registry_is_fatal() {
        let store = MemoryStore::new();
        for held in 0..=MAX_WORKER_ID {
            store.insert(&format!("{REGISTRY}/{held}"), "peer:1");
        }

        let allocator = WorkerIdAllocator::new(&store, REGISTRY, "10.0.0.9:7609");
        assert!(matches!(
            allocator.allocate(None).await,
            Err(BootstrapError::WorkerIdExhausted { max }) if max == MAX_WORKER_ID
        ));
    }

    #[tokio::test]
    async fn configured_override_bypasses_the_store() {
        // UnavailableStore fails every operation, so reaching the store at
        // all would error: the override must short-circuit before it.
        let store = UnavailableStore;
        let allocator = WorkerIdAllocator::new(&store, REGISTRY, "10.0.0.9:7609");
        assert_eq!(allocator.allocate(Some(7)).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn store_failure_aborts_the_scan() {
        let store = UnavailableStore;
        let allocator = WorkerIdAllocator::new(&store, REGISTRY, "10.0.0.9:7609");
        assert!(matches!(
            allocator.allocate(None).await,
            Err(BootstrapError::Coordination(_))
        ));
    }
}
