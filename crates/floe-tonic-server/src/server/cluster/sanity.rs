//! Startup peer sanity checking.
//!
//! Before a process may serve, it cross-examines every already-registered
//! peer: does the process behind each registry entry actually claim the
//! worker id the entry says it has, and does the local clock agree with
//! the fleet's consensus notion of "now"? A mismatch means the registry
//! cannot be trusted; excessive skew means locally minted IDs would not be
//! usefully time-ordered against the fleet's, and a later clock-backwards
//! event could turn the skew into duplicates. Either way: refuse to start.

use core::time::Duration;
use floe_tonic_core::proto::id_worker_client::IdWorkerClient;
use floe_tonic_core::proto::{GetTimestampRequest, GetWorkerIdRequest};
use tonic::Status;
use tonic::transport::Endpoint;

use crate::server::cluster::error::BootstrapError;
use crate::server::cluster::store::CoordinationStore;

/// Maximum tolerated disagreement between the local clock and the mean of
/// peer clocks.
pub const MAX_PEER_CLOCK_SKEW: Duration = Duration::from_millis(10_000);

/// A registered peer, as read from the worker registry.
///
/// Rebuilt fresh from the store's current children on every check; never
/// cached across runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub host: String,
    pub port: u16,
    /// The worker id implied by the peer's registry key.
    pub worker_id: u64,
}

impl Peer {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What a peer reports about itself when asked directly.
#[derive(Clone, Copy, Debug)]
pub struct PeerIdentity {
    pub worker_id: i64,
    pub timestamp_ms: i64,
}

/// Abstract client for the two identity RPCs the sanity check needs.
///
/// The checker is generic over this so tests can script peer behavior
/// without sockets; [`TonicPeerRpc`] is the production implementation.
#[allow(async_fn_in_trait)]
pub trait PeerRpc {
    /// Asks `peer` for its claimed worker id and current timestamp.
    async fn identify(&self, peer: &Peer) -> Result<PeerIdentity, Status>;
}

/// [`PeerRpc`] over a short-lived gRPC channel per peer.
///
/// `timeout` bounds both the connection attempt and each call, so one
/// wedged peer cannot hang bootstrap indefinitely.
#[derive(Clone, Copy, Debug)]
pub struct TonicPeerRpc {
    pub timeout: Duration,
}

impl PeerRpc for TonicPeerRpc {
    async fn identify(&self, peer: &Peer) -> Result<PeerIdentity, Status> {
        let endpoint = Endpoint::from_shared(format!("http://{}", peer.addr()))
            .map_err(|e| Status::invalid_argument(e.to_string()))?
            .connect_timeout(self.timeout)
            .timeout(self.timeout);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| Status::unavailable(e.to_string()))?;
        let mut client = IdWorkerClient::new(channel);

        let worker_id = client
            .get_worker_id(GetWorkerIdRequest {})
            .await?
            .into_inner()
            .worker_id;
        let timestamp_ms = client
            .get_timestamp(GetTimestampRequest {})
            .await?
            .into_inner()
            .timestamp_ms;

        Ok(PeerIdentity {
            worker_id,
            timestamp_ms,
        })
    }
}

/// Reads the current peer set from the worker registry.
///
/// Ensures the registry prefix exists first (idempotent; losing a creation
/// race to another booting process is fine), then parses each child as
/// `<worker id> -> <host>:<port>`. Anything unparsable is registry
/// corruption and fatal.
pub async fn discover_peers<S>(store: &S, registry_path: &str) -> Result<Vec<Peer>, BootstrapError>
where
    S: CoordinationStore,
{
    store.ensure_path(registry_path).await?;

    let children = store.list_children(registry_path).await?;
    let mut peers = Vec::with_capacity(children.len());
    for (key, value) in children {
        let malformed = |reason: String| BootstrapError::MalformedRegistration {
            path: registry_path.to_string(),
            key: key.clone(),
            reason,
        };

        let worker_id = key
            .parse::<u64>()
            .map_err(|_| malformed("key is not a worker id".to_string()))?;
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| malformed(format!("value {value:?} is not <host>:<port>")))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| malformed(format!("port in {value:?} is not a u16")))?;

        peers.push(Peer {
            host: host.to_string(),
            port,
            worker_id,
        });
    }

    peers.sort_by_key(|peer| peer.worker_id);
    Ok(peers)
}

/// Cross-validates registered peers before this process may serve.
pub struct PeerSanityChecker<R> {
    rpc: R,
    tolerance: Duration,
}

impl<R> PeerSanityChecker<R>
where
    R: PeerRpc,
{
    pub fn new(rpc: R) -> Self {
        Self {
            rpc,
            tolerance: MAX_PEER_CLOCK_SKEW,
        }
    }

    /// Runs the check against `peers`, comparing their clocks to
    /// `local_now_millis`.
    ///
    /// An empty peer list succeeds trivially (cold start: nothing to check
    /// against). Otherwise every peer must be reachable and report the
    /// worker id its registry key claims, and the local clock must sit
    /// within [`MAX_PEER_CLOCK_SKEW`] of the arithmetic mean of peer
    /// clocks.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::PeerUnreachable`], [`BootstrapError::PeerMismatch`],
    /// or [`BootstrapError::ClockSkewExceeded`]; all fatal.
    pub async fn check(&self, peers: &[Peer], local_now_millis: u64) -> Result<(), BootstrapError> {
        if peers.is_empty() {
            tracing::info!("worker registry is empty; nothing to cross-check");
            return Ok(());
        }

        let mut timestamps = Vec::with_capacity(peers.len());
        for peer in peers {
            let identity =
                self.rpc
                    .identify(peer)
                    .await
                    .map_err(|status| BootstrapError::PeerUnreachable {
                        addr: peer.addr(),
                        worker_id: peer.worker_id,
                        reason: status.to_string(),
                    })?;

            if identity.worker_id != peer.worker_id as i64 {
                return Err(BootstrapError::PeerMismatch {
                    addr: peer.addr(),
                    registered: peer.worker_id,
                    reported: identity.worker_id,
                });
            }

            tracing::debug!(
                "peer {} confirmed worker {} at {} ms",
                peer.addr(),
                identity.worker_id,
                identity.timestamp_ms
            );
            timestamps.push(identity.timestamp_ms);
        }

        // Sum widened to i128: a fleet of i64 millisecond timestamps must
        // not overflow the accumulator.
        let sum: i128 = timestamps.iter().map(|&ts| ts as i128).sum();
        let mean = (sum / timestamps.len() as i128) as i64;
        let local = local_now_millis as i64;
        let deviation = (local - mean).abs();
        let tolerance = self.tolerance.as_millis() as i64;

        if deviation > tolerance {
            return Err(BootstrapError::ClockSkewExceeded {
                local_millis: local,
                mean_millis: mean,
                deviation_millis: deviation,
                tolerance_millis: tolerance,
            });
        }

        tracing::info!(
            "clock agrees with {} peer(s): deviation {deviation} ms within {tolerance} ms",
            peers.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::cluster::store::testing::{MemoryStore, UnavailableStore};
    use std::collections::HashMap;

    const T: i64 = 1_700_000_000_000;

    fn peer(worker_id: u64, port: u16) -> Peer {
        Peer {
            host: "10.0.0.1".to_string(),
            port,
            worker_id,
        }
    }

    /// Scripted peer responses keyed by registry worker id.
    #[derive(Default)]
    struct ScriptedRpc {
        replies: HashMap<u64, PeerIdentity>,
        unreachable: Vec<u64>,
    }

    impl ScriptedRpc {
        fn reply(mut self, registered: u64, reported: i64, timestamp_ms: i64) -> Self {
            self.replies.insert(
                registered,
                PeerIdentity {
                    worker_id: reported,
                    timestamp_ms,
                },
            );
            self
        }

        fn unreachable(mut self, registered: u64) -> Self {
            self.unreachable.push(registered);
            self
        }
    }

    impl PeerRpc for ScriptedRpc {
        async fn identify(&self, peer: &Peer) -> Result<PeerIdentity, Status> {
            if self.unreachable.contains(&peer.worker_id) {
                return Err(Status::unavailable("connection refused"));
            }
            self.replies
                .get(&peer.worker_id)
                .copied()
                .ok_or_else(|| Status::unavailable("no such peer"))
        }
    }

    #[tokio::test]
    async fn empty_peer_list_passes_unconditionally() {
        let checker = PeerSanityChecker::new(ScriptedRpc::default());
        checker.check(&[], T as u64).await.unwrap();
    }

    #[tokio::test]
    async fn skew_within_tolerance_passes() {
        // Mean of [T, T+2000, T+20000] is T+7333: inside the 10s budget
        // even though one peer individually is 20s ahead.
        let rpc = ScriptedRpc::default()
            .reply(0, 0, T)
            .reply(1, 1, T + 2_000)
            .reply(2, 2, T + 20_000);
        let peers = [peer(0, 7600), peer(1, 7601), peer(2, 7602)];

        let checker = PeerSanityChecker::new(rpc);
        checker.check(&peers, T as u64).await.unwrap();
    }

    #[tokio::test]
    async fn skew_beyond_tolerance_is_fatal() {
        // Mean of [T, T+35000] is T+17500: 17.5s from local, over budget.
        let rpc = ScriptedRpc::default().reply(0, 0, T).reply(1, 1, T + 35_000);
        let peers = [peer(0, 7600), peer(1, 7601)];

        let checker = PeerSanityChecker::new(rpc);
        let err = checker.check(&peers, T as u64).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::ClockSkewExceeded {
                deviation_millis: 17_500,
                mean_millis,
                ..
            } if mean_millis == T + 17_500
        ));
    }

    #[tokio::test]
    async fn reported_id_disagreeing_with_registry_key_is_fatal() {
        let rpc = ScriptedRpc::default().reply(3, 5, T);
        let peers = [peer(3, 7603)];

        let checker = PeerSanityChecker::new(rpc);
        let err = checker.check(&peers, T as u64).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::PeerMismatch {
                registered: 3,
                reported: 5,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_peer_is_fatal_not_a_warning() {
        let rpc = ScriptedRpc::default().reply(0, 0, T).unreachable(1);
        let peers = [peer(0, 7600), peer(1, 7601)];

        let checker = PeerSanityChecker::new(rpc);
        let err = checker.check(&peers, T as u64).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::PeerUnreachable { worker_id: 1, .. }
        ));
    }

    #[tokio::test]
    async fn discovery_parses_registry_children() {
        let store = MemoryStore::new();
        store.insert("/t/workers/2", "10.0.0.2:7609");
        store.insert("/t/workers/0", "10.0.0.1:7609");

        let peers = discover_peers(&store, "/t/workers").await.unwrap();
        assert_eq!(
            peers,
            vec![
                Peer {
                    host: "10.0.0.1".to_string(),
                    port: 7609,
                    worker_id: 0,
                },
                Peer {
                    host: "10.0.0.2".to_string(),
                    port: 7609,
                    worker_id: 2,
                },
            ]
        );
    }

    #[tokio::test]
    async fn discovery_on_an_empty_registry_is_empty() {
        let store = MemoryStore::new();
        assert!(discover_peers(&store, "/t/workers").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_registry_entries_are_fatal() {
        let store = MemoryStore::new();
        store.insert("/t/workers/abc", "10.0.0.1:7609");
        assert!(matches!(
            discover_peers(&store, "/t/workers").await,
            Err(BootstrapError::MalformedRegistration { .. })
        ));

        let store = MemoryStore::new();
        store.insert("/t/workers/0", "no-port-here");
        assert!(matches!(
            discover_peers(&store, "/t/workers").await,
            Err(BootstrapError::MalformedRegistration { .. })
        ));
    }

    #[tokio::test]
    async fn discovery_propagates_store_failure() {
        assert!(matches!(
            discover_peers(&UnavailableStore, "/t/workers").await,
            Err(BootstrapError::Coordination(_))
        ));
    }

    #[tokio::test]
    async fn ipv6_style_values_split_on_the_last_colon() {
        let store = MemoryStore::new();
        store.insert("/t/workers/0", "fd00::17:7609");
        let peers = discover_peers(&store, "/t/workers").await.unwrap();
        assert_eq!(peers[0].host, "fd00::17");
        assert_eq!(peers[0].port, 7609);
    }
}
