//! gRPC service implementation for snowflake ID generation.
//!
//! This module defines [`IdService`], the concrete implementation of the
//! [`IdWorker`] gRPC service defined in the protobuf specification. All
//! three RPCs read from one shared [`Generator`]: `get_id` mints, while
//! `get_worker_id` and `get_timestamp` expose the identity and clock that
//! booting peers cross-check during their own startup sanity phase.

use core::time::Duration;
use std::sync::Arc;

use floe_tonic_core::{
    Error,
    floe::IdGenStatus,
    proto::{
        GetIdRequest, GetIdResponse, GetTimestampRequest, GetTimestampResponse,
        GetWorkerIdRequest, GetWorkerIdResponse, id_worker_server::IdWorker,
    },
    types::Generator,
};
use tonic::{Request, Response, Status};

/// gRPC facade over one process-wide [`Generator`].
///
/// Cloneable and cheap to share: all clones poll the same generator, whose
/// internal mutex serializes the read-modify-write. An exhausted
/// millisecond is absorbed here as a 1 ms sleep between polls rather than
/// surfaced to the caller; a backwards-moving clock is surfaced as a
/// per-call `FAILED_PRECONDITION`.
#[derive(Clone)]
pub struct IdService {
    generator: Arc<Generator>,
}

impl IdService {
    pub fn new(generator: Arc<Generator>) -> Self {
        Self { generator }
    }
}

#[tonic::async_trait]
impl IdWorker for IdService {
    /// Mints one snowflake ID.
    ///
    /// Blocks (asynchronously) through sequence exhaustion: the wait is
    /// bounded by the next millisecond tick and is backpressure, not an
    /// error. A clock regression fails just this call; the process keeps
    /// serving and the caller decides whether to retry.
    async fn get_id(&self, _request: Request<GetIdRequest>) -> Result<Response<GetIdResponse>, Status> {
        let id = loop {
            match self.generator.poll_id() {
                Ok(IdGenStatus::Ready { id }) => break id,
                Ok(IdGenStatus::Pending { yield_for_ms }) => {
                    tokio::time::sleep(Duration::from_millis(yield_for_ms)).await;
                }
                Err(e) => {
                    tracing::warn!("refusing to generate: {e}");
                    return Err(Error::from(e).into());
                }
            }
        };

        Ok(Response::new(GetIdResponse { id: id.to_i64() }))
    }

    /// Returns the worker id this process claimed at startup.
    async fn get_worker_id(
        &self,
        _request: Request<GetWorkerIdRequest>,
    ) -> Result<Response<GetWorkerIdResponse>, Status> {
        Ok(Response::new(GetWorkerIdResponse {
            worker_id: self.generator.worker_id() as i64,
        }))
    }

    /// Returns the generator's current wall-clock reading.
    async fn get_timestamp(
        &self,
        _request: Request<GetTimestampRequest>,
    ) -> Result<Response<GetTimestampResponse>, Status> {
        Ok(Response::new(GetTimestampResponse {
            timestamp_ms: self.generator.current_millis() as i64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::cluster::sanity::{Peer, PeerRpc, TonicPeerRpc};
    use floe_tonic_core::floe::{SnowflakeId, WallClock};
    use floe_tonic_core::proto::id_worker_server::IdWorkerServer;
    use floe_tonic_core::types::Clock;
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;

    fn service(datacenter_id: u64, worker_id: u64) -> IdService {
        let generator = Generator::new(datacenter_id, worker_id, Clock::default()).unwrap();
        IdService::new(Arc::new(generator))
    }

    #[tokio::test]
    async fn get_id_returns_a_decodable_id() {
        let service = service(1, 9);

        let response = service.get_id(Request::new(GetIdRequest {})).await.unwrap();
        let id = SnowflakeId::from_i64(response.into_inner().id);

        assert_eq!(id.datacenter_id(), 1);
        assert_eq!(id.worker_id(), 9);
    }

    #[tokio::test]
    async fn ids_increase_across_calls() {
        let service = service(0, 0);

        let mut last = 0;
        for _ in 0..1_000 {
            let response = service.get_id(Request::new(GetIdRequest {})).await.unwrap();
            let id = response.into_inner().id;
            assert!(id > last);
            last = id;
        }
    }

    #[tokio::test]
    async fn identity_rpcs_report_generator_state() {
        let service = service(2, 17);

        let worker_id = service
            .get_worker_id(Request::new(GetWorkerIdRequest {}))
            .await
            .unwrap()
            .into_inner()
            .worker_id;
        assert_eq!(worker_id, 17);

        use floe_tonic_core::floe::TimeSource;
        let before = WallClock.current_millis() as i64;
        let timestamp_ms = service
            .get_timestamp(Request::new(GetTimestampRequest {}))
            .await
            .unwrap()
            .into_inner()
            .timestamp_ms;
        let after = WallClock.current_millis() as i64;
        assert!(timestamp_ms >= before && timestamp_ms <= after);
    }

    /// End-to-end: a booting peer's sanity RPC against a live server.
    #[tokio::test]
    async fn peer_rpc_round_trips_against_a_live_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tonic::transport::Server::builder()
            .add_service(IdWorkerServer::new(service(0, 11)))
            .serve_with_incoming(TcpListenerStream::new(listener));
        tokio::spawn(server);

        let rpc = TonicPeerRpc {
            timeout: Duration::from_secs(2),
        };
        let peer = Peer {
            host: "127.0.0.1".to_string(),
            port,
            worker_id: 11,
        };

        let identity = rpc.identify(&peer).await.unwrap();
        assert_eq!(identity.worker_id, 11);
        assert!(identity.timestamp_ms > 0);
    }

    #[tokio::test]
    async fn peer_rpc_times_out_against_a_dead_address() {
        let rpc = TonicPeerRpc {
            timeout: Duration::from_millis(200),
        };
        // Bind-then-drop yields a port with nothing listening on it.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let peer = Peer {
            host: "127.0.0.1".to_string(),
            port,
            worker_id: 0,
        };

        assert!(rpc.identify(&peer).await.is_err());
    }
}
