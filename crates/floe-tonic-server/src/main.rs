#![doc = include_str!("../README.md")]

mod server;

use std::sync::Arc;

use clap::Parser;
use floe_tonic_core::floe::TimeSource;
use floe_tonic_core::proto::{FILE_DESCRIPTOR_SET, id_worker_server::IdWorkerServer};
use floe_tonic_core::types::{Clock, Generator};
use server::cluster::allocator::WorkerIdAllocator;
use server::cluster::error::BootstrapError;
use server::cluster::etcd::EtcdStore;
use server::cluster::sanity::{PeerSanityChecker, TonicPeerRpc, discover_peers};
use server::cluster::store::{CoordinationStore, StoreError};
use server::config::{CliArgs, ServerConfig};
use server::service::handler::IdService;
use server::telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in
// musl environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry();

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?
        .block_on(run(config))
}

/// The startup state machine:
/// `Init -> (SanityCheck) -> LoadDatacenterId -> ClaimWorkerId ->
/// ConstructGenerator -> Serving`.
///
/// Strictly sequential, and every failure is terminal: serving with an
/// unverified worker id or an undetected clock problem risks silent
/// duplicate IDs across the fleet, which is strictly worse than refusing
/// to start.
async fn run(config: ServerConfig) -> anyhow::Result<()> {
    if !config.startup_delay.is_zero() {
        tracing::info!("delaying bootstrap by {:?}", config.startup_delay);
        tokio::time::sleep(config.startup_delay).await;
    }

    let store = EtcdStore::connect(&config.coordination_endpoints, config.lease_ttl).await?;

    if config.skip_sanity_checks {
        tracing::warn!("peer sanity checks are disabled by configuration");
    } else {
        let peers = discover_peers(&store, &config.registry_path).await?;
        tracing::info!("cross-checking {} registered peer(s)", peers.len());
        PeerSanityChecker::new(TonicPeerRpc {
            timeout: config.peer_rpc_timeout,
        })
        .check(&peers, Clock::default().current_millis())
        .await?;
    }

    let datacenter_id = load_datacenter_id(&config, &store).await?;
    let worker_id = WorkerIdAllocator::new(&store, &config.registry_path, &config.advertised_addr)
        .allocate(config.worker_id)
        .await?;

    let generator = Arc::new(Generator::new(datacenter_id, worker_id, Clock::default())?);
    tracing::info!("generator ready: datacenter {datacenter_id}, worker {worker_id}");

    serve(config, generator).await
}

/// Resolves the datacenter id: static override first, else a single read
/// from the coordination store.
async fn load_datacenter_id<S>(config: &ServerConfig, store: &S) -> Result<u64, BootstrapError>
where
    S: CoordinationStore,
{
    if let Some(datacenter_id) = config.datacenter_id {
        tracing::info!("using statically configured datacenter id {datacenter_id}");
        return Ok(datacenter_id);
    }

    let value = store.read(&config.datacenter_id_path).await?.ok_or_else(|| {
        BootstrapError::DatacenterIdUnavailable {
            path: config.datacenter_id_path.clone(),
        }
    })?;
    let datacenter_id =
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| StoreError::MalformedValue {
                path: config.datacenter_id_path.clone(),
                reason: format!("{value:?} is not a datacenter id"),
            })?;

    tracing::info!(
        "loaded datacenter id {datacenter_id} from {}",
        config.datacenter_id_path
    );
    Ok(datacenter_id)
}

async fn serve(config: ServerConfig, generator: Arc<Generator>) -> anyhow::Result<()> {
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<IdWorkerServer<IdService>>()
        .await;

    let service = IdService::new(generator);

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let listener = TcpListener::bind(&config.server_addr).await?;
    let incoming = TcpListenerStream::new(listener);
    tracing::info!("ID service listening on {}", config.server_addr);

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_id_service(service))
        .serve_with_incoming_shutdown(incoming, shutdown_signal(health_reporter))
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn build_id_service(service: IdService) -> IdWorkerServer<IdService> {
    IdWorkerServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn shutdown_signal(health_reporter: HealthReporter) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");

    health_reporter
        .set_not_serving::<IdWorkerServer<IdService>>()
        .await;
}
