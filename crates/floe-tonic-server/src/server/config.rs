use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use floe_tonic_core::floe::{MAX_DATACENTER_ID, MAX_WORKER_ID};

/// Runtime configuration for the `floe-tonic-server` binary.
///
/// Everything is parsed from CLI arguments or environment variables, with
/// defaults suitable for a single-node development setup. The identity
/// fields (`datacenter_id`, `worker_id`) are normally left unset so the
/// process resolves them through the coordination store at startup;
/// setting them bypasses that machinery and is intended for tests and
/// fixed-topology deployments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "floe-tonic-server",
    version,
    about = "A coordinated gRPC service for snowflake ID generation"
)]
pub struct CliArgs {
    /// TCP address the gRPC server listens on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:7609"))]
    pub server_addr: String,

    /// Host peers use to dial this process back during their own sanity
    /// checks. Written into the worker registry as `<host>:<port>`, with
    /// the port taken from `SERVER_ADDR`.
    ///
    /// Environment variable: `ADVERTISED_HOST`
    #[arg(long, env = "ADVERTISED_HOST", default_value_t = String::from("127.0.0.1"))]
    pub advertised_host: String,

    /// Static datacenter id override. When unset, the id is read once from
    /// the coordination store at `--datacenter-id-path`.
    ///
    /// Environment variable: `DATACENTER_ID`
    #[arg(long, env = "DATACENTER_ID")]
    pub datacenter_id: Option<u64>,

    /// Static worker id override. When unset, a slot is claimed from the
    /// worker registry at startup.
    ///
    /// Environment variable: `WORKER_ID`
    #[arg(long, env = "WORKER_ID")]
    pub worker_id: Option<u64>,

    /// Disables the startup peer sanity check (worker identity and clock
    /// agreement). Only safe when something else guarantees registry
    /// integrity and clock sync.
    ///
    /// Environment variable: `SKIP_SANITY_CHECKS`
    #[arg(long, env = "SKIP_SANITY_CHECKS", default_value_t = false)]
    pub skip_sanity_checks: bool,

    /// Milliseconds to sleep before bootstrap begins. Useful to stagger
    /// fleet-wide restarts so processes do not all contend for registry
    /// slots in the same instant.
    ///
    /// Environment variable: `STARTUP_DELAY_MS`
    #[arg(long, env = "STARTUP_DELAY_MS", default_value_t = 0)]
    pub startup_delay_ms: u64,

    /// Comma-separated etcd endpoints for the coordination store.
    ///
    /// Environment variable: `COORDINATION_ENDPOINTS`
    #[arg(
        long,
        env = "COORDINATION_ENDPOINTS",
        value_delimiter = ',',
        default_value = "http://127.0.0.1:2379"
    )]
    pub coordination_endpoints: Vec<String>,

    /// Registry prefix whose children are the claimed worker slots.
    ///
    /// Environment variable: `REGISTRY_PATH`
    #[arg(long, env = "REGISTRY_PATH", default_value_t = String::from("/floe/workers"))]
    pub registry_path: String,

    /// Coordination-store key holding this fleet's datacenter id.
    ///
    /// Environment variable: `DATACENTER_ID_PATH`
    #[arg(long, env = "DATACENTER_ID_PATH", default_value_t = String::from("/floe/datacenter-id"))]
    pub datacenter_id_path: String,

    /// Per-peer connect and call timeout for the sanity check, in
    /// milliseconds. Bounds how long one unreachable peer can stall
    /// bootstrap.
    ///
    /// Environment variable: `PEER_RPC_TIMEOUT_MS`
    #[arg(long, env = "PEER_RPC_TIMEOUT_MS", default_value_t = 2_000)]
    pub peer_rpc_timeout_ms: u64,

    /// TTL in seconds for the registration lease. The registry slot is
    /// reclaimed this long after the process stops renewing it.
    ///
    /// Environment variable: `LEASE_TTL_SECS`
    #[arg(long, env = "LEASE_TTL_SECS", default_value_t = 5)]
    pub lease_ttl_secs: u64,

    /// Number of tokio worker threads for the RPC server. Defaults to the
    /// CPU count.
    ///
    /// Environment variable: `WORKER_THREADS`
    #[arg(long, env = "WORKER_THREADS")]
    pub worker_threads: Option<usize>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    /// `<advertised_host>:<listen_port>`, the value written into the
    /// worker registry.
    pub advertised_addr: String,
    pub datacenter_id: Option<u64>,
    pub worker_id: Option<u64>,
    pub skip_sanity_checks: bool,
    pub startup_delay: Duration,
    pub coordination_endpoints: Vec<String>,
    pub registry_path: String,
    pub datacenter_id_path: String,
    pub peer_rpc_timeout: Duration,
    pub lease_ttl: Duration,
    pub worker_threads: usize,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let Some((_, port)) = args.server_addr.rsplit_once(':') else {
            bail!("SERVER_ADDR {:?} has no port", args.server_addr);
        };
        if port.parse::<u16>().is_err() {
            bail!("SERVER_ADDR {:?} has an invalid port", args.server_addr);
        }

        if let Some(id) = args.datacenter_id {
            if id > MAX_DATACENTER_ID {
                bail!("DATACENTER_ID ({id}) exceeds the 5-bit field (max = {MAX_DATACENTER_ID})");
            }
        }

        if let Some(id) = args.worker_id {
            if id > MAX_WORKER_ID {
                bail!("WORKER_ID ({id}) exceeds the 5-bit field (max = {MAX_WORKER_ID})");
            }
        }

        if args.coordination_endpoints.is_empty() {
            bail!("COORDINATION_ENDPOINTS must name at least one endpoint");
        }

        if args.lease_ttl_secs == 0 {
            bail!("LEASE_TTL_SECS must be greater than 0");
        }

        let worker_threads = args.worker_threads.unwrap_or_else(num_cpus::get);
        if worker_threads == 0 {
            bail!("WORKER_THREADS must be greater than 0");
        }

        Ok(Self {
            advertised_addr: format!("{}:{}", args.advertised_host, port),
            server_addr: args.server_addr,
            datacenter_id: args.datacenter_id,
            worker_id: args.worker_id,
            skip_sanity_checks: args.skip_sanity_checks,
            startup_delay: Duration::from_millis(args.startup_delay_ms),
            coordination_endpoints: args.coordination_endpoints,
            registry_path: args.registry_path,
            datacenter_id_path: args.datacenter_id_path,
            peer_rpc_timeout: Duration::from_millis(args.peer_rpc_timeout_ms),
            lease_ttl: Duration::from_secs(args.lease_ttl_secs),
            worker_threads,
        })
    }
}
