//! Server internals: configuration, startup coordination, and the gRPC
//! service.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env argument parsing and validated runtime config.
//! - [`cluster`] - coordination-store access, worker-id allocation, and
//!   the peer sanity check that gates serving.
//! - [`service`] - the `floe.IdWorker` gRPC handler.
//! - [`telemetry`] - tracing subscriber setup.

pub mod cluster;
pub mod config;
pub mod service;
pub mod telemetry;
