//! Canonical types shared by the server and its peers.
//!
//! The ID layout, epoch, and clock are a fleet-wide compile-time contract:
//! every process must be built with the same values or IDs from different
//! processes are neither sortable nor collision-free relative to each
//! other. Centralizing the aliases here keeps the server and any embedded
//! clients in agreement.

use floe::{IdGenerator, WallClock};

/// The system clock used by ID generators for timestamp encoding.
///
/// Wall-clock on purpose: the generator detects and refuses backwards
/// movement rather than having a monotonic wrapper hide it.
pub type Clock = WallClock;

/// The epoch offset used as the zero-point for timestamp fields.
pub const EPOCH: core::time::Duration = floe::EPOCH;

/// The generator type a serving process hands to its RPC layer.
pub type Generator = IdGenerator<Clock>;
