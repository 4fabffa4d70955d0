//! Startup coordination: everything that has to happen before this
//! process is allowed to mint IDs.
//!
//! Generation is only collision-free if (datacenter id, worker id) pairs
//! are disjoint across the fleet, and IDs are only usefully time-ordered
//! if fleet clocks roughly agree. Both properties are established here,
//! once, at startup; any failure is terminal and the process exits rather
//! than serve with an unverified identity.
//!
//! ## Structure
//!
//! - [`store`] - the abstract coordination-store capability (atomic
//!   create-if-absent of liveness-bound keys, reads, child listing).
//! - [`etcd`] - the etcd-backed store implementation (leases as liveness).
//! - [`allocator`] - claims a worker slot by linear scan over the
//!   registry.
//! - [`sanity`] - cross-checks registered peers' identities and clocks
//!   over RPC.
//! - [`error`] - the fatal bootstrap error taxonomy.

pub mod allocator;
pub mod error;
pub mod etcd;
pub mod sanity;
pub mod store;
