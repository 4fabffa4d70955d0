use core::fmt;

/// Bit width of the timestamp field (milliseconds since the epoch).
pub const TIMESTAMP_BITS: u32 = 41;
/// Bit width of the datacenter id field.
pub const DATACENTER_ID_BITS: u32 = 5;
/// Bit width of the worker id field.
pub const WORKER_ID_BITS: u32 = 5;
/// Bit width of the per-millisecond sequence field.
pub const SEQUENCE_BITS: u32 = 12;

/// Largest encodable timestamp, in milliseconds since the epoch.
///
/// With 41 bits this is roughly 69 years of headroom past the epoch. The
/// rollover is a deployment-lifetime limit: pick the epoch so the fleet is
/// retired before it, because nothing checks for it at generation time.
pub const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;
/// Largest encodable datacenter id.
pub const MAX_DATACENTER_ID: u64 = (1 << DATACENTER_ID_BITS) - 1;
/// Largest encodable worker id.
pub const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;
/// Largest per-millisecond sequence value (4095: 4096 IDs per tick).
pub const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

pub(crate) const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
pub(crate) const DATACENTER_ID_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;
pub(crate) const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

/// A 64-bit, roughly time-ordered unique identifier.
///
/// Packed most-significant first: one unused sign bit (always zero), a
/// 41-bit timestamp in milliseconds since the epoch, a 5-bit datacenter id,
/// a 5-bit worker id, and a 12-bit sequence. The layout is identical across
/// every process in a fleet; (datacenter, worker) pairs partition the ID
/// space, so two generators with distinct pairs can never collide.
///
/// Because the sign bit is always zero, every ID is representable as a
/// non-negative `i64`, which is the form it takes on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct SnowflakeId(u64);

impl SnowflakeId {
    /// Packs the four fields into an ID.
    ///
    /// `timestamp` is milliseconds since the epoch (not the Unix epoch).
    /// Callers are expected to pass in-range values; out-of-range fields
    /// are a caller bug and are masked off in release builds.
    pub fn from_parts(timestamp: u64, datacenter_id: u64, worker_id: u64, sequence: u64) -> Self {
        debug_assert!(timestamp <= MAX_TIMESTAMP);
        debug_assert!(datacenter_id <= MAX_DATACENTER_ID);
        debug_assert!(worker_id <= MAX_WORKER_ID);
        debug_assert!(sequence <= MAX_SEQUENCE);
        Self(
            (timestamp & MAX_TIMESTAMP) << TIMESTAMP_SHIFT
                | (datacenter_id & MAX_DATACENTER_ID) << DATACENTER_ID_SHIFT
                | (worker_id & MAX_WORKER_ID) << WORKER_ID_SHIFT
                | (sequence & MAX_SEQUENCE),
        )
    }

    /// Reinterprets a raw `u64` as an ID.
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw `u64` representation.
    pub const fn to_u64(self) -> u64 {
        self.0
    }

    /// Reinterprets a wire-format `i64` as an ID.
    pub const fn from_i64(raw: i64) -> Self {
        Self(raw as u64)
    }

    /// Returns the wire representation: the same bits as a non-negative
    /// `i64` (the sign bit is never set by [`Self::from_parts`]).
    pub const fn to_i64(self) -> i64 {
        self.0 as i64
    }

    /// Milliseconds since the epoch at which this ID was issued.
    pub const fn timestamp(self) -> u64 {
        self.0 >> TIMESTAMP_SHIFT
    }

    /// The datacenter id field.
    pub const fn datacenter_id(self) -> u64 {
        (self.0 >> DATACENTER_ID_SHIFT) & MAX_DATACENTER_ID
    }

    /// The worker id field.
    pub const fn worker_id(self) -> u64 {
        (self.0 >> WORKER_ID_SHIFT) & MAX_WORKER_ID
    }

    /// The per-millisecond sequence field.
    pub const fn sequence(self) -> u64 {
        self.0 & MAX_SEQUENCE
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<SnowflakeId> for u64 {
    fn from(id: SnowflakeId) -> Self {
        id.to_u64()
    }
}

impl From<u64> for SnowflakeId {
    fn from(raw: u64) -> Self {
        Self::from_u64(raw)
    }
}
