/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All possible errors the core generator can produce.
///
/// Generation itself has exactly one failure mode: the wall clock was
/// observed behind the last issued timestamp. Everything else here is a
/// construction-time configuration error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The wall clock reported a time earlier than the last issued
    /// timestamp. Generating under a rolled-back clock risks re-issuing a
    /// (timestamp, sequence) pair, so the call fails and generator state is
    /// left untouched. Callers decide whether to retry.
    #[error("clock moved backwards: refusing to generate (last seen {last_millis} ms, now {now_millis} ms)")]
    ClockMovedBackwards { last_millis: u64, now_millis: u64 },

    /// The configured datacenter id does not fit its bit field.
    #[error("datacenter id {id} is outside 0..={max}")]
    DatacenterIdOutOfRange { id: u64, max: u64 },

    /// The configured worker id does not fit its bit field.
    #[error("worker id {id} is outside 0..={max}")]
    WorkerIdOutOfRange { id: u64, max: u64 },

    /// The time source reported a value before the configured epoch, so no
    /// valid timestamp field can be composed.
    #[error("current time {now_millis} ms is before the epoch {epoch_millis} ms")]
    ClockBeforeEpoch { epoch_millis: u64, now_millis: u64 },
}
