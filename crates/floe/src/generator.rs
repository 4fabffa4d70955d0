use core::cmp::Ordering;
use core::time::Duration;

use parking_lot::Mutex;

use crate::{
    EPOCH, Error, MAX_DATACENTER_ID, MAX_SEQUENCE, MAX_WORKER_ID, Result, SnowflakeId, TimeSource,
    WallClock,
};

/// Outcome of a single generation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdGenStatus {
    /// A new ID is available.
    Ready { id: SnowflakeId },
    /// The sequence space for the current millisecond is exhausted; retry
    /// after roughly `yield_for_ms` milliseconds.
    Pending { yield_for_ms: u64 },
}

/// Mutable generator state, guarded by a single mutex per instance.
#[derive(Debug)]
struct GeneratorState {
    /// Wall-clock milliseconds of the most recently issued ID.
    last_timestamp: u64,
    /// Sequence of the most recently issued ID within `last_timestamp`.
    sequence: u64,
}

/// A thread-safe snowflake ID generator for one fixed (datacenter, worker)
/// pair.
///
/// Many callers may invoke [`poll_id`] or [`next_id`] concurrently; the
/// read-modify-write over `(last_timestamp, sequence)` is serialized by one
/// mutex. The critical section is O(1) and bounded by a clock read, so the
/// serialization is not a throughput concern below the 4096-IDs-per-
/// millisecond ceiling of the sequence field.
///
/// The generator is deliberately strict about time: a wall clock observed
/// behind the last issued timestamp fails the call with
/// [`Error::ClockMovedBackwards`] instead of papering over the regression,
/// and an exhausted sequence reports [`IdGenStatus::Pending`] so the caller
/// waits out the tick rather than widening the ID space.
///
/// [`poll_id`]: Self::poll_id
/// [`next_id`]: Self::next_id
pub struct IdGenerator<T = WallClock>
where
    T: TimeSource,
{
    datacenter_id: u64,
    worker_id: u64,
    epoch_millis: u64,
    state: Mutex<GeneratorState>,
    clock: T,
}

impl<T> IdGenerator<T>
where
    T: TimeSource,
{
    /// Creates a generator anchored to the fleet-wide [`EPOCH`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatacenterIdOutOfRange`] or
    /// [`Error::WorkerIdOutOfRange`] if an id does not fit its bit field,
    /// and [`Error::ClockBeforeEpoch`] if the time source is currently
    /// behind the epoch (a misconfigured clock; nothing sane can be
    /// issued).
    pub fn new(datacenter_id: u64, worker_id: u64, clock: T) -> Result<Self> {
        Self::with_epoch(datacenter_id, worker_id, EPOCH, clock)
    }

    /// Creates a generator with an explicit epoch.
    ///
    /// Exists so tests can anchor mock clocks at small offsets; production
    /// deployments use [`Self::new`] and the shared [`EPOCH`].
    pub fn with_epoch(datacenter_id: u64, worker_id: u64, epoch: Duration, clock: T) -> Result<Self> {
        if datacenter_id > MAX_DATACENTER_ID {
            return Err(Error::DatacenterIdOutOfRange {
                id: datacenter_id,
                max: MAX_DATACENTER_ID,
            });
        }
        if worker_id > MAX_WORKER_ID {
            return Err(Error::WorkerIdOutOfRange {
                id: worker_id,
                max: MAX_WORKER_ID,
            });
        }

        let epoch_millis = epoch.as_millis() as u64;
        let now_millis = clock.current_millis();
        if now_millis < epoch_millis {
            return Err(Error::ClockBeforeEpoch {
                epoch_millis,
                now_millis,
            });
        }

        Ok(Self {
            datacenter_id,
            worker_id,
            epoch_millis,
            // Seeding last_timestamp at the epoch keeps every Ready path at
            // now >= epoch_millis, so composing `now - epoch_millis` cannot
            // underflow.
            state: Mutex::new(GeneratorState {
                last_timestamp: epoch_millis,
                sequence: 0,
            }),
            clock,
        })
    }

    /// The datacenter id encoded into every ID this generator issues.
    pub fn datacenter_id(&self) -> u64 {
        self.datacenter_id
    }

    /// The worker id encoded into every ID this generator issues.
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// The generator's current wall-clock reading in milliseconds since the
    /// Unix epoch. Exposed for peer clock comparison, not for ID math.
    pub fn current_millis(&self) -> u64 {
        self.clock.current_millis()
    }

    /// Executes one generation attempt.
    ///
    /// # Returns
    /// - `Ok(IdGenStatus::Ready { id })`: a new ID was issued
    /// - `Ok(IdGenStatus::Pending { yield_for_ms })`: the current
    ///   millisecond's 4096-ID budget is spent; re-poll once the clock has
    ///   advanced
    ///
    /// # Errors
    ///
    /// [`Error::ClockMovedBackwards`] if the clock is behind the last
    /// issued timestamp. State is not mutated on this path, so a later call
    /// under a recovered clock resumes exactly where generation stopped.
    pub fn poll_id(&self) -> Result<IdGenStatus> {
        let mut state = self.state.lock();
        // The clock read happens under the lock: sampling it outside would
        // let two callers observe out-of-order times and report a spurious
        // regression.
        let now = self.clock.current_millis();

        match now.cmp(&state.last_timestamp) {
            Ordering::Equal => {
                let sequence = (state.sequence + 1) & MAX_SEQUENCE;
                if sequence == 0 {
                    // Sequence space for this tick is spent. Leave state
                    // alone; the caller re-polls until the clock advances.
                    Ok(IdGenStatus::Pending { yield_for_ms: 1 })
                } else {
                    state.sequence = sequence;
                    Ok(IdGenStatus::Ready {
                        id: self.compose(now, sequence),
                    })
                }
            }
            Ordering::Greater => {
                state.last_timestamp = now;
                state.sequence = 0;
                Ok(IdGenStatus::Ready {
                    id: self.compose(now, 0),
                })
            }
            Ordering::Less => Err(Self::cold_clock_behind(state.last_timestamp, now)),
        }
    }

    /// Generates the next ID, blocking through sequence exhaustion.
    ///
    /// `f` is invoked with the suggested wait (in milliseconds) whenever
    /// the generator is pending; callers pass `std::thread::yield_now`, a
    /// sleep, or a test hook. The wait is bounded: it ends as soon as the
    /// wall clock advances past the exhausted millisecond.
    ///
    /// # Errors
    ///
    /// [`Error::ClockMovedBackwards`], as for [`Self::poll_id`].
    pub fn next_id(&self, mut f: impl FnMut(u64)) -> Result<SnowflakeId> {
        loop {
            match self.poll_id()? {
                IdGenStatus::Ready { id } => break Ok(id),
                IdGenStatus::Pending { yield_for_ms } => f(yield_for_ms),
            }
        }
    }

    fn compose(&self, now_millis: u64, sequence: u64) -> SnowflakeId {
        SnowflakeId::from_parts(
            now_millis - self.epoch_millis,
            self.datacenter_id,
            self.worker_id,
            sequence,
        )
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(last_millis: u64, now_millis: u64) -> Error {
        Error::ClockMovedBackwards {
            last_millis,
            now_millis,
        }
    }
}
