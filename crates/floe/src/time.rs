use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

/// The fleet-wide epoch: 2010-11-04T01:42:54.657Z, expressed as an offset
/// from the Unix epoch.
///
/// Timestamp fields count milliseconds from this point, which buys ~69
/// years of 41-bit headroom. Changing it after a fleet has issued IDs
/// breaks sortability against everything already issued, so treat it as
/// permanent.
pub const EPOCH: Duration = Duration::from_millis(1_288_834_974_657);

/// A source of wall-clock time in milliseconds since the Unix epoch.
///
/// Production code uses [`WallClock`]; tests inject deterministic
/// implementations to drive the generator through same-tick, rollover, and
/// clock-regression paths without real sleeps.
pub trait TimeSource {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> u64;
}

/// The system wall clock.
///
/// Deliberately *not* a monotonic-clamped reading: the generator must be
/// able to observe the clock stepping backwards (NTP correction, manual
/// adjustment) and refuse to issue, rather than have the regression hidden
/// and a (timestamp, sequence) pair silently re-issued.
#[derive(Clone, Copy, Debug, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX_EPOCH")
            .as_millis() as u64
    }
}
