//! Error types for the ID service's RPC surface.
//!
//! This is the generation-time taxonomy only: a clock observed behind the
//! last issued timestamp fails the individual call, and the caller decides
//! whether to retry. Startup failures (slot exhaustion, peer mismatch,
//! clock skew) never reach the wire; they abort the process before the
//! listener is bound and live in the server crate.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the ID service's RPC handlers.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Underlying snowflake ID generation failed.
    #[error("ID error: {0}")]
    IdGeneration(#[from] floe::Error),
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::IdGeneration(e @ floe::Error::ClockMovedBackwards { .. }) => {
                // Per-call failure, not process death: the caller may retry
                // once the clock catches back up.
                Status::failed_precondition(e.to_string())
            }
            Error::IdGeneration(e) => Status::internal(format!("ID generation error: {e}")),
        }
    }
}
