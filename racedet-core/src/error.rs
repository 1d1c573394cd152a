use thiserror::Error;

/// A program-invariant violation. These are never returned to casual
/// callers: the only sanctioned response is to log the violated
/// invariant and abort, since continuing would let the engine observe
/// more events against state it can no longer trust.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("popped from an empty shadow stack")]
    EmptyStackPop,

    #[error("shadow stack torn down with {0} frame(s) remaining, expected at most 1")]
    NonEmptyStackTeardown(usize),

    #[error("join encountered a {0:?} frame on top, expected a Task frame")]
    JoinFrameKindMismatch(crate::frame::FrameKind),
}

impl EngineError {
    /// Log the violated invariant and abort the process.
    ///
    /// The callback ABI has no channel to propagate a `Result` across an
    /// `extern "C"` boundary, so this is the only way an `EngineError`
    /// is ever handled.
    pub fn abort(&self) -> ! {
        log::error!("racedet: fatal invariant violation: {}", self);
        std::process::abort();
    }
}

/// A non-fatal instrumentation anomaly: the event stream doesn't match
/// what the engine expected, but no data has been lost and analysis can
/// continue.
#[derive(Debug, Error)]
pub enum Anomaly {
    #[error("enter_serial({0}) found no matching Continuation frame on top")]
    SyncRegionMismatch(crate::frame::SyncReg),

    #[error("task_exit observed on an empty shadow stack")]
    TaskExitOnEmptyStack,
}

impl Anomaly {
    pub fn log(&self) {
        log::warn!("racedet: instrumentation anomaly: {}", self);
    }
}
