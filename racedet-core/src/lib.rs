//! Shadow-stack determinacy race engine for fork-join parallel programs.
//!
//! This crate implements the bookkeeping (per-worker shadow stacks,
//! access-set folding, reducer reconciliation) described for a Cilk-style
//! race detector. It has no knowledge of any particular instrumentation
//! front-end; that lives in the accompanying ABI crate, which drives a
//! per-thread [`ShadowStack`] from `extern "C"` callbacks.

pub mod access_set;
pub mod address;
pub mod config;
pub mod error;
pub mod frame;
pub mod report;
pub mod stack;

pub use access_set::AccessSet;
pub use address::Address;
pub use config::Config;
pub use error::{Anomaly, EngineError};
pub use frame::{Frame, FrameKind, SyncReg, NO_SYNC_REG};
pub use report::{report, track_reads, Phase, ReportSink};
pub use stack::{RaceOutcome, ReduceStrategy, ShadowStack};
