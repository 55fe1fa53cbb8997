//! Asynchronous IO engine
//!
//! This module defines the submission/completion interface the workload
//! driver measures through, backed by Linux native AIO (`io_setup`,
//! `io_submit`, `io_getevents`, `io_destroy`). Native AIO is the interface
//! a storage engine uses when it wants the kernel, not extra threads, to
//! provide IO concurrency, which is exactly the property this tool
//! qualifies.
//!
//! # Semantics the driver relies on
//!
//! - `submit` may accept fewer requests than offered; the caller re-submits
//!   the remainder. Partial acceptance is normal, not an error.
//! - `reap` blocks the calling thread until at least `min` completions are
//!   available. That block is the event the context-switch counter detects.
//! - Each completion carries the slot id of its originating request so the
//!   driver can recycle the slot, regardless of completion order.

use std::os::unix::io::RawFd;
use serde::Serialize;
use thiserror::Error;

pub mod libaio;

pub use libaio::AioContext;

/// IO direction for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Read,
    Write,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// A single prepared IO request
///
/// The driver owns the request for its whole lifetime: it is created when a
/// queue slot is claimed and recycled when the matching completion arrives.
/// `slot` indexes the driver's buffer table and comes back verbatim in the
/// completion.
///
/// # Safety
///
/// `buf` must stay valid and properly aligned until the completion for this
/// request has been reaped. The driver guarantees this by keeping every
/// buffer alive for the full run.
#[derive(Debug, Clone, Copy)]
pub struct IoRequest {
    pub slot: usize,
    pub fd: RawFd,
    pub buf: *mut u8,
    pub len: usize,
    pub offset: u64,
    pub direction: Direction,
}

/// A reaped completion, tagged with the originating request's slot
#[derive(Debug)]
pub struct IoCompletion {
    pub slot: usize,
    /// Bytes transferred, or the errno the kernel reported for this request
    pub result: std::io::Result<usize>,
}

/// Engine failure taxonomy
///
/// `Unsupported` is fatal to the whole process: continuing without a
/// specifically requested capability would silently invalidate the
/// measurement. `Busy` is transient and retried by the caller without ever
/// being surfaced.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("kernel reports {0} unsupported on this filesystem/kernel combination")]
    Unsupported(&'static str),

    #[error("submission queue transiently busy")]
    Busy,

    #[error("async io syscall failed: {0}")]
    Sys(#[from] std::io::Error),
}
