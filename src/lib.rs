//! fspulse - filesystem qualification for asynchronous direct IO
//!
//! fspulse answers one question about a filesystem/storage stack: can a
//! low-latency storage engine trust it with asynchronous direct IO? It runs
//! a fixed battery of kernel-AIO workloads against an unlinked O_DIRECT
//! file and reports, per scenario:
//!
//! - context switches attributable to each IO submission (a blocked
//!   submitter means the "async" path is synchronous underneath)
//! - involuntary switches while blocked reaping, as background noise
//! - whether written data landed in the page cache despite O_DIRECT
//!
//! # Architecture
//!
//! - **probe**: DMA alignment discovery with conservative fallback
//! - **engine**: queue-depth-bounded submission/completion over Linux
//!   native AIO
//! - **driver**: the per-scenario state machine and measurement loop
//! - **inspect**: post-run page-cache residency check
//! - **scenario** / **output**: the fixed battery and its report

pub mod config;
pub mod driver;
pub mod engine;
pub mod inspect;
pub mod output;
pub mod probe;
pub mod scenario;
pub mod util;

/// Result type used throughout fspulse
pub type Result<T> = anyhow::Result<T>;

/// Exit code when a specifically requested async IO capability is
/// unsupported by the running kernel. Distinguished from generic failure
/// (1) so wrappers can tell "this kernel cannot run that mode" from "the
/// run broke".
pub const EXIT_CAPABILITY_UNSUPPORTED: i32 = 2;
