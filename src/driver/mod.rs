//! Workload driver
//!
//! Runs one scenario end to end: INIT (open an unlinked O_DIRECT backing
//! file), WARMUP (optional pre-size / zero-fill), STEADY (submit/reap loop
//! at the target queue depth until N operations complete), DONE (rates,
//! verdict, page-cache inspection).
//!
//! The driver is deliberately single-threaded. All IO concurrency comes
//! from the kernel AIO context; the only places the thread may legitimately
//! suspend are the reap call (instrumented; that suspension is what the
//! tool reports on) and the warmup zero-fill (deliberate, uninstrumented).

use crate::engine::{AioContext, Direction, EngineError, IoRequest};
use crate::inspect;
use crate::probe::AlignmentInfo;
use crate::scenario::ScenarioConfig;
use crate::util::buffer::AlignedBuffer;
use crate::util::ctxsw::{count_switches, SwitchKind};
use crate::Result;
use anyhow::{bail, Context};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

/// Operations per scenario
pub const TARGET_OPS: usize = 10_000;

/// Verdict threshold: a filesystem is GOOD when strictly fewer than this
/// many voluntary context switches are charged per submitted IO.
///
/// The value is an inherited heuristic encoding "submission should
/// essentially never block"; occasional switches are tolerable noise. It is
/// overridable through [`DriverConfig::good_threshold`] rather than
/// re-derived.
pub const GOOD_CTXSW_PER_IO: f64 = 0.1;

/// Logical size the file is extended to for size-unchanging write scenarios
const PRETRUNCATE_SIZE: u64 = 1 << 30;

/// Extent-size allocation hint: ask for 32 MiB contiguous chunks
const EXTENT_HINT_BYTES: u32 = 32 << 20;

// _IOW('X', 32, struct fsxattr)
const XFS_IOC_FSSETXATTR: libc::c_ulong = 0x401C_5820;
const XFS_XFLAG_EXTSIZE: u32 = 0x0000_0800;

/// XFS_IOC_FSSETXATTR argument layout (uapi/linux/fs.h)
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct FsXAttr {
    fsx_xflags: u32,
    fsx_extsize: u32,
    fsx_nextents: u32,
    fsx_projid: u32,
    fsx_cowextsize: u32,
    fsx_pad: [u8; 8],
}

/// Process-wide run parameters shared by every scenario
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Directory the backing files are created (and immediately unlinked) in
    pub directory: PathBuf,

    /// Number of operations per scenario (N)
    pub ops: usize,

    /// Verdict threshold, defaults to [`GOOD_CTXSW_PER_IO`]
    pub good_threshold: f64,

    /// Submit with RWF_NOWAIT
    pub nowait: bool,

    /// Fixed shuffle seed; `None` seeds from OS entropy
    pub seed: Option<u64>,

    /// Open the backing file with O_DIRECT. Always true in production runs;
    /// tests disable it for tmpfs compatibility.
    pub direct_io: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            ops: TARGET_OPS,
            good_threshold: GOOD_CTXSW_PER_IO,
            nowait: false,
            seed: None,
            direct_io: true,
        }
    }
}

/// GOOD/BAD call for one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Good,
    Bad,
}

impl Verdict {
    /// GOOD iff `rate` is strictly below `threshold`; exactly at the
    /// threshold is BAD.
    pub fn from_rate(rate: f64, threshold: f64) -> Self {
        if rate < threshold {
            Verdict::Good
        } else {
            Verdict::Bad
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Good => write!(f, "GOOD"),
            Verdict::Bad => write!(f, "BAD"),
        }
    }
}

/// Measured outcome of one scenario
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunResult {
    /// Voluntary context switches charged to submission, per operation
    pub ctxsw_per_io: f64,
    /// Involuntary switches observed while blocked reaping, per operation
    pub background_ctxsw_per_io: f64,
    pub verdict: Verdict,
    /// Any sampled page of the file was resident in the page cache after
    /// the run
    pub page_cache_hit: bool,
}

/// Execute one scenario to completion and measure it.
pub fn run_scenario(
    scenario: &ScenarioConfig,
    alignment: &AlignmentInfo,
    config: &DriverConfig,
) -> Result<RunResult> {
    let file = open_backing_file(scenario, config)?;
    warmup(&file, scenario, alignment, config)?;

    let (voluntary, involuntary) = steady_loop(&file, scenario, alignment, config)?;

    let page_cache_hit = inspect::page_cache_populated(file.as_raw_fd(), config.ops)
        .context("page cache inspection failed")?;

    let ctxsw_per_io = voluntary as f64 / config.ops as f64;
    let background_ctxsw_per_io = involuntary as f64 / config.ops as f64;

    Ok(RunResult {
        ctxsw_per_io,
        background_ctxsw_per_io,
        verdict: Verdict::from_rate(ctxsw_per_io, config.good_threshold),
        page_cache_hit,
    })
}

/// INIT: create the backing file, hint the allocator, drop the name.
///
/// Unlinking immediately means the file is reachable only through our open
/// handle: scenarios cannot see each other's data and a crash leaves no
/// debris in the directory.
fn open_backing_file(scenario: &ScenarioConfig, config: &DriverConfig) -> Result<File> {
    let path = config
        .directory
        .join(format!("fspulse-{}.tmp", std::process::id()));

    let mut flags = 0;
    if config.direct_io {
        flags |= libc::O_DIRECT;
    }
    if scenario.use_sync_flag {
        flags |= libc::O_DSYNC;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(flags)
        .open(&path)
        .with_context(|| format!("failed to create backing file {}", path.display()))?;

    apply_extent_hint(&file);

    std::fs::remove_file(&path)
        .with_context(|| format!("failed to unlink backing file {}", path.display()))?;

    Ok(file)
}

/// Best-effort XFS extent-size hint. Advisory only: most filesystems do not
/// understand the ioctl and the measurement is valid without it.
fn apply_extent_hint(file: &File) {
    let mut attr = FsXAttr::default();
    attr.fsx_xflags |= XFS_XFLAG_EXTSIZE;
    attr.fsx_extsize = EXTENT_HINT_BYTES;
    unsafe {
        libc::ioctl(file.as_raw_fd(), XFS_IOC_FSSETXATTR, &attr);
    }
}

/// WARMUP: pre-size and/or zero-fill per the scenario policy.
///
/// Reading requires data on disk, so a read direction always forces the
/// zero-fill. The fill is synchronous and flushed to stable storage; it is
/// intentionally not instrumented.
fn warmup(
    file: &File,
    scenario: &ScenarioConfig,
    alignment: &AlignmentInfo,
    config: &DriverConfig,
) -> Result<()> {
    if scenario.pretruncate {
        file.set_len(PRETRUNCATE_SIZE)
            .context("failed to extend the backing file before IO")?;
    }

    if scenario.prezero || scenario.direction == Direction::Read {
        let buf = AlignedBuffer::zeroed(scenario.buffer_size, alignment.memory_alignment);
        for i in 0..config.ops {
            file.write_all_at(buf.as_slice(), (i * scenario.buffer_size) as u64)
                .context("zero-fill write failed")?;
        }
        file.sync_all().context("zero-fill flush failed")?;
    }

    Ok(())
}

/// STEADY: drive the queue until N operations complete.
///
/// Returns (voluntary switches charged to submission, involuntary switches
/// observed while reaping).
fn steady_loop(
    file: &File,
    scenario: &ScenarioConfig,
    alignment: &AlignmentInfo,
    config: &DriverConfig,
) -> Result<(u64, u64)> {
    let fd = file.as_raw_fd();
    let slots = scenario.queue_depth;

    let mut buffers: Vec<AlignedBuffer> = (0..slots)
        .map(|_| AlignedBuffer::zeroed(scenario.buffer_size, alignment.memory_alignment))
        .collect();
    let mut slot_offsets = vec![0u64; slots];
    let mut free_slots: Vec<usize> = (0..slots).rev().collect();

    let mut ctx = AioContext::setup(slots, config.nowait)
        .context("failed to create the async IO context")?;

    let mut rng = match config.seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    };

    let mut initiated = 0usize;
    let mut completed = 0usize;
    let mut current_depth = 0usize;
    let mut voluntary = 0u64;
    let mut involuntary = 0u64;
    let mut batch: Vec<IoRequest> = Vec::with_capacity(slots);

    while completed < config.ops {
        batch.clear();
        while initiated < config.ops && current_depth < slots {
            let slot = free_slots.pop().expect("depth below queue_depth implies a free slot");
            let offset = (initiated * scenario.buffer_size) as u64;
            slot_offsets[slot] = offset;
            batch.push(IoRequest {
                slot,
                fd,
                buf: buffers[slot].as_mut_ptr(),
                len: scenario.buffer_size,
                offset,
                direction: scenario.direction,
            });
            initiated += 1;
            current_depth += 1;
        }

        // Shuffled submission order defeats any sequential-completion
        // assumption in the path under test.
        batch.shuffle(&mut rng);
        submit_all(&mut ctx, &batch, &mut voluntary)?;

        let completions =
            count_switches(&mut involuntary, SwitchKind::Involuntary, || ctx.reap(1, slots))
                .context("reaping completions failed")?;

        for completion in completions {
            let slot = completion.slot;
            match completion.result {
                Ok(n) if n == scenario.buffer_size => {
                    free_slots.push(slot);
                    current_depth -= 1;
                    completed += 1;
                }
                Ok(n) => bail!(
                    "short {} at offset {}: {} of {} bytes",
                    scenario.direction,
                    slot_offsets[slot],
                    n,
                    scenario.buffer_size
                ),
                Err(e) if config.nowait && e.raw_os_error() == Some(libc::EAGAIN) => {
                    // Would-block under RWF_NOWAIT: the request is still
                    // ours, resubmit it as-is.
                    let retry = IoRequest {
                        slot,
                        fd,
                        buf: buffers[slot].as_mut_ptr(),
                        len: scenario.buffer_size,
                        offset: slot_offsets[slot],
                        direction: scenario.direction,
                    };
                    submit_all(&mut ctx, &[retry], &mut voluntary)?;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "{} at offset {} failed",
                            scenario.direction, slot_offsets[slot]
                        )
                    })
                }
            }
        }
    }

    Ok((voluntary, involuntary))
}

/// Submit a batch, tolerating partial acceptance and transient EAGAIN.
///
/// Every `io_submit` call runs inside the voluntary-switch counter: if the
/// kernel puts us to sleep to do filesystem work synchronously, it shows up
/// here and nowhere else.
fn submit_all(ctx: &mut AioContext, requests: &[IoRequest], voluntary: &mut u64) -> Result<()> {
    let mut submitted = 0;
    while submitted < requests.len() {
        let outcome = count_switches(voluntary, SwitchKind::Voluntary, || {
            ctx.submit(&requests[submitted..])
        });
        match outcome {
            Ok(accepted) => submitted += accepted,
            Err(EngineError::Busy) => continue,
            Err(e) => return Err(e).context("io submission failed"),
        }
    }
    Ok(())
}
