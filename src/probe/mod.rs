//! Direct IO alignment probing
//!
//! Direct IO only works when buffers and transfer sizes honor the
//! filesystem's DMA alignment, and XFS is the only mainstream filesystem
//! that will tell you what that alignment is (`XFS_IOC_DIOINFO`). The probe
//! creates a short-lived O_DIRECT file, unlinks it immediately, and asks.
//! Filesystems without the query, and directories where the probe file
//! cannot even be created, degrade to a conservative 512 byte default for
//! both values rather than aborting the battery.

use crate::engine::{AioContext, Direction, EngineError, IoRequest};
use crate::util::buffer::AlignedBuffer;
use crate::Result;
use anyhow::Context;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Conservative alignment assumed when the filesystem cannot be queried
pub const FALLBACK_ALIGNMENT: usize = 512;

// _IOR('X', 30, struct dioattr)
const XFS_IOC_DIOINFO: libc::c_ulong = 0x800C_581E;

/// XFS_IOC_DIOINFO result layout (xfs_fs.h)
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct DioAttr {
    d_mem: u32,     // memory alignment
    d_miniosz: u32, // minimum IO size / disk alignment
    d_maxiosz: u32, // maximum IO size
}

/// DMA alignment requirements for direct IO on a filesystem
///
/// Probed once per process run and consumed by every scenario that
/// allocates buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentInfo {
    /// Minimum memory buffer alignment in bytes
    pub memory_alignment: usize,
    /// Minimum disk IO size and offset alignment in bytes
    pub disk_alignment: usize,
}

impl AlignmentInfo {
    fn fallback() -> Self {
        Self {
            memory_alignment: FALLBACK_ALIGNMENT,
            disk_alignment: FALLBACK_ALIGNMENT,
        }
    }
}

/// Probe the DMA alignment the filesystem under `dir` requires.
///
/// Degrades to [`FALLBACK_ALIGNMENT`] for both values when the probe file
/// cannot be created or the filesystem does not support the query; both
/// degradations are reported on stderr, never escalated.
pub fn probe_alignment(dir: &Path) -> AlignmentInfo {
    let path = dir.join(format!("fspulse-probe-{}.tmp", std::process::id()));

    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(libc::O_DIRECT)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Warning: failed to create alignment probe file ({}), assuming {} byte alignment",
                e, FALLBACK_ALIGNMENT
            );
            return AlignmentInfo::fallback();
        }
    };

    // The handle keeps the inode alive; the name must not outlive the probe
    let _ = std::fs::remove_file(&path);

    let mut attr = DioAttr::default();
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), XFS_IOC_DIOINFO, &mut attr) };
    if ret == -1 {
        eprintln!(
            "Warning: filesystem does not support the direct IO alignment query, assuming {} bytes",
            FALLBACK_ALIGNMENT
        );
        return AlignmentInfo::fallback();
    }

    AlignmentInfo {
        memory_alignment: attr.d_mem as usize,
        disk_alignment: attr.d_miniosz as usize,
    }
}

/// Verify that the kernel accepts RWF_NOWAIT submissions.
///
/// Runs before any scenario: a kernel that rejects the flag would
/// otherwise fail mid-battery, after results had started to print. A
/// rejection ([`EngineError::Unsupported`]) is fatal to the caller;
/// "transiently busy" and "would block" answers mean the capability
/// exists and the probe passes. If the probe file itself cannot be
/// created, the check is skipped with a warning; the battery's own
/// setup will surface whatever is wrong with the directory.
pub fn verify_nowait(dir: &Path) -> Result<()> {
    let path = dir.join(format!("fspulse-nowait-{}.tmp", std::process::id()));

    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(libc::O_DIRECT)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: could not create a file to verify RWF_NOWAIT support ({})", e);
            return Ok(());
        }
    };
    let _ = std::fs::remove_file(&path);

    let mut ctx =
        AioContext::setup(1, true).context("failed to create the RWF_NOWAIT probe context")?;

    let mut buf = AlignedBuffer::zeroed(4096, 4096);
    let request = IoRequest {
        slot: 0,
        fd: file.as_raw_fd(),
        buf: buf.as_mut_ptr(),
        len: buf.len(),
        offset: 0,
        direction: Direction::Write,
    };

    loop {
        match ctx.submit(&[request]) {
            Ok(1) => break,
            Ok(_) | Err(EngineError::Busy) => continue,
            Err(e) => return Err(e).context("RWF_NOWAIT capability probe was rejected"),
        }
    }

    // Drain the completion so the buffer outlives the request; EAGAIN here
    // means would-block, which is the capability working as designed.
    let _ = ctx.reap(1, 1);
    Ok(())
}

/// Report the filesystem block size for `dir` via statvfs.
pub fn fs_block_size(dir: &Path) -> Result<u64> {
    use std::os::unix::ffi::OsStrExt;
    let cpath = std::ffi::CString::new(dir.as_os_str().as_bytes())
        .context("target directory path contains an interior NUL")?;

    let mut stat = std::mem::MaybeUninit::<libc::statvfs>::zeroed();
    let ret = unsafe { libc::statvfs(cpath.as_ptr(), stat.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error()).context("statvfs failed");
    }
    let stat = unsafe { stat.assume_init() };
    Ok(stat.f_bsize as u64)
}
