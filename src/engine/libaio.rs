//! Linux native AIO context
//!
//! Thin wrapper over the `io_setup`/`io_submit`/`io_getevents`/`io_destroy`
//! syscalls. The syscalls are invoked directly via libc rather than through
//! a binding crate to keep MIT license compatibility (the libaio library is
//! LGPL).
//!
//! Batch submission is a single `io_submit` call; the kernel may accept a
//! prefix of the batch and the accepted count is returned to the caller.
//! Reaping is a single blocking `io_getevents` call.
//!
//! When the context is created in nowait mode, every request carries
//! `RWF_NOWAIT`. Kernels that predate the flag reject the submission with
//! EINVAL, which is reported as [`EngineError::Unsupported`], a fatal
//! condition for the caller. A request that would block arrives back as a
//! completion carrying EAGAIN and is the caller's to resubmit.

use super::{Direction, EngineError, IoCompletion, IoRequest};
use std::mem::MaybeUninit;
use std::ptr;

// aio_context_t
type AioRing = libc::c_ulong;

const IOCB_CMD_PREAD: u16 = 0;
const IOCB_CMD_PWRITE: u16 = 1;

// uapi/linux/fs.h
const RWF_NOWAIT: u32 = 0x0000_0008;

// x86_64 syscall numbers
const SYS_IO_SETUP: libc::c_long = 206;
const SYS_IO_DESTROY: libc::c_long = 207;
const SYS_IO_GETEVENTS: libc::c_long = 208;
const SYS_IO_SUBMIT: libc::c_long = 209;

#[repr(C)]
#[derive(Clone, Copy)]
struct Iocb {
    data: u64,          // returned verbatim in the completion (slot id)
    key: u32,
    aio_rw_flags: u32,  // RWF_* flags
    lio_opcode: u16,
    aio_reqprio: i16,
    aio_fildes: u32,
    buf: u64,
    nbytes: u64,
    offset: i64,
    aio_reserved2: u64,
    flags: u32,
    aio_resfd: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct IoEvent {
    data: u64,  // user data from the iocb
    obj: u64,   // pointer to the iocb
    res: i64,   // bytes transferred or -errno
    res2: i64,
}

unsafe fn io_setup(maxevents: libc::c_int, ctxp: *mut AioRing) -> libc::c_int {
    libc::syscall(SYS_IO_SETUP, maxevents as libc::c_long, ctxp) as libc::c_int
}

unsafe fn io_destroy(ctx: AioRing) -> libc::c_int {
    libc::syscall(SYS_IO_DESTROY, ctx) as libc::c_int
}

unsafe fn io_submit(ctx: AioRing, nr: libc::c_long, iocbpp: *mut *mut Iocb) -> libc::c_int {
    libc::syscall(SYS_IO_SUBMIT, ctx, nr, iocbpp) as libc::c_int
}

unsafe fn io_getevents(
    ctx: AioRing,
    min_nr: libc::c_long,
    nr: libc::c_long,
    events: *mut IoEvent,
    timeout: *mut libc::timespec,
) -> libc::c_int {
    libc::syscall(SYS_IO_GETEVENTS, ctx, min_nr, nr, events, timeout) as libc::c_int
}

/// A kernel AIO context bounded to a fixed in-flight capacity
pub struct AioContext {
    ring: AioRing,
    capacity: usize,

    /// RWF_NOWAIT when the context was opened in nowait mode, 0 otherwise
    rw_flags: u32,

    // Scratch space rebuilt on every submit/reap call, sized to capacity so
    // the hot path never allocates.
    iocbs: Vec<Iocb>,
    iocb_ptrs: Vec<*mut Iocb>,
    events: Vec<IoEvent>,
}

impl AioContext {
    /// Create an AIO context able to hold `capacity` in-flight requests.
    pub fn setup(capacity: usize, nowait: bool) -> Result<Self, EngineError> {
        let mut ring: AioRing = 0;
        let ret = unsafe { io_setup(capacity as libc::c_int, &mut ring) };
        if ret < 0 {
            return Err(EngineError::Sys(std::io::Error::last_os_error()));
        }

        Ok(Self {
            ring,
            capacity,
            rw_flags: if nowait { RWF_NOWAIT } else { 0 },
            iocbs: vec![unsafe { MaybeUninit::zeroed().assume_init() }; capacity],
            iocb_ptrs: vec![ptr::null_mut(); capacity],
            events: vec![unsafe { MaybeUninit::zeroed().assume_init() }; capacity],
        })
    }

    /// Maximum number of in-flight requests this context can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether requests are submitted with RWF_NOWAIT
    pub fn nowait(&self) -> bool {
        self.rw_flags != 0
    }

    /// Submit a batch of prepared requests in one syscall.
    ///
    /// Returns the number of requests the kernel accepted, which may be less
    /// than `requests.len()`; the caller re-submits the rest. EAGAIN maps to
    /// [`EngineError::Busy`] (retry), and EINVAL in nowait mode maps to
    /// [`EngineError::Unsupported`] (fatal).
    pub fn submit(&mut self, requests: &[IoRequest]) -> Result<usize, EngineError> {
        debug_assert!(requests.len() <= self.capacity);
        if requests.is_empty() {
            return Ok(0);
        }

        for (i, req) in requests.iter().enumerate() {
            self.iocbs[i] = Iocb {
                data: req.slot as u64,
                key: 0,
                aio_rw_flags: self.rw_flags,
                lio_opcode: match req.direction {
                    Direction::Read => IOCB_CMD_PREAD,
                    Direction::Write => IOCB_CMD_PWRITE,
                },
                aio_reqprio: 0,
                aio_fildes: req.fd as u32,
                buf: req.buf as u64,
                nbytes: req.len as u64,
                offset: req.offset as i64,
                aio_reserved2: 0,
                flags: 0,
                aio_resfd: 0,
            };
            self.iocb_ptrs[i] = &mut self.iocbs[i];
        }

        let ret = unsafe {
            io_submit(
                self.ring,
                requests.len() as libc::c_long,
                self.iocb_ptrs.as_mut_ptr(),
            )
        };

        if ret >= 0 {
            return Ok(ret as usize);
        }

        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) => Err(EngineError::Busy),
            Some(libc::EINVAL) if self.rw_flags != 0 => Err(EngineError::Unsupported("RWF_NOWAIT")),
            _ => Err(EngineError::Sys(err)),
        }
    }

    /// Block until at least `min` requests complete, reaping up to `max`.
    ///
    /// This is the one deliberate suspension point of the measurement loop:
    /// the calling thread sleeps on the kernel completion queue with no
    /// timeout, which is acceptable because every workload is bounded and
    /// local.
    pub fn reap(&mut self, min: usize, max: usize) -> Result<Vec<IoCompletion>, EngineError> {
        let max = max.min(self.capacity);
        debug_assert!(min <= max);

        let ret = unsafe {
            io_getevents(
                self.ring,
                min as libc::c_long,
                max as libc::c_long,
                self.events.as_mut_ptr(),
                ptr::null_mut(),
            )
        };
        if ret < 0 {
            return Err(EngineError::Sys(std::io::Error::last_os_error()));
        }

        let mut completions = Vec::with_capacity(ret as usize);
        for event in &self.events[..ret as usize] {
            let result = if event.res >= 0 {
                Ok(event.res as usize)
            } else {
                Err(std::io::Error::from_raw_os_error((-event.res) as i32))
            };
            completions.push(IoCompletion {
                slot: event.data as usize,
                result,
            });
        }
        Ok(completions)
    }
}

impl Drop for AioContext {
    fn drop(&mut self) {
        // Nothing useful to do with a failure here; the ring dies with the
        // process either way.
        unsafe {
            io_destroy(self.ring);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::buffer::AlignedBuffer;
    use std::fs::{File, OpenOptions};
    use std::os::unix::io::AsRawFd;
    use tempfile::TempDir;

    fn read_request(slot: usize, fd: i32, buf: &mut AlignedBuffer, offset: u64) -> IoRequest {
        IoRequest {
            slot,
            fd,
            buf: buf.as_mut_ptr(),
            len: buf.len(),
            offset,
            direction: Direction::Read,
        }
    }

    #[test]
    fn test_setup_and_teardown() {
        let ctx = AioContext::setup(32, false).unwrap();
        assert_eq!(ctx.capacity(), 32);
        assert!(!ctx.nowait());
        drop(ctx);
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roundtrip.dat");

        // No O_DIRECT here: the tests must run on tmpfs too
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        let fd = file.as_raw_fd();

        let mut ctx = AioContext::setup(4, false).unwrap();

        let mut wbuf = AlignedBuffer::zeroed(4096, 512);
        wbuf.as_mut_slice()[..5].copy_from_slice(b"hello");
        let req = IoRequest {
            slot: 7,
            fd,
            buf: wbuf.as_mut_ptr(),
            len: wbuf.len(),
            offset: 0,
            direction: Direction::Write,
        };
        assert_eq!(ctx.submit(&[req]).unwrap(), 1);

        let completions = ctx.reap(1, 4).unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].slot, 7);
        assert_eq!(*completions[0].result.as_ref().unwrap(), 4096);

        let mut rbuf = AlignedBuffer::zeroed(4096, 512);
        let req = read_request(3, fd, &mut rbuf, 0);
        assert_eq!(ctx.submit(&[req]).unwrap(), 1);

        let completions = ctx.reap(1, 4).unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].slot, 3);
        assert_eq!(&rbuf.as_slice()[..5], b"hello");
    }

    #[test]
    fn test_batch_completions_tagged_by_slot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.dat");

        let data: Vec<u8> = (0..5 * 4096).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let file = File::open(&path).unwrap();
        let fd = file.as_raw_fd();

        let mut ctx = AioContext::setup(8, false).unwrap();

        let mut buffers: Vec<AlignedBuffer> =
            (0..5).map(|_| AlignedBuffer::zeroed(4096, 512)).collect();
        let requests: Vec<IoRequest> = buffers
            .iter_mut()
            .enumerate()
            .map(|(i, buf)| read_request(i, fd, buf, (i * 4096) as u64))
            .collect();

        let mut submitted = 0;
        while submitted < requests.len() {
            submitted += ctx.submit(&requests[submitted..]).unwrap();
        }

        let mut seen = [false; 5];
        let mut reaped = 0;
        while reaped < 5 {
            let completions = ctx.reap(1, 8).unwrap();
            for c in completions {
                assert!(c.result.is_ok());
                assert!(!seen[c.slot], "slot {} completed twice", c.slot);
                seen[c.slot] = true;
                reaped += 1;
            }
        }

        // Each buffer holds the bytes from its own slot's offset, even if
        // completions arrived out of order.
        for (i, buf) in buffers.iter().enumerate() {
            assert_eq!(buf.as_slice(), &data[i * 4096..(i + 1) * 4096]);
        }
    }

    #[test]
    fn test_invalid_fd_rejected_at_submit() {
        let mut ctx = AioContext::setup(4, false).unwrap();
        let mut buf = AlignedBuffer::zeroed(4096, 512);
        let req = read_request(0, -1, &mut buf, 0);

        match ctx.submit(&[req]) {
            Err(EngineError::Sys(_)) => {}
            other => panic!("expected Sys error for bad fd, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_submit_is_noop() {
        let mut ctx = AioContext::setup(4, false).unwrap();
        assert_eq!(ctx.submit(&[]).unwrap(), 0);
    }
}
