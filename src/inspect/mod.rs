//! Page-cache residency inspection
//!
//! Data written through O_DIRECT is supposed to bypass the page cache. Some
//! filesystem/kernel combinations quietly fall back to buffered writes, and
//! the only observable evidence is resident pages over the written range.
//! After a run completes, the inspector maps the file and asks `mincore`
//! which pages are resident.
//!
//! The sampled range is one native page per completed operation regardless
//! of the run's buffer size. When the buffer size differs from the page
//! size this over- or under-reads the written range; over-sampling is the
//! accepted direction since a false "polluted" is cheaper to investigate
//! than a missed one.

use crate::Result;
use anyhow::Context;
use std::os::unix::io::RawFd;
use std::ptr;

/// Native page size, as the kernel reports it.
pub fn page_size() -> usize {
    let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ret <= 0 {
        // sysconf(_SC_PAGESIZE) cannot fail on Linux; keep a sane value if
        // it somehow does
        return 4096;
    }
    ret as usize
}

/// Check whether any of the first `ops` pages of the file are resident in
/// the page cache.
pub fn page_cache_populated(fd: RawFd, ops: usize) -> Result<bool> {
    let page = page_size();
    let len = ops * page;
    if len == 0 {
        return Ok(false);
    }

    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error())
            .context("mmap of the backing file for residency inspection failed");
    }

    let mut incore = vec![0u8; ops];
    let ret = unsafe { libc::mincore(addr, len, incore.as_mut_ptr()) };
    let mincore_err = std::io::Error::last_os_error();

    unsafe {
        libc::munmap(addr, len);
    }

    if ret != 0 {
        return Err(mincore_err).context("mincore failed");
    }

    Ok(incore.iter().any(|&m| m & 1 != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use tempfile::TempDir;

    #[test]
    fn test_page_size_sane() {
        let page = page_size();
        assert!(page >= 4096);
        assert!(page.is_power_of_two());
    }

    #[test]
    fn test_buffered_write_is_resident() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cached.dat");

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();

        // A buffered write leaves dirty pages in the cache, the exact
        // condition the inspector exists to detect.
        let data = vec![0x5Au8; 4 * page_size()];
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        assert!(page_cache_populated(file.as_raw_fd(), 4).unwrap());
    }

    #[test]
    fn test_sparse_file_is_not_resident() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sparse.dat");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();

        // Extend without touching any page: nothing to cache yet
        file.set_len((4 * page_size()) as u64).unwrap();

        assert!(!page_cache_populated(file.as_raw_fd(), 4).unwrap());
    }

    #[test]
    fn test_zero_ops_reports_clean() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.dat");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();

        assert!(!page_cache_populated(file.as_raw_fd(), 0).unwrap());
    }
}
