//! Filesystem classification for file descriptors.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::RawFd;

/// `f_type` reported by `statfs` for hugetlbfs (`linux/magic.h`).
pub const HUGETLBFS_MAGIC: u32 = 0x9584_58f6;

/// Decides whether a descriptor is backed by the huge-page filesystem.
pub trait FsClassifier: Send + Sync {
    /// Must be side-effect free. Any failure to determine the answer is
    /// reported as `false` so the call is passed through.
    fn is_hugetlbfs(&self, fd: RawFd) -> bool;
}

/// Production classifier: `fstatfs(2)` and a magic-number comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatfsClassifier;

impl StatfsClassifier {
    /// Raw filesystem type of `fd`, truncated to the 32 bits the kernel uses.
    pub fn fs_type(fd: RawFd) -> io::Result<u32> {
        let mut buf = MaybeUninit::<libc::statfs>::uninit();
        // SAFETY: buf is large enough for a statfs; fstatfs writes it fully on success.
        let rc = unsafe { libc::fstatfs(fd, buf.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: rc == 0 means the kernel initialized buf.
        let stat = unsafe { buf.assume_init() };
        // f_type is signed on some targets; the magic is a 32-bit pattern.
        Ok(stat.f_type as u32)
    }
}

impl FsClassifier for StatfsClassifier {
    fn is_hugetlbfs(&self, fd: RawFd) -> bool {
        match Self::fs_type(fd) {
            Ok(kind) => kind == HUGETLBFS_MAGIC,
            Err(_) => false,
        }
    }
}

impl<F> FsClassifier for F
where
    F: Fn(RawFd) -> bool + Send + Sync,
{
    fn is_hugetlbfs(&self, fd: RawFd) -> bool {
        self(fd)
    }
}
