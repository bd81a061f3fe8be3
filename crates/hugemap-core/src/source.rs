//! Borrowed access to the caller's file descriptor.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::mem::ManuallyDrop;
use std::os::fd::{FromRawFd, RawFd};

/// A `Read + Seek` view of a descriptor owned by the host process.
///
/// Dropping it never closes the descriptor.
#[derive(Debug)]
pub struct FdSource {
    file: ManuallyDrop<File>,
}

impl FdSource {
    /// # Safety
    /// `fd` must be an open descriptor that stays open for the lifetime of
    /// the returned value.
    pub unsafe fn borrow(fd: RawFd) -> Self {
        Self { file: ManuallyDrop::new(unsafe { File::from_raw_fd(fd) }) }
    }

    /// Current size of the underlying file according to `fstat`.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Read for FdSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self.file).read(buf)
    }
}

impl Seek for FdSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (&*self.file).seek(pos)
    }
}
