//! Anonymous memory for the redirect path, with huge-page fallback.

use crate::error::{HugemapError, Result};
use crate::gib;
use crate::primitives::{MAP_FAILED, MapPrimitives, MapRequest};
use libc::c_void;
use std::io;
use std::ptr::NonNull;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Used when `/proc/meminfo` has no `Hugepagesize` line.
pub const FALLBACK_HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Size of the pages `MAP_HUGETLB` hands out without an explicit size flag.
///
/// Read once from `/proc/meminfo`.
pub fn huge_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| {
        read_meminfo("Hugepagesize:")
            .and_then(|kb| usize::try_from(kb).ok()?.checked_mul(1024))
            .filter(|&size| size > 0)
            .unwrap_or(FALLBACK_HUGE_PAGE_SIZE)
    })
}

/// Free pages in the default huge-page pool, if the kernel reports them.
pub fn free_huge_pages() -> Option<u64> {
    read_meminfo("HugePages_Free:")
}

fn read_meminfo(key: &str) -> Option<u64> {
    let info = std::fs::read_to_string("/proc/meminfo").ok()?;
    meminfo_value(&info, key)
}

/// First number on the `key` line of a meminfo dump. Units are not converted.
fn meminfo_value(info: &str, key: &str) -> Option<u64> {
    info.lines()
        .find(|l| l.starts_with(key))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse::<u64>().ok())
}

/// What kind of pages back a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// `MAP_HUGETLB` succeeded.
    HugePages,
    /// Ordinary anonymous memory, after a failed or skipped huge-page request.
    Regular,
}

/// A private anonymous read/write region that is unmapped on drop unless
/// handed off with [`AnonRegion::into_raw`].
///
/// `len` is what the caller asked for. `mapped_len` is what the kernel
/// mapped: for huge pages it is rounded up to a whole number of pages, since
/// `munmap` and `mprotect` on hugetlb memory reject any other length.
#[derive(Debug)]
pub struct AnonRegion<'a, P: MapPrimitives> {
    prims: &'a P,
    ptr: NonNull<u8>,
    len: usize,
    mapped_len: usize,
    backing: Backing,
}

impl<'a, P: MapPrimitives> AnonRegion<'a, P> {
    /// Allocate `len` bytes through `prims`.
    ///
    /// With `try_huge_pages` the first attempt requests `MAP_HUGETLB` for
    /// `len` rounded up to [`huge_page_size`]; if the huge-page pool cannot
    /// satisfy it, one retry is made with ordinary anonymous memory.
    pub fn allocate(prims: &'a P, len: usize, try_huge_pages: bool) -> Result<Self> {
        if try_huge_pages {
            match Self::map_huge(prims, len) {
                Ok((ptr, mapped_len)) => {
                    info!("Allocated {:.2} GB with MAP_HUGETLB", gib(mapped_len as u64));
                    return Ok(Self { prims, ptr, len, mapped_len, backing: Backing::HugePages });
                }
                Err(err) => {
                    warn!("MAP_HUGETLB failed ({}), trying regular anonymous mmap", err);
                }
            }
        }

        let ptr = Self::map_anon(prims, len, 0)
            .map_err(|source| HugemapError::Allocation { size: len, source })?;
        Ok(Self { prims, ptr, len, mapped_len: len, backing: Backing::Regular })
    }

    fn map_huge(prims: &P, len: usize) -> io::Result<(NonNull<u8>, usize)> {
        let mapped_len = len
            .checked_next_multiple_of(huge_page_size())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOMEM))?;
        let ptr = Self::map_anon(prims, mapped_len, libc::MAP_HUGETLB)?;
        Ok((ptr, mapped_len))
    }

    fn map_anon(prims: &P, len: usize, extra_flags: libc::c_int) -> io::Result<NonNull<u8>> {
        let req = MapRequest::anonymous(len, extra_flags);
        // SAFETY: anonymous private mapping with no address hint.
        let ptr = unsafe { prims.map(&req) };
        if ptr == MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| io::Error::from_raw_os_error(libc::ENOMEM))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length of the underlying mapping; the size to unmap it with.
    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    pub fn backing(&self) -> Backing {
        self.backing
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    /// The first `len` bytes of the mapping.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: we own a writable mapping of at least `len` bytes.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Change the protection of the whole mapping.
    pub fn protect(&self, prot: libc::c_int) -> io::Result<()> {
        // SAFETY: the range is exactly our mapping.
        let rc = unsafe { self.prims.protect(self.as_ptr(), self.mapped_len, prot) };
        if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    /// Give up ownership; the caller becomes responsible for unmapping
    /// [`AnonRegion::mapped_len`] bytes.
    pub fn into_raw(self) -> *mut c_void {
        let ptr = self.as_ptr();
        std::mem::forget(self);
        ptr
    }
}

impl<P: MapPrimitives> Drop for AnonRegion<'_, P> {
    fn drop(&mut self) {
        // SAFETY: the region was mapped by us and never handed out.
        let rc = unsafe { self.prims.unmap(self.as_ptr(), self.mapped_len) };
        if rc != 0 {
            warn!("Failed to release {} byte region: {}", self.mapped_len, io::Error::last_os_error());
        }
    }
}
