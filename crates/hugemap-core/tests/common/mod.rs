//! Shared fixtures for the redirect integration tests.
#![allow(dead_code)]

use hugemap_core::primitives::set_errno;
use hugemap_core::region::huge_page_size;
use hugemap_core::{LoaderConfig, MAP_FAILED, MapPrimitives, MapRequest, RealSymbols};
use libc::{c_int, c_void};
use std::collections::HashSet;
use std::io::Write;
use std::os::fd::RawFd;
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// One recorded `mmap` call, with the address hint as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapCall {
    pub addr: usize,
    pub len: usize,
    pub prot: c_int,
    pub flags: c_int,
    pub fd: c_int,
    pub offset: i64,
    pub result: usize,
}

/// Real libc primitives that record every call.
///
/// By default `MAP_HUGETLB` requests are refused with `ENOMEM`: test
/// machines rarely have a reserved pool, and refusing deterministically keeps
/// the fallback path observable. [`Recording::granting_huge_pages`] instead
/// grants them with ordinary memory while enforcing the hugetlb rule that
/// map, protect and unmap lengths are whole huge pages.
pub struct Recording {
    real: RealSymbols,
    grant_huge_pages: bool,
    huge_regions: Mutex<HashSet<usize>>,
    maps: Mutex<Vec<MapCall>>,
    unmaps: Mutex<Vec<(usize, usize)>>,
    protects: Mutex<Vec<(usize, usize, c_int)>>,
}

impl Recording {
    pub fn new() -> Self {
        Self {
            real: RealSymbols::resolve_next().expect("libc primitives"),
            grant_huge_pages: false,
            huge_regions: Mutex::new(HashSet::new()),
            maps: Mutex::new(Vec::new()),
            unmaps: Mutex::new(Vec::new()),
            protects: Mutex::new(Vec::new()),
        }
    }

    pub fn granting_huge_pages() -> Self {
        Self { grant_huge_pages: true, ..Self::new() }
    }

    pub fn maps(&self) -> Vec<MapCall> {
        self.maps.lock().unwrap().clone()
    }

    pub fn unmaps(&self) -> Vec<(usize, usize)> {
        self.unmaps.lock().unwrap().clone()
    }

    pub fn protects(&self) -> Vec<(usize, usize, c_int)> {
        self.protects.lock().unwrap().clone()
    }

    /// Successful anonymous allocations, in call order.
    pub fn anonymous_allocations(&self) -> Vec<MapCall> {
        self.maps()
            .into_iter()
            .filter(|c| c.fd < 0 && c.result != MAP_FAILED as usize)
            .collect()
    }

    /// Huge-page regions granted and not yet released.
    pub fn live_huge_regions(&self) -> usize {
        self.huge_regions.lock().unwrap().len()
    }

    fn map_huge(&self, req: &MapRequest) -> *mut c_void {
        if !self.grant_huge_pages {
            set_errno(libc::ENOMEM);
            return MAP_FAILED;
        }
        if req.len % huge_page_size() != 0 {
            set_errno(libc::EINVAL);
            return MAP_FAILED;
        }
        let plain = MapRequest { flags: req.flags & !libc::MAP_HUGETLB, ..*req };
        let ptr = unsafe { self.real.map(&plain) };
        if ptr != MAP_FAILED {
            self.huge_regions.lock().unwrap().insert(ptr as usize);
        }
        ptr
    }

    fn violates_hugetlb_length(&self, addr: *mut c_void, len: usize) -> bool {
        self.huge_regions.lock().unwrap().contains(&(addr as usize)) && len % huge_page_size() != 0
    }
}

impl MapPrimitives for Recording {
    unsafe fn map(&self, req: &MapRequest) -> *mut c_void {
        let result = if req.flags & libc::MAP_HUGETLB != 0 {
            self.map_huge(req)
        } else {
            unsafe { self.real.map(req) }
        };
        let errno = last_errno();
        self.maps.lock().unwrap().push(MapCall {
            addr: req.addr as usize,
            len: req.len,
            prot: req.prot,
            flags: req.flags,
            fd: req.fd,
            offset: req.offset as i64,
            result: result as usize,
        });
        // Recording must not disturb the errno the caller observes.
        set_errno(errno);
        result
    }

    unsafe fn unmap(&self, addr: *mut c_void, len: usize) -> c_int {
        self.unmaps.lock().unwrap().push((addr as usize, len));
        if self.violates_hugetlb_length(addr, len) {
            set_errno(libc::EINVAL);
            return -1;
        }
        self.huge_regions.lock().unwrap().remove(&(addr as usize));
        unsafe { self.real.unmap(addr, len) }
    }

    unsafe fn protect(&self, addr: *mut c_void, len: usize, prot: c_int) -> c_int {
        self.protects.lock().unwrap().push((addr as usize, len, prot));
        if self.violates_hugetlb_length(addr, len) {
            set_errno(libc::EINVAL);
            return -1;
        }
        unsafe { self.real.protect(addr, len, prot) }
    }
}

/// Classifier that treats every descriptor as hugetlbfs.
pub fn always_hugetlbfs(_fd: RawFd) -> bool {
    true
}

/// Small chunks so multi-chunk loads happen with small fixtures.
pub fn small_config() -> LoaderConfig {
    LoaderConfig {
        chunk_size: 64 * 1024,
        progress_interval: 512 * 1024,
        ..LoaderConfig::default()
    }
}

/// Deterministic, position-dependent bytes.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| ((i * 131 + seed as usize * 7) % 251) as u8).collect()
}

/// A temp file holding `data`.
pub fn fixture(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(data).expect("write fixture");
    file.flush().expect("flush fixture");
    file
}

/// A read-only whole-file request for `fd`.
pub fn whole_file(fd: RawFd, len: usize) -> MapRequest {
    MapRequest::new(std::ptr::null_mut(), len, libc::PROT_READ, libc::MAP_PRIVATE, fd, 0)
}

/// View a returned mapping as bytes.
///
/// # Safety
/// `ptr` must be a live readable mapping of at least `len` bytes.
pub unsafe fn bytes<'a>(ptr: *mut c_void, len: usize) -> &'a [u8] {
    unsafe { std::slice::from_raw_parts(ptr as *const u8, len) }
}

pub fn last_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
