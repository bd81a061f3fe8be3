//! The mapping primitive contract shared by the delegate and the decorator.
//!
//! [`MapPrimitives`] is the seam the interposition is modelled on: the real
//! libc functions implement it ([`crate::RealSymbols`]), and the redirecting
//! decorator ([`crate::Redirector`]) implements it by wrapping another
//! implementation. The exported `mmap`/`munmap` only ever call through it.

use libc::{c_int, c_void, off_t};

/// `mmap`'s failure sentinel, `(void *)-1`.
pub const MAP_FAILED: *mut c_void = libc::MAP_FAILED;

/// The argument tuple of one `mmap` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    pub addr: *mut c_void,
    pub len: usize,
    pub prot: c_int,
    pub flags: c_int,
    pub fd: c_int,
    pub offset: off_t,
}

impl MapRequest {
    pub fn new(
        addr: *mut c_void,
        len: usize,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: off_t,
    ) -> Self {
        Self { addr, len, prot, flags, fd, offset }
    }

    /// A private anonymous read/write request with no address hint.
    pub fn anonymous(len: usize, extra_flags: c_int) -> Self {
        Self::new(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | extra_flags,
            -1,
            0,
        )
    }

    pub fn is_anonymous(&self) -> bool {
        self.fd < 0 || self.flags & libc::MAP_ANONYMOUS != 0
    }

    pub fn is_fixed(&self) -> bool {
        self.flags & (libc::MAP_FIXED | libc::MAP_FIXED_NOREPLACE) != 0
    }

    pub fn wants_write(&self) -> bool {
        self.prot & libc::PROT_WRITE != 0
    }
}

/// Signature-level contract of `mmap`, `munmap` and `mprotect`.
///
/// Implementations must follow the libc return conventions exactly:
/// `MAP_FAILED` or `-1` on failure with `errno` set.
pub trait MapPrimitives: Send + Sync {
    /// # Safety
    /// Same contract as `mmap(2)`.
    unsafe fn map(&self, req: &MapRequest) -> *mut c_void;

    /// # Safety
    /// Same contract as `munmap(2)`.
    unsafe fn unmap(&self, addr: *mut c_void, len: usize) -> c_int;

    /// # Safety
    /// Same contract as `mprotect(2)`.
    unsafe fn protect(&self, addr: *mut c_void, len: usize, prot: c_int) -> c_int {
        unsafe { libc::mprotect(addr, len, prot) }
    }
}

impl<T: MapPrimitives + ?Sized> MapPrimitives for &T {
    unsafe fn map(&self, req: &MapRequest) -> *mut c_void {
        unsafe { (**self).map(req) }
    }

    unsafe fn unmap(&self, addr: *mut c_void, len: usize) -> c_int {
        unsafe { (**self).unmap(addr, len) }
    }

    unsafe fn protect(&self, addr: *mut c_void, len: usize, prot: c_int) -> c_int {
        unsafe { (**self).protect(addr, len, prot) }
    }
}

/// Read the calling thread's `errno`.
pub fn errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Overwrite the calling thread's `errno`.
pub fn set_errno(value: c_int) {
    // SAFETY: __errno_location always returns a valid thread-local pointer.
    unsafe { *libc::__errno_location() = value };
}
