//! Exported `mmap` family.
//!
//! Symbols are left unmangled only outside unit tests, so the test binary
//! keeps using libc's own primitives.

use hugemap_core::MapRequest;
use hugemap_core::runtime;
use libc::{c_int, c_void, off_t, size_t};

/// Interposed `mmap(2)`.
///
/// # Safety
/// Same contract as `mmap(2)`.
#[cfg_attr(not(test), unsafe(no_mangle))]
pub unsafe extern "C" fn mmap(
    addr: *mut c_void,
    length: size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: off_t,
) -> *mut c_void {
    let req = MapRequest::new(addr, length, prot, flags, fd, offset);
    unsafe { runtime::intercept_mmap(&req) }
}

/// Interposed `mmap64`, the large-file alias glibc exposes on 64-bit targets.
///
/// # Safety
/// Same contract as `mmap(2)`.
#[cfg(target_pointer_width = "64")]
#[cfg_attr(not(test), unsafe(no_mangle))]
pub unsafe extern "C" fn mmap64(
    addr: *mut c_void,
    length: size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: off_t,
) -> *mut c_void {
    unsafe { mmap(addr, length, prot, flags, fd, offset) }
}

/// Interposed `munmap(2)`.
///
/// # Safety
/// Same contract as `munmap(2)`.
#[cfg_attr(not(test), unsafe(no_mangle))]
pub unsafe extern "C" fn munmap(addr: *mut c_void, length: size_t) -> c_int {
    unsafe { runtime::intercept_munmap(addr, length) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;

    #[test]
    fn test_export_signatures() {
        let _mmap: unsafe extern "C" fn(*mut c_void, size_t, c_int, c_int, c_int, off_t) -> *mut c_void =
            mmap;
        let _munmap: unsafe extern "C" fn(*mut c_void, size_t) -> c_int = munmap;
        #[cfg(target_pointer_width = "64")]
        {
            let _mmap64: unsafe extern "C" fn(
                *mut c_void,
                size_t,
                c_int,
                c_int,
                c_int,
                off_t,
            ) -> *mut c_void = mmap64;
        }
    }

    #[test]
    fn test_anonymous_round_trip() {
        unsafe {
            let ptr = mmap(
                std::ptr::null_mut(),
                8192,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            assert_ne!(ptr, libc::MAP_FAILED);
            *(ptr as *mut u8) = 7;
            assert_eq!(munmap(ptr, 8192), 0);
        }
    }

    #[test]
    fn test_regular_file_is_mapped_by_libc() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"plain file contents").unwrap();

        unsafe {
            let ptr = mmap(
                std::ptr::null_mut(),
                19,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            );
            assert_ne!(ptr, libc::MAP_FAILED);
            assert!(!runtime::is_tracked(ptr));
            assert_eq!(std::slice::from_raw_parts(ptr as *const u8, 19), b"plain file contents");
            assert_eq!(munmap(ptr, 19), 0);
        }
    }
}
