//! C control surface for hosts that want to drive or inspect the shim.
//!
//! Preloading alone is enough for redirection; these entry points exist for
//! hosts that link the library directly or want counters for diagnostics.

use hugemap_core::runtime;
use libc::{c_char, c_int, c_uint, c_void};
use tracing::debug;

/// ABI version for compatibility checking
pub const HUGEMAP_ABI_VERSION: u32 = 1;

pub const HUGEMAP_SUCCESS: c_int = 0;
pub const HUGEMAP_ERROR_INVALID_ARGUMENT: c_int = -1;

/// Counters reported by [`hugemap_get_stats`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HugemapCStats {
    pub live_regions: u64,
    pub live_bytes: u64,
    pub peak_bytes: u64,
    pub total_tracked: u64,
    pub total_released: u64,
    pub redirected: u64,
    pub huge_page_fallbacks: u64,
    pub passed_through: u64,
    pub failed: u64,
}

/// Get ABI version for compatibility validation
#[cfg_attr(not(test), unsafe(no_mangle))]
pub extern "C" fn hugemap_abi_version() -> c_uint {
    HUGEMAP_ABI_VERSION
}

/// Get library version string
///
/// The returned pointer is valid for the lifetime of the program.
#[cfg_attr(not(test), unsafe(no_mangle))]
pub extern "C" fn hugemap_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

/// Initialize logging, resolve the real primitives and build the service.
///
/// Runs automatically at load time; calling it again is harmless.
///
/// # Returns
/// HUGEMAP_SUCCESS
#[cfg_attr(not(test), unsafe(no_mangle))]
pub extern "C" fn hugemap_init() -> c_int {
    runtime::init();
    HUGEMAP_SUCCESS
}

/// Discard the allocation records.
///
/// Redirected regions stay mapped. After this call, an `munmap` of such a
/// region is forwarded with the caller's length instead of the tracked size.
///
/// # Returns
/// HUGEMAP_SUCCESS
#[cfg_attr(not(test), unsafe(no_mangle))]
pub extern "C" fn hugemap_shutdown() -> c_int {
    runtime::shutdown();
    HUGEMAP_SUCCESS
}

/// Fill `out` with the current counters.
///
/// All fields are zero until the first intercepted call or [`hugemap_init`].
///
/// # Safety
/// `out` must be null or point to writable memory for one `HugemapCStats`.
///
/// # Returns
/// HUGEMAP_SUCCESS, or HUGEMAP_ERROR_INVALID_ARGUMENT if `out` is null
#[cfg_attr(not(test), unsafe(no_mangle))]
pub unsafe extern "C" fn hugemap_get_stats(out: *mut HugemapCStats) -> c_int {
    if out.is_null() {
        debug!("hugemap_get_stats called with null output pointer");
        return HUGEMAP_ERROR_INVALID_ARGUMENT;
    }

    let stats = match runtime::stats() {
        Some((tracker, calls)) => HugemapCStats {
            live_regions: tracker.live_regions as u64,
            live_bytes: tracker.live_bytes as u64,
            peak_bytes: tracker.peak_bytes as u64,
            total_tracked: tracker.total_tracked,
            total_released: tracker.total_released,
            redirected: calls.redirected,
            huge_page_fallbacks: calls.huge_page_fallbacks,
            passed_through: calls.passed_through,
            failed: calls.failed,
        },
        None => HugemapCStats::default(),
    };
    unsafe { out.write(stats) };
    HUGEMAP_SUCCESS
}

/// 1 if `addr` is the start of a live redirected region, 0 otherwise.
#[cfg_attr(not(test), unsafe(no_mangle))]
pub extern "C" fn hugemap_is_tracked(addr: *const c_void) -> c_int {
    runtime::is_tracked(addr) as c_int
}
