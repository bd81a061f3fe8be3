//! Process-wide service behind the exported hooks
//!
//! Holds the one [`SymbolResolver`] and the one [`Redirector`] of the
//! process, both lazily initialized. The interposition shim calls
//! [`intercept_mmap`] / [`intercept_munmap`] and nothing else; load and
//! unload hooks call [`init`] / [`shutdown`].

use crate::classifier::StatfsClassifier;
use crate::config::LoaderConfig;
use crate::gib;
use crate::guard::HookGuard;
use crate::interceptor::{RedirectStats, Redirector};
use crate::logging;
use crate::primitives::{MapPrimitives, MapRequest};
use crate::resolver::{RealSymbols, SymbolResolver};
use crate::tracker::TrackerStats;
use libc::{c_int, c_void};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// The decorator as installed in a real process.
pub type HugemapService = Redirector<RealSymbols, StatfsClassifier>;

static RESOLVER: SymbolResolver = SymbolResolver::new();
static SERVICE: OnceLock<HugemapService> = OnceLock::new();

/// The real primitives, resolving them on first use.
pub fn delegate() -> RealSymbols {
    RESOLVER.symbols()
}

/// The process-wide redirector, built on first use.
pub fn service() -> &'static HugemapService {
    SERVICE.get_or_init(|| {
        let config = LoaderConfig::from_env().unwrap_or_else(|err| {
            warn!("Ignoring invalid configuration: {}", err);
            LoaderConfig::default()
        });
        Redirector::new(delegate(), StatfsClassifier, config)
    })
}

/// Entry point for the exported `mmap`.
///
/// # Safety
/// Same contract as `mmap(2)`.
pub unsafe fn intercept_mmap(req: &MapRequest) -> *mut c_void {
    match HookGuard::enter() {
        Some(_guard) => unsafe { service().map(req) },
        None => unsafe { delegate().map(req) },
    }
}

/// Entry point for the exported `munmap`.
///
/// # Safety
/// Same contract as `munmap(2)`.
pub unsafe fn intercept_munmap(addr: *mut c_void, len: usize) -> c_int {
    match HookGuard::enter() {
        Some(_guard) => unsafe { service().unmap(addr, len) },
        None => unsafe { delegate().unmap(addr, len) },
    }
}

/// Load-time initialization: logging, eager symbol resolution, service.
///
/// Idempotent. Aborts the process if the real primitives cannot be found.
pub fn init() {
    let _guard = HookGuard::enter();
    logging::init();
    delegate();
    let svc = service();
    info!(
        "hugemap loaded (PID: {}, redirect {})",
        std::process::id(),
        if svc.config().enabled { "enabled" } else { "disabled" }
    );
}

/// Unload-time cleanup: discard leftover bookkeeping.
///
/// The regions themselves stay mapped; they belong to the host, which may
/// still be reading them while other destructors run, and process exit
/// reclaims them.
pub fn shutdown() {
    let _guard = HookGuard::enter();
    let Some(svc) = SERVICE.get() else {
        return;
    };
    let leftovers = svc.discard_records();
    if leftovers.is_empty() {
        return;
    }
    for (addr, size) in &leftovers {
        debug!("Leftover region {:#x} ({} bytes)", addr, size);
    }
    let bytes: usize = leftovers.iter().map(|(_, size)| size).sum();
    info!(
        "Discarding {} tracked region(s) ({:.2} GB) at unload",
        leftovers.len(),
        gib(bytes as u64)
    );
}

/// Tracker and call counters, if the service has been built.
pub fn stats() -> Option<(TrackerStats, RedirectStats)> {
    SERVICE.get().map(|svc| (svc.tracker().stats(), svc.stats()))
}

/// Whether `addr` is a live redirected region.
pub fn is_tracked(addr: *const c_void) -> bool {
    SERVICE.get().is_some_and(|svc| svc.tracker().contains(addr as usize))
}
