//! Run-time resolution of the authentic `mmap`/`munmap`.
//!
//! The preloaded library shadows libc's symbols, so calling `libc::mmap`
//! from inside it would recurse into ourselves. The real functions are looked
//! up once with `dlsym(RTLD_NEXT, ..)` and cached for the life of the process.

use crate::error::{HugemapError, Result};
use crate::primitives::{MapPrimitives, MapRequest};
use libc::{c_int, c_void, off_t, size_t};
use std::cell::Cell;
use std::ffi::CStr;
use std::sync::OnceLock;

pub type MmapFn = unsafe extern "C" fn(*mut c_void, size_t, c_int, c_int, c_int, off_t) -> *mut c_void;
pub type MunmapFn = unsafe extern "C" fn(*mut c_void, size_t) -> c_int;

thread_local! {
    static RESOLVING: Cell<bool> = const { Cell::new(false) };
}

/// The pass-through delegate: the next `mmap`/`munmap` in symbol search order.
#[derive(Clone, Copy)]
pub struct RealSymbols {
    mmap: MmapFn,
    munmap: MunmapFn,
}

impl std::fmt::Debug for RealSymbols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealSymbols")
            .field("mmap", &(self.mmap as *const c_void))
            .field("munmap", &(self.munmap as *const c_void))
            .finish()
    }
}

impl RealSymbols {
    /// Look up both symbols in the libraries loaded after the caller.
    pub fn resolve_next() -> Result<Self> {
        let mmap = lookup_next(c"mmap", "mmap")?;
        let munmap = lookup_next(c"munmap", "munmap")?;
        // SAFETY: both symbols are the libc functions with exactly these signatures.
        unsafe {
            Ok(Self {
                mmap: std::mem::transmute::<*mut c_void, MmapFn>(mmap),
                munmap: std::mem::transmute::<*mut c_void, MunmapFn>(munmap),
            })
        }
    }

    /// Direct system calls, used only while the cache is being filled on
    /// the current thread.
    pub fn raw() -> Self {
        Self { mmap: raw_mmap, munmap: raw_munmap }
    }
}

impl MapPrimitives for RealSymbols {
    unsafe fn map(&self, req: &MapRequest) -> *mut c_void {
        unsafe { (self.mmap)(req.addr, req.len, req.prot, req.flags, req.fd, req.offset) }
    }

    unsafe fn unmap(&self, addr: *mut c_void, len: usize) -> c_int {
        unsafe { (self.munmap)(addr, len) }
    }
}

fn lookup_next(name: &CStr, symbol: &'static str) -> Result<*mut c_void> {
    // SAFETY: dlerror/dlsym are safe to call with a valid C string.
    unsafe {
        libc::dlerror();
        let ptr = libc::dlsym(libc::RTLD_NEXT, name.as_ptr());
        if !ptr.is_null() {
            return Ok(ptr);
        }
        let err = libc::dlerror();
        let reason = if err.is_null() {
            "symbol not found".to_string()
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        };
        Err(HugemapError::SymbolResolution { symbol, reason })
    }
}

unsafe extern "C" fn raw_mmap(
    addr: *mut c_void,
    len: size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: off_t,
) -> *mut c_void {
    // The raw syscall returns the address, or -1 with errno set: same as MAP_FAILED.
    unsafe { libc::syscall(libc::SYS_mmap, addr, len, prot, flags, fd, offset) as *mut c_void }
}

unsafe extern "C" fn raw_munmap(addr: *mut c_void, len: size_t) -> c_int {
    unsafe { libc::syscall(libc::SYS_munmap, addr, len) as c_int }
}

/// Lazily resolved, process-wide cache of [`RealSymbols`].
#[derive(Debug)]
pub struct SymbolResolver {
    cell: OnceLock<RealSymbols>,
}

impl Default for SymbolResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolResolver {
    pub const fn new() -> Self {
        Self { cell: OnceLock::new() }
    }

    /// The cached symbols, resolving them on first use.
    ///
    /// Concurrent first callers block until one of them has finished; none
    /// observes a partial result. A nested call from the resolving thread
    /// itself (the dynamic loader allocating inside `dlsym`) gets the raw
    /// syscall delegate. Resolution failure aborts the process.
    pub fn symbols(&self) -> RealSymbols {
        if let Some(symbols) = self.cell.get() {
            return *symbols;
        }
        if RESOLVING.try_with(Cell::get).unwrap_or(true) {
            return RealSymbols::raw();
        }
        *self.cell.get_or_init(|| {
            let _ = RESOLVING.try_with(|flag| flag.set(true));
            let resolved = RealSymbols::resolve_next();
            let _ = RESOLVING.try_with(|flag| flag.set(false));
            resolved.unwrap_or_else(|err| fatal(&err))
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Report an unrecoverable error and abort.
///
/// Written straight to stderr: the logging subscriber may not exist yet.
pub fn fatal(err: &HugemapError) -> ! {
    eprintln!("ERROR: hugemap: {err}");
    std::process::abort()
}
