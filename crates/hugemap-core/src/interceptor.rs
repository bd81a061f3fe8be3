//! The redirecting decorator around the real mapping primitives
//!
//! [`Redirector`] implements [`MapPrimitives`] by wrapping another
//! implementation. Most calls are forwarded untouched. A whole-file mapping
//! of a hugetlbfs descriptor is instead served from anonymous memory that is
//! filled by reading the file, and the matching `munmap` is serviced from
//! the tracker.
//!
//! Failures the `mmap` contract can express come back as `MAP_FAILED` with
//! `errno` set; the caller never sees anything but ordinary primitive
//! semantics.

use crate::classifier::FsClassifier;
use crate::config::LoaderConfig;
use crate::error::Result;
use crate::gib;
use crate::loader::stream_into;
use crate::primitives::{MAP_FAILED, MapPrimitives, MapRequest, set_errno};
use crate::region::{AnonRegion, Backing};
use crate::source::FdSource;
use crate::tracker::AllocationTracker;
use libc::{c_int, c_void};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, trace, warn};

// ── Decision ────────────────────────────────────────────────────────

/// Why a mapping call was forwarded to the real primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// Redirection switched off by configuration.
    Disabled,
    /// No file behind the mapping.
    Anonymous,
    /// The descriptor is not on hugetlbfs.
    NotHugetlbfs,
    /// Offset mappings are not redirected.
    NonZeroOffset,
    /// The caller chose the address; a redirect cannot honor it.
    FixedAddress,
    /// Left to the real primitive so it reports `EINVAL`.
    EmptyLength,
    /// `fstat` on the descriptor failed.
    StatFailed,
    /// Only part of the file is being mapped.
    PartialFile { file_size: u64 },
}

/// Outcome of the redirect eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    PassThrough(PassReason),
    Redirect { len: usize },
}

impl Decision {
    /// Apply the eligibility rules to one request.
    ///
    /// The filesystem query and the `fstat` are supplied lazily and are only
    /// consulted once the cheaper checks have passed.
    pub fn evaluate(
        req: &MapRequest,
        enabled: bool,
        on_hugetlbfs: impl FnOnce(c_int) -> bool,
        file_size: impl FnOnce(c_int) -> io::Result<u64>,
    ) -> Self {
        use PassReason::*;

        if !enabled {
            return Self::PassThrough(Disabled);
        }
        if req.is_anonymous() {
            return Self::PassThrough(Anonymous);
        }
        if !on_hugetlbfs(req.fd) {
            return Self::PassThrough(NotHugetlbfs);
        }
        if req.offset != 0 {
            return Self::PassThrough(NonZeroOffset);
        }
        if req.is_fixed() {
            return Self::PassThrough(FixedAddress);
        }
        if req.len == 0 {
            return Self::PassThrough(EmptyLength);
        }
        match file_size(req.fd) {
            Ok(size) if size == req.len as u64 => Self::Redirect { len: req.len },
            Ok(size) => Self::PassThrough(PartialFile { file_size: size }),
            Err(err) => {
                warn!("Failed to stat fd {}: {}", req.fd, err);
                Self::PassThrough(StatFailed)
            }
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }
}

// ── Counters ────────────────────────────────────────────────────────

/// Snapshot of the decorator's call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedirectStats {
    /// Mapping calls served by the redirect path
    pub redirected: u64,
    /// Redirects that fell back from huge pages to regular memory
    pub huge_page_fallbacks: u64,
    /// Mapping calls forwarded untouched
    pub passed_through: u64,
    /// Redirects that returned `MAP_FAILED`
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    redirected: AtomicU64,
    huge_page_fallbacks: AtomicU64,
    passed_through: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RedirectStats {
        RedirectStats {
            redirected: self.redirected.load(Ordering::Relaxed),
            huge_page_fallbacks: self.huge_page_fallbacks.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

// ── Redirector ──────────────────────────────────────────────────────

/// Decorator that redirects whole-file hugetlbfs mappings.
#[derive(Debug)]
pub struct Redirector<P, C> {
    inner: P,
    classifier: C,
    config: LoaderConfig,
    tracker: AllocationTracker,
    counters: Counters,
}

impl<P: MapPrimitives, C: FsClassifier> Redirector<P, C> {
    pub fn new(inner: P, classifier: C, config: LoaderConfig) -> Self {
        Self {
            inner,
            classifier,
            config,
            tracker: AllocationTracker::new(),
            counters: Counters::default(),
        }
    }

    /// The wrapped delegate.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn tracker(&self) -> &AllocationTracker {
        &self.tracker
    }

    pub fn stats(&self) -> RedirectStats {
        self.counters.snapshot()
    }

    /// Run the eligibility check against the live descriptor.
    pub fn decide(&self, req: &MapRequest) -> Decision {
        Decision::evaluate(
            req,
            self.config.enabled,
            |fd| self.classifier.is_hugetlbfs(fd),
            // SAFETY: the host passed `fd` to mmap, so it is open for this call.
            |fd| unsafe { FdSource::borrow(fd) }.len(),
        )
    }

    /// Allocate, load, narrow protection and track. On error nothing is
    /// left mapped and nothing is tracked.
    ///
    /// # Safety
    /// `req.fd` must be open for the duration of the call.
    unsafe fn redirect(&self, req: &MapRequest, len: usize) -> Result<*mut c_void> {
        info!("Intercepting hugetlbfs mmap for {:.2} GB file (fd {})", gib(len as u64), req.fd);

        let mut region = AnonRegion::allocate(&self.inner, len, self.config.use_huge_pages)?;
        if self.config.use_huge_pages && region.backing() == Backing::Regular {
            Counters::bump(&self.counters.huge_page_fallbacks);
        }

        // SAFETY: guaranteed by the caller.
        let mut source = unsafe { FdSource::borrow(req.fd) };
        stream_into(&mut source, region.as_mut_slice(), &self.config)?;

        if !req.wants_write() {
            if let Err(err) = region.protect(req.prot) {
                warn!("mprotect failed: {} (region stays writable)", err);
            }
        }

        // Huge-page regions are tracked at their rounded size, the only
        // length the kernel accepts when releasing them.
        let mapped_len = region.mapped_len();
        let addr = region.into_raw();
        if let Some(stale) = self.tracker.insert(addr as usize, mapped_len) {
            debug!("Replaced stale record of {} bytes at {:p}", stale, addr);
        }
        Ok(addr)
    }
}

impl<P: MapPrimitives, C: FsClassifier> MapPrimitives for Redirector<P, C> {
    unsafe fn map(&self, req: &MapRequest) -> *mut c_void {
        let len = match self.decide(req) {
            Decision::Redirect { len } => len,
            Decision::PassThrough(reason) => {
                trace!(fd = req.fd, len = req.len, ?reason, "passing mmap through");
                Counters::bump(&self.counters.passed_through);
                return unsafe { self.inner.map(req) };
            }
        };

        match unsafe { self.redirect(req, len) } {
            Ok(addr) => {
                Counters::bump(&self.counters.redirected);
                addr
            }
            Err(err) => {
                error!("hugetlbfs redirect failed: {}", err);
                Counters::bump(&self.counters.failed);
                // Set last so releasing the region cannot clobber it.
                set_errno(err.errno());
                MAP_FAILED
            }
        }
    }

    unsafe fn unmap(&self, addr: *mut c_void, len: usize) -> c_int {
        let Some(tracked) = self.tracker.remove_if_present(addr as usize) else {
            return unsafe { self.inner.unmap(addr, len) };
        };

        info!("Unmapping {:.2} GB huge pages allocation", gib(tracked as u64));
        if len != tracked {
            debug!("munmap length {} released as tracked size {}", len, tracked);
        }
        unsafe { self.inner.unmap(addr, tracked) }
    }

    unsafe fn protect(&self, addr: *mut c_void, len: usize, prot: c_int) -> c_int {
        unsafe { self.inner.protect(addr, len, prot) }
    }
}

impl<P, C> Redirector<P, C> {
    /// Forget every tracked record (bookkeeping only) and return them.
    pub fn discard_records(&self) -> Vec<(usize, usize)> {
        self.tracker.drain()
    }
}
