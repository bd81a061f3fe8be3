//! Core logic for redirecting whole-file `mmap` calls on hugetlbfs
//!
//! The kernel cannot service an ordinary file-backed mapping of a hugetlbfs
//! file the way inference engines expect. This crate decides when a mapping
//! request should be redirected, allocates anonymous (preferably huge-page)
//! memory, streams the file into it, and tracks the result so the matching
//! `munmap` releases the right allocation.
//!
//! Nothing here exports `mmap`/`munmap` symbols; that is the job of the thin
//! `hugemap-ffi` shim. Everything in this crate can be exercised in-process
//! with fake classifiers and recording primitives.

pub mod classifier;
pub mod config;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod loader;
pub mod logging;
pub mod primitives;
pub mod region;
pub mod resolver;
pub mod runtime;
pub mod source;
pub mod tracker;

pub use classifier::{FsClassifier, HUGETLBFS_MAGIC, StatfsClassifier};
pub use config::{ConfigError, LoaderConfig};
pub use error::{HugemapError, Result};
pub use guard::HookGuard;
pub use interceptor::{Decision, PassReason, RedirectStats, Redirector};
pub use loader::{LoadReport, ProgressMeter, stream_into};
pub use primitives::{MAP_FAILED, MapPrimitives, MapRequest};
pub use region::{AnonRegion, Backing};
pub use resolver::{RealSymbols, SymbolResolver};
pub use source::FdSource;
pub use tracker::{AllocationTracker, TrackerStats};

/// Bytes per GiB, used for human-readable diagnostics.
pub(crate) const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Render a byte count as GiB for log lines.
pub(crate) fn gib(bytes: impl Into<u64>) -> f64 {
    bytes.into() as f64 / GIB
}
