//! LD_PRELOAD shim for hugetlbfs-backed model files
//!
//! Build the `cdylib` and preload it into a host that maps its weights from a
//! hugetlbfs mount:
//!
//! ```text
//! LD_PRELOAD=target/release/libhugemap.so llama-server -m /dev/hugepages/model.gguf
//! ```
//!
//! A whole-file `mmap` of a hugetlbfs file is replaced by an anonymous
//! region, backed by huge pages when the pool allows, filled by reading the
//! file. Every other call reaches libc unchanged. All decisions live in
//! `hugemap-core`; this crate only exports symbols.

pub mod c_api;
pub mod interpose;
mod lifecycle;

pub use c_api::*;
pub use interpose::*;
