//! Error types for the redirect path.

use std::io;
use std::os::raw::c_int;
use thiserror::Error;

/// Errors produced while resolving primitives or servicing a redirect.
///
/// Only [`HugemapError::SymbolResolution`] is fatal. Every other variant is
/// surfaced to the caller as `MAP_FAILED` with `errno` taken from
/// [`HugemapError::errno`].
#[derive(Debug, Error)]
pub enum HugemapError {
    #[error("failed to resolve real `{symbol}`: {reason}")]
    SymbolResolution { symbol: &'static str, reason: String },

    #[error("anonymous allocation of {size} bytes failed: {source}")]
    Allocation {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to rewind descriptor: {0}")]
    Seek(#[source] io::Error),

    #[error("read failed at offset {offset}: {source}")]
    Read {
        offset: usize,
        #[source]
        source: io::Error,
    },

    #[error("unexpected EOF at offset {offset} (expected {expected} bytes)")]
    UnexpectedEof { offset: usize, expected: usize },
}

impl HugemapError {
    /// The `errno` value a caller of `mmap` should observe for this failure.
    pub fn errno(&self) -> c_int {
        match self {
            Self::Allocation { source, .. } => source.raw_os_error().unwrap_or(libc::ENOMEM),
            Self::Seek(source) | Self::Read { source, .. } => {
                source.raw_os_error().unwrap_or(libc::EIO)
            }
            Self::UnexpectedEof { .. } => libc::EIO,
            Self::SymbolResolution { .. } => libc::ENOSYS,
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, HugemapError>;
