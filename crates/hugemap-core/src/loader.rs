//! Streamed loading of a file into a pre-allocated region
//!
//! The redirect path replaces a file-backed mapping with anonymous memory,
//! so the file's bytes have to be copied in explicitly. The copy is done in
//! bounded chunks from offset zero and is all-or-nothing: any error or a
//! premature end of file fails the whole load.

use crate::config::LoaderConfig;
use crate::error::{HugemapError, Result};
use crate::gib;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::time::{Duration, Instant};
use tracing::info;

/// Summary of a completed load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadReport {
    pub bytes: usize,
    pub elapsed: Duration,
}

impl LoadReport {
    /// Throughput in GiB/s, or zero for an instantaneous load.
    pub fn gib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { gib(self.bytes as u64) / secs } else { 0.0 }
    }
}

/// Emits a progress mark each time the loaded byte count crosses a multiple
/// of the interval.
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    interval: u64,
    next_mark: u64,
}

impl ProgressMeter {
    pub fn new(interval: u64) -> Self {
        let interval = interval.max(1);
        Self { interval, next_mark: interval }
    }

    /// Record that `done` bytes are loaded. Returns the highest mark crossed
    /// since the previous call, if any.
    pub fn advance(&mut self, done: u64) -> Option<u64> {
        if done < self.next_mark {
            return None;
        }
        let crossed = done / self.interval * self.interval;
        self.next_mark = crossed + self.interval;
        Some(crossed)
    }
}

/// Fill `dst` with the first `dst.len()` bytes of `src`.
///
/// Rewinds `src` first. Short reads continue from where they stopped;
/// `Interrupted` is retried. A zero-length read before `dst` is full is
/// [`HugemapError::UnexpectedEof`].
pub fn stream_into<R: Read + Seek>(
    src: &mut R,
    dst: &mut [u8],
    config: &LoaderConfig,
) -> Result<LoadReport> {
    let total = dst.len();
    let chunk = config.chunk_size.max(1);
    let started = Instant::now();

    src.seek(SeekFrom::Start(0)).map_err(HugemapError::Seek)?;

    let mut meter = ProgressMeter::new(config.progress_interval);
    let mut filled = 0usize;
    while filled < total {
        let end = total.min(filled.saturating_add(chunk));
        match src.read(&mut dst[filled..end]) {
            Ok(0) => return Err(HugemapError::UnexpectedEof { offset: filled, expected: total }),
            Ok(n) => {
                filled += n;
                if let Some(mark) = meter.advance(filled as u64) {
                    info!("   ... loaded {:.1} GB / {:.1} GB", gib(mark), gib(total as u64));
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => return Err(HugemapError::Read { offset: filled, source }),
        }
    }

    let report = LoadReport { bytes: filled, elapsed: started.elapsed() };
    info!(
        "Successfully loaded {:.2} GB into memory in {:.1}s ({:.2} GB/s)",
        gib(report.bytes as u64),
        report.elapsed.as_secs_f64(),
        report.gib_per_sec()
    );
    Ok(report)
}
