//! Stress tests for colseg.
//!
//! These tests verify behavior under heavy concurrent access: many threads
//! opening the same descriptor and reading through shared caches.

use colseg_core::{BlockCaches, MemSegment, SegmentFd, SegmentResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Open-read-close cycles per thread.
    pub iterations: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            iterations: 50,
        }
    }
}

/// Opens `fd` from many threads at once, reads every block of every column
/// and closes again.
///
/// `expected` is the segment `fd` was written from. One operation is one
/// open-read-close cycle. A cycle fails if any read errors or returns bytes
/// other than the ones written.
pub fn concurrent_open_stress(
    fd: Arc<SegmentFd>,
    expected: Arc<MemSegment>,
    caches: Option<BlockCaches>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let fd = Arc::clone(&fd);
            let expected = Arc::clone(&expected);
            let caches = caches.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let iterations = config.iterations;
            thread::spawn(move || {
                for _ in 0..iterations {
                    let matched = read_everything(&fd, &expected, caches.as_ref());
                    let counter = if matches!(matched, Ok(true)) {
                        &successful
                    } else {
                        &failed
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(config.iterations, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Reads every block once. `Ok(false)` means some block differed from
/// `expected`.
fn read_everything(
    fd: &SegmentFd,
    expected: &MemSegment,
    caches: Option<&BlockCaches>,
) -> SegmentResult<bool> {
    let mut segment = fd.open_with(caches)?;
    let mut same = segment.factories().len() == expected.columns().len();
    for (column_id, written) in expected.columns().iter().enumerate() {
        let column = segment.column(column_id as u32)?;
        for (pack_id, pack) in written.packs.iter().enumerate() {
            let pack_id = pack_id as u32;
            same &= column.index(pack_id)? == pack.index;
            same &= column.ext_index(pack_id)? == pack.ext_index;
            same &= column.pack(pack_id)? == pack.data;
        }
        same &= column.outer_index()? == written.outer_index;
    }
    segment.close();
    Ok(same)
}
