//! Batch fan-out over a process-wide worker pool.
//!
//! Feature queries arrive with potentially large node-id batches. The
//! pool splits a batch into contiguous ranges, one per worker, runs a
//! caller-supplied body against a per-worker output state, and hands the
//! states back in worker order so assembly preserves input order.

use std::ops::Range;

use rayon::ThreadPool;

use crate::error::{GraphError, Result};

/// Hardware-thread worker pool for subdividing query batches.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Build a pool with one thread per hardware thread.
    pub fn new() -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tessera-worker-{}", i))
            .build()
            .map_err(|e| GraphError::WorkerPool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// How many workers a batch of `total` items is split across.
    ///
    /// `chunk = total / threads`; when a chunk would be empty the batch is
    /// too small to be worth splitting and a single worker takes it all.
    pub fn concurrency(&self, total: usize) -> usize {
        let threads = self.pool.current_num_threads();
        if total / threads == 0 {
            1
        } else {
            threads
        }
    }

    /// Split `[0, total)` into contiguous ascending ranges and run `body`
    /// on each with its own worker state, returning the states in worker
    /// order.
    ///
    /// Worker `i` covers `[i*chunk, (i+1)*chunk)`; the last worker absorbs
    /// the remainder. The call blocks until every worker finishes.
    pub fn run_chunks<W, F>(&self, total: usize, make_worker: impl FnMut() -> W, body: F) -> Vec<W>
    where
        W: Send,
        F: Fn(usize, Range<usize>, &mut W) + Sync,
    {
        let concurrency = self.concurrency(total);
        let chunk = total / self.pool.current_num_threads();
        let mut workers: Vec<W> = std::iter::repeat_with(make_worker)
            .take(concurrency)
            .collect();

        if concurrency == 1 {
            body(0, 0..total, &mut workers[0]);
            return workers;
        }

        let body = &body;
        self.pool.scope(|scope| {
            for (i, worker) in workers.iter_mut().enumerate() {
                let start = i * chunk;
                let end = if i + 1 == concurrency { total } else { start + chunk };
                scope.spawn(move |_| body(i, start..end, worker));
            }
        });
        workers
    }
}

// ── Tests ──────────────────────────────────────────────────────────
