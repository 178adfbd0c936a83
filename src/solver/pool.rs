use rayon::prelude::*;
use tracing::debug;

use crate::error::{OperationError, Result};

/// Fixed-size worker pool for data-parallel loops.
///
/// Work is assigned statically with a stride: worker `tid` handles indices
/// `tid, tid + size, tid + 2 * size, ...`.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Builds a pool of `num_threads` workers, or one per available core.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AllocationFailure`] if the threads cannot be spawned.
    pub fn new(num_threads: Option<usize>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.unwrap_or(0))
            .thread_name(|i| format!("tissue-mesh-{i}"))
            .build()
            .map_err(|e| OperationError::AllocationFailure(format!("worker pool: {e}")))?;
        debug!(threads = pool.current_num_threads(), "worker pool ready");
        Ok(Self { pool })
    }

    /// Number of workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Calls `f(i)` for every `i` in `0..n`, blocking until all calls return.
    pub fn parallel_for<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        let stride = self.size();
        self.pool.install(|| {
            (0..stride).into_par_iter().for_each(|tid| {
                let mut i = tid;
                while i < n {
                    f(i);
                    i += stride;
                }
            });
        });
    }

    /// Evaluates `f(i)` for every `i` in `0..n` and returns the results in
    /// index order.
    pub fn parallel_map<T, F>(&self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        let stride = self.size();
        let chunks: Vec<Vec<T>> = self.pool.install(|| {
            (0..stride)
                .into_par_iter()
                .map(|tid| (tid..n).step_by(stride).map(&f).collect())
                .collect()
        });

        let mut iters: Vec<_> = chunks.into_iter().map(Vec::into_iter).collect();
        let mut result = Vec::with_capacity(n);
        for i in 0..n {
            if let Some(value) = iters[i % stride].next() {
                result.push(value);
            }
        }
        result
    }
}
