//! Row scheduling for the grid scan
//!
//! Rows are independent: every worker reads the shared points and index and
//! writes only its own row, so the parallel scan produces exactly the same
//! values as the sequential one. Without the `parallel` feature every mode
//! runs sequentially.

use serde::{Deserialize, Serialize};
use scattergrid_core::Result;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// How output rows are distributed across threads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Single-threaded, row-major
    #[default]
    Sequential,
    /// Rayon's global pool
    Parallel,
    /// Dedicated pool with the given number of threads
    ParallelWith(usize),
}

impl ExecutionMode {
    /// Mode for a thread count: 1 is sequential, 0 uses every core
    pub fn from_threads(threads: usize) -> Self {
        match threads {
            0 => ExecutionMode::Parallel,
            1 => ExecutionMode::Sequential,
            n => ExecutionMode::ParallelWith(n),
        }
    }

    pub fn is_parallel(&self) -> bool {
        cfg!(feature = "parallel") && !matches!(self, ExecutionMode::Sequential)
    }

    /// Compute `f(scratch, row)` for every row in `0..rows`, in row order.
    ///
    /// `init` creates one scratch value per worker. The first error aborts
    /// the remaining rows.
    pub(crate) fn map_rows<S, T, I, F>(&self, rows: usize, init: I, f: F) -> Result<Vec<T>>
    where
        T: Send,
        I: Fn() -> S + Sync + Send,
        F: Fn(&mut S, usize) -> Result<T> + Sync + Send,
    {
        match self {
            ExecutionMode::Sequential => sequential(rows, init, f),
            #[cfg(feature = "parallel")]
            ExecutionMode::Parallel => (0..rows)
                .into_par_iter()
                .map_init(init, |scratch, row| f(scratch, row))
                .collect(),
            #[cfg(feature = "parallel")]
            ExecutionMode::ParallelWith(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build()
                    .map_err(|e| {
                        scattergrid_core::Error::Algorithm(format!(
                            "failed to build thread pool: {}",
                            e
                        ))
                    })?;
                pool.install(|| {
                    (0..rows)
                        .into_par_iter()
                        .map_init(init, |scratch, row| f(scratch, row))
                        .collect()
                })
            }
            #[cfg(not(feature = "parallel"))]
            _ => sequential(rows, init, f),
        }
    }
}

fn sequential<S, T, I, F>(rows: usize, init: I, f: F) -> Result<Vec<T>>
where
    I: Fn() -> S,
    F: Fn(&mut S, usize) -> Result<T>,
{
    let mut scratch = init();
    (0..rows).map(|row| f(&mut scratch, row)).collect()
}
