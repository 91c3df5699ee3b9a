//! Worker pool for processing units

use footprint_core::{Error, Result};
use rayon::prelude::*;

/// Processing mode for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    #[default]
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// `Some(1)` is sequential, `None` or `Some(0)` uses every core
    pub fn from_workers(workers: Option<usize>) -> Self {
        match workers {
            None | Some(0) => ProcessingMode::Parallel,
            Some(1) => ProcessingMode::Sequential,
            Some(n) => ProcessingMode::ParallelWith(n),
        }
    }

    pub fn threads(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            ProcessingMode::Parallel => rayon::current_num_threads(),
            ProcessingMode::ParallelWith(n) => *n,
        }
    }

    /// Map `f` over `items` on this mode's pool.
    ///
    /// Sequential runs install a one-thread pool so the row-parallel stages
    /// inside `f` stay on a single thread as well.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match self {
            ProcessingMode::Parallel => Ok(items.par_iter().map(f).collect()),
            ProcessingMode::Sequential | ProcessingMode::ParallelWith(_) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.threads())
                    .build()
                    .map_err(|e| Error::Other(format!("failed to build thread pool: {e}")))?;
                Ok(pool.install(|| items.par_iter().map(f).collect()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workers_setting() {
        assert_eq!(ProcessingMode::from_workers(None), ProcessingMode::Parallel);
        assert_eq!(ProcessingMode::from_workers(Some(0)), ProcessingMode::Parallel);
        assert_eq!(ProcessingMode::from_workers(Some(1)), ProcessingMode::Sequential);
        assert_eq!(ProcessingMode::from_workers(Some(3)), ProcessingMode::ParallelWith(3));
    }

    #[test]
    fn map_preserves_order() {
        let items: Vec<usize> = (0..100).collect();
        for mode in [
            ProcessingMode::Sequential,
            ProcessingMode::Parallel,
            ProcessingMode::ParallelWith(2),
        ] {
            let out = mode.map(&items, |i| i * 2).unwrap();
            assert_eq!(out, items.iter().map(|i| i * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn sequential_uses_one_thread() {
        let out = ProcessingMode::Sequential
            .map(&[()], |_| rayon::current_num_threads())
            .unwrap();
        assert_eq!(out, vec![1]);
    }
}
