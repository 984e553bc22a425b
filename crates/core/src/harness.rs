use crate::error::{GridError, Result};
use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;

/// Per-call settings for the map builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOptions {
    /// Worker count; `None` means the platform's available parallelism.
    pub ncores: Option<usize>,
    /// Window radius for the neighborhood correlation map.
    pub size: usize,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            ncores: None,
            size: 1,
        }
    }
}

impl MapOptions {
    pub fn ncores(mut self, ncores: usize) -> Self {
        self.ncores = Some(ncores);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

pub fn default_ncores() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Fixed-size worker pool running disjoint-write loops over a flat output.
///
/// Every loop body receives one output slot and its flat index; it may read
/// shared immutable input and write only that slot, so no locking is needed
/// and results do not depend on the worker count.
pub struct Harness {
    pool: ThreadPool,
    ncores: usize,
}

impl Harness {
    pub fn new(ncores: Option<usize>) -> Result<Self> {
        let ncores = ncores.unwrap_or_else(default_ncores);
        if ncores == 0 {
            return Err(GridError::ThreadCount(ncores));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(ncores)
            .thread_name(|i| format!("spatialcorr-{}", i))
            .build()
            .map_err(|e| GridError::ThreadPool(e.to_string()))?;
        debug!("built worker pool with {} threads", ncores);
        Ok(Self { pool, ncores })
    }

    pub fn ncores(&self) -> usize {
        self.ncores
    }

    /// Set every slot of `out` to `value`.
    pub fn fill(&self, out: &mut [f64], value: f64) {
        self.pool
            .install(|| out.par_iter_mut().for_each(|slot| *slot = value));
    }

    /// Run `op` once per output slot.
    pub fn for_each_cell<F>(&self, out: &mut [f64], op: F)
    where
        F: Fn(usize, &mut f64) + Sync + Send,
    {
        self.pool.install(|| {
            out.par_iter_mut()
                .enumerate()
                .for_each(|(cell, slot)| op(cell, slot))
        });
    }

    /// Run `op` once per contiguous row of `row_len` slots with a scratch
    /// value created by `init`. `row_len` must be positive.
    ///
    /// Scratch lives for one task partition and is never shared between
    /// workers; it is dropped when the partition finishes.
    pub fn for_each_row_with<T, I, F>(&self, out: &mut [f64], row_len: usize, init: I, op: F)
    where
        I: Fn() -> T + Sync + Send,
        F: Fn(&mut T, usize, &mut [f64]) + Sync + Send,
    {
        self.pool.install(|| {
            out.par_chunks_mut(row_len)
                .enumerate()
                .for_each_init(init, |scratch, (row, slots)| op(scratch, row, slots))
        });
    }
}
