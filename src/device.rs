//! Kernel scheduling over a fixed worker grid.
//!
//! A [`Device`] models the data-parallel accelerator: a pool of
//! `blocks * threads` workers that a launch tiles a population of arbitrary
//! size across. Each tile covers one grid's worth of individual indices and
//! is joined before the next tile starts, so a kernel never observes a
//! partially written earlier stage.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// A failed device operation. Fatal: the engine aborts the run that hit it.
#[derive(Debug, Error)]
#[error("device fault: {message}")]
pub struct DeviceError {
    message: String,
}

impl DeviceError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Worker-grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grid {
    pub blocks: usize,
    pub threads: usize,
}

impl Grid {
    /// Individuals covered by one tile.
    pub fn stride(&self) -> usize {
        self.blocks * self.threads
    }
}

impl Default for Grid {
    fn default() -> Self {
        Grid { blocks: 8, threads: 64 }
    }
}

pub struct Device {
    grid: Grid,
    pool: ThreadPool,
}

impl Device {
    pub fn new(grid: Grid) -> Result<Self, DeviceError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(grid.threads.max(1))
            .thread_name(|i| format!("archipelago-worker-{i}"))
            .build()
            .map_err(|e| DeviceError::new(e.to_string()))?;
        Ok(Self { grid, pool })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    /// Runs `kernel` once per individual, handing it the individual's index
    /// and its `lane`-sized chunk of `out`.
    ///
    /// The index space (`out.len() / lane`) is walked in tiles of
    /// [`Grid::stride`]; all workers of a tile are joined before the next
    /// tile begins. Every index is visited exactly once. A panicking kernel
    /// is surfaced as a [`DeviceError`] at the tile boundary.
    pub fn launch<T, K>(&self, out: &mut [T], lane: usize, kernel: K) -> Result<(), DeviceError>
    where
        T: Send,
        K: Fn(usize, &mut [T]) + Sync,
    {
        debug_assert!(lane > 0 && out.len() % lane == 0);
        let size = out.len() / lane;
        let stride = self.grid.stride().max(1);

        let mut offset = 0;
        let mut rest = out;
        while offset < size {
            let tile = stride.min(size - offset);
            let (tile_out, tail) = std::mem::take(&mut rest).split_at_mut(tile * lane);
            rest = tail;

            let run = catch_unwind(AssertUnwindSafe(|| {
                self.pool.install(|| {
                    tile_out
                        .par_chunks_mut(lane)
                        .enumerate()
                        .for_each(|(tid, chunk)| kernel(offset + tid, chunk));
                });
            }));
            if let Err(payload) = run {
                return Err(DeviceError::new(fault_message(payload.as_ref())));
            }
            offset += tile;
        }
        Ok(())
    }
}

fn fault_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}
