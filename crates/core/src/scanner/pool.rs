use std::sync::{Arc, Mutex, PoisonError};

use rayon::ThreadPool;
use tracing::{info, warn};

use crate::error::Result;

/// Fingerprint worker pool whose width can change mid-scan.
///
/// Resizing builds a new pool; work already running on the old one finishes there,
/// and the next cluster picks up the new pool.
pub struct WorkerPool {
    state: Mutex<(usize, Arc<ThreadPool>)>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        Ok(Self {
            state: Mutex::new((workers, Arc::new(build(workers)?))),
        })
    }

    pub fn current(&self) -> Arc<ThreadPool> {
        Arc::clone(&self.state.lock().unwrap_or_else(PoisonError::into_inner).1)
    }

    pub fn workers(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    pub fn set_workers(&self, workers: usize) {
        let workers = workers.max(1);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.0 == workers {
            return;
        }
        match build(workers) {
            Ok(pool) => {
                info!(from = state.0, to = workers, "resized fingerprint pool");
                *state = (workers, Arc::new(pool));
            }
            Err(e) => warn!(workers, error = %e, "failed to resize fingerprint pool"),
        }
    }
}

fn build(workers: usize) -> Result<ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("photosift-fp-{i}"))
        .build()?)
}
