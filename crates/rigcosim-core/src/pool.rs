use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::{CosimError, CosimResult};

/// Data-parallel workers private to one backend.
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(name: &str, threads: usize) -> CosimResult<Self> {
        let threads = threads.max(1);
        let prefix = name.to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|e| CosimError::config(format!("failed to build {name} worker pool: {e}")))?;
        debug!(pool = name, threads, "worker pool ready");
        Ok(Self { pool, threads })
    }

    #[inline] pub fn threads(&self) -> usize { self.threads }

    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R { self.pool.install(f) }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("threads", &self.threads).finish()
    }
}
