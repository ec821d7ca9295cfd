use anyhow::{Context, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// A fixed-size pool of named worker threads serving one priority class.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(name: &'static str, threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("{name}-worker-{i}"))
            .build()
            .with_context(|| format!("failed to build {name} worker pool"))?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queues `job` behind earlier submissions to this pool.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn_fifo(job);
    }
}
