//! Worker threads executing kernel tasks.
use crate::prelude::*;
use crate::types::WorkerConfig;
use ghostflow_core::util::{Future, Promise};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Pool of worker threads shared by all kernels of a runtime.
///
/// Fork-join kernels run on it through [`TaskPool::install`]: a worker waiting for the other
/// half of a split steals pending tasks instead of blocking. Detached work is submitted with
/// [`TaskPool::spawn`], which hands back a [`Future`] for the result.
#[derive(Debug, Clone)]
pub struct TaskPool {
    pool: Arc<ThreadPool>,
}

impl TaskPool {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("ghostflow-worker-{}", i));

        if let Some(n) = config.num_threads {
            builder = builder.num_threads(n);
        }

        let pool = builder
            .build()
            .context("failed to create worker thread pool")?;

        debug!("started task pool with {} threads", pool.current_num_threads());

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `fun` inside the pool and waits for it. Any rayon operation issued by `fun` uses
    /// this pool's workers.
    pub fn install<F, R>(&self, fun: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(fun)
    }

    /// Submits `fun` to the pool without waiting for it.
    ///
    /// If `fun` panics, the promise is dropped and the returned future resolves to an error.
    pub fn spawn<F, R>(&self, fun: F) -> Future<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, future) = Promise::new();

        self.pool.spawn_fifo(move || {
            promise.complete(fun());
        });

        future
    }

    /// Runs `fun(i)` for every `i` in `0..n` as separate tasks and waits for all of them.
    pub fn scope_each<F>(&self, n: usize, fun: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        let fun = &fun;
        self.pool.scope(move |s| {
            for i in 0..n {
                s.spawn(move |_| fun(i));
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool() -> TaskPool {
        TaskPool::new(&WorkerConfig {
            num_threads: Some(3),
        })
        .unwrap()
    }

    #[test]
    fn test_spawn() {
        let pool = pool();
        assert_eq!(pool.num_threads(), 3);

        let futures = (0..10).map(|i| pool.spawn(move || i * i)).collect::<Vec<_>>();
        let values = Future::join_all(futures).wait();

        assert_eq!(values, (0..10).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_install_runs_on_worker() {
        let pool = pool();
        let name = pool.install(|| std::thread::current().name().map(String::from));

        assert!(name.unwrap().starts_with("ghostflow-worker-"));
    }

    #[test]
    fn test_scope_each() {
        let pool = pool();
        let counter = AtomicUsize::new(0);

        pool.scope_each(100, |i| {
            counter.fetch_add(i, Ordering::Relaxed);
        });

        assert_eq!(counter.load(Ordering::Relaxed), 4950);
    }
}
