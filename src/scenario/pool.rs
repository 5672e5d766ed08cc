//! Named worker thread pool with an unbounded FIFO queue.

use crate::error::{Error, Result};
use crate::platform::{set_current_thread_priority, Priority};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};

type Task = Box<dyn FnOnce() + Send>;

/// Upper bound on workers per pool
pub const MAX_POOL_SIZE: usize = 256;

struct PoolInner {
    name: String,
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    active_tasks: AtomicUsize,
    tasks_completed: AtomicU64,
}

/// Fixed-size group of worker threads sharing one priority
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    priority: Priority,
}

impl ThreadPool {
    /// Spawn `size` workers named `<name>-<n>`
    pub fn new(name: &str, size: usize, priority: Priority) -> Result<Self> {
        if size == 0 || size > MAX_POOL_SIZE {
            return Err(Error::invalid_argument(format!(
                "thread pool <{name}> size must be in 1..={MAX_POOL_SIZE}, got {size}"
            )));
        }
        let inner = Arc::new(PoolInner {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active_tasks: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
        });

        let pool = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(size)),
            size,
            priority,
        };
        for i in 0..size {
            let inner = Arc::clone(&pool.inner);
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || {
                    set_current_thread_priority(priority);
                    worker_loop(&inner)
                })
                .map_err(|e| Error::SystemError(format!("can't spawn worker for pool <{name}>: {e}")));
            match handle {
                Ok(h) => pool.workers.lock().push(h),
                Err(e) => {
                    pool.stop(false);
                    return Err(e);
                }
            }
        }
        debug!(pool = name, size, priority = priority.as_str(), "thread pool started");
        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Queue a task. Rejected with InvalidUsage once the pool is stopped.
    pub fn run(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        {
            let mut queue = self.inner.queue.lock();
            if self.inner.shutdown.load(Ordering::Acquire) {
                return Err(Error::invalid_usage(format!("thread pool <{}> is stopped", self.inner.name)));
            }
            queue.push_back(Box::new(task));
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no task is running
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.active_tasks.load(Ordering::Acquire) > 0 {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Stop accepting work. With `wait`, queued tasks run before workers exit;
    /// otherwise queued tasks are dropped. Workers are joined either way.
    pub fn stop(&self, wait: bool) {
        {
            let mut queue = self.inner.queue.lock();
            self.inner.shutdown.store(true, Ordering::Release);
            if !wait {
                queue.clear();
            }
            self.inner.work_ready.notify_all();
        }
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let current = std::thread::current().id();
        for handle in workers {
            // a task may stop its own pool; never join the calling thread
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn tasks_completed(&self) -> u64 {
        self.inner.tasks_completed.load(Ordering::Relaxed)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop(true);
    }
}

/// Decrements the active counter even when a task panics
struct ActiveTaskGuard<'a> {
    inner: &'a PoolInner,
}

impl Drop for ActiveTaskGuard<'_> {
    fn drop(&mut self) {
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);
        let queue = self.inner.queue.lock();
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::AcqRel);
        if prev_active == 1 && queue.is_empty() {
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    inner.active_tasks.fetch_add(1, Ordering::AcqRel);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            let message = e
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "(non-string panic)".to_string());
            error!(pool = %inner.name, panic = %message, "task panicked");
        }
    }
}
