//! Process-wide worker pool shared by the parse driver and the chunk
//! store's prefetcher. Initialized on first use and kept for the life of
//! the process so repeated parses in one session amortize thread startup.

use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::Lazy;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
        let mut handles = Vec::with_capacity(size);
        for _ in 0..size {
            let receiver = receiver.clone();
            handles.push(thread::spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            }));
        }
        Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a job. Returns false when the pool has shut down; callers run
    /// the work inline in that case.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> bool {
        let guard = self.sender.lock().unwrap();
        match guard.as_ref() {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Drain queued jobs and join the workers. Idempotent; meant to be
    /// called once at process exit.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().unwrap().take();
        drop(sender);
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

static GLOBAL_POOL: Lazy<WorkerPool> = Lazy::new(|| WorkerPool::new(num_cpus::get()));

/// The shared pool handle. Callers that need isolation (tests, embedders
/// with their own threading budget) construct a private `WorkerPool` and
/// pass it to [`super::parse_with`] instead.
pub fn global_pool() -> &'static WorkerPool {
    &GLOBAL_POOL
}

/// Shut down the shared pool if it was ever initialized.
pub fn shutdown_global_pool() {
    if let Some(pool) = Lazy::get(&GLOBAL_POOL) {
        pool.shutdown();
    }
}
