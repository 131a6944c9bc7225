use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use threadpool::ThreadPool;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queue of independent work items drained by a pool of workers.
///
/// Submission never blocks and there is no per-job handle: the only way to
/// synchronise is [`Scheduler::wait_for_all_complete`], which returns once
/// every job submitted so far (including jobs submitted by other jobs) has
/// finished running.
pub trait Scheduler: Send + Sync {
    fn submit(&self, job: Job);

    fn submit_many(&self, jobs: Vec<Job>) {
        for job in jobs {
            self.submit(job);
        }
    }

    /// Blocks the calling thread until no jobs are outstanding.
    ///
    /// Must not be called from inside a job.
    fn wait_for_all_complete(&self);

    fn num_worker_threads(&self) -> usize;
}

struct Outstanding {
    count: AtomicUsize,
    panicked: AtomicUsize,
    lock: Mutex<()>,
    all_done: Condvar,
}

impl Outstanding {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
            lock: Mutex::new(()),
            all_done: Condvar::new(),
        }
    }

    fn add(&self, n: usize) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    fn complete(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _lock = self.lock.lock();
            self.all_done.notify_all();
        }
    }

    fn wait(&self) {
        let mut lock = self.lock.lock();
        while self.count.load(Ordering::Acquire) != 0 {
            self.all_done.wait(&mut lock);
        }
    }
}

/// Marks a job as finished when dropped, so a job that panics still
/// releases its slot in the outstanding counter.
struct CompletionGuard(Arc<Outstanding>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.panicked.fetch_add(1, Ordering::AcqRel);
        }
        self.0.complete();
    }
}

enum Backend {
    Pool(Mutex<ThreadPool>),
    Inline(Mutex<VecDeque<Job>>),
}

/// [`Scheduler`] backed by a `threadpool::ThreadPool`.
///
/// A manager created with zero threads runs in inline mode: jobs are queued
/// and executed in FIFO order on the thread that calls
/// `wait_for_all_complete`. This gives a fully deterministic schedule.
pub struct TaskManager {
    name: String,
    backend: Backend,
    outstanding: Arc<Outstanding>,
}

impl TaskManager {
    pub fn new(num_threads: usize) -> Self {
        Self::with_name("task-manager", num_threads)
    }

    pub fn with_name<T: Into<String>>(name: T, num_threads: usize) -> Self {
        let name = name.into();
        let backend = if num_threads == 0 {
            Backend::Inline(Mutex::new(VecDeque::new()))
        } else {
            let pool = threadpool::Builder::new()
                .num_threads(num_threads)
                .thread_name(name.clone())
                .build();
            Backend::Pool(Mutex::new(pool))
        };

        log::debug!("{}: started with {} worker thread(s)", name, num_threads);

        Self {
            name,
            backend,
            outstanding: Arc::new(Outstanding::new()),
        }
    }

    /// Zero-thread manager; see the type level docs.
    pub fn inline() -> Self {
        Self::with_name("inline-task-manager", 0)
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn is_inline(&self) -> bool {
        match self.backend {
            Backend::Inline(_) => true,
            Backend::Pool(_) => false,
        }
    }

    /// Number of submitted jobs that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.count.load(Ordering::Acquire)
    }

    /// Number of jobs that unwound with a panic since this manager was created.
    pub fn panicked_count(&self) -> usize {
        self.outstanding.panicked.load(Ordering::Acquire)
    }

    fn drain_inline(&self, queue: &Mutex<VecDeque<Job>>) {
        loop {
            let job = queue.lock().pop_front();
            match job {
                Some(job) => {
                    let _guard = CompletionGuard(self.outstanding.clone());
                    job();
                }
                None => break,
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl Scheduler for TaskManager {
    fn submit(&self, job: Job) {
        self.outstanding.add(1);
        match &self.backend {
            Backend::Pool(pool) => {
                let guard = CompletionGuard(self.outstanding.clone());
                pool.lock().execute(move || {
                    let _guard = guard;
                    job();
                });
            }
            Backend::Inline(queue) => queue.lock().push_back(job),
        }
    }

    fn submit_many(&self, jobs: Vec<Job>) {
        self.outstanding.add(jobs.len());
        match &self.backend {
            Backend::Pool(pool) => {
                let pool = pool.lock();
                for job in jobs {
                    let guard = CompletionGuard(self.outstanding.clone());
                    pool.execute(move || {
                        let _guard = guard;
                        job();
                    });
                }
            }
            Backend::Inline(queue) => queue.lock().extend(jobs),
        }
    }

    fn wait_for_all_complete(&self) {
        match &self.backend {
            Backend::Pool(_) => self.outstanding.wait(),
            Backend::Inline(queue) => self.drain_inline(queue),
        }
    }

    fn num_worker_threads(&self) -> usize {
        match &self.backend {
            Backend::Pool(pool) => pool.lock().max_count(),
            Backend::Inline(_) => 0,
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.wait_for_all_complete();
    }
}
