//! Task pool with per-worker queues and cooperative waiting
//!
//! A [`TaskPool`] owns one queue per unit of parallelism. Queue 0 belongs to
//! whichever thread waits in [`TaskGroup::sync`], the others to worker
//! threads. Submitting picks a queue round-robin, skipping queues whose lock
//! is taken. Workers pop from their own queue first, then steal from the
//! others.
//!
//! Waiting is cooperative: a thread in `sync` runs queued tasks (from any
//! group) until its own group has nothing pending, and only sleeps when no
//! task is runnable. Nested `sync` calls from inside tasks therefore cannot
//! starve the pool.
//!
//! Workers are started on first submission, exit after an idle timeout and
//! come back on the next submission. Dropping the last [`TaskPool`] handle
//! joins them.

use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// `(pool id, queue index)` of the worker running on this thread
    static WORKER: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

type TaskFn = Box<dyn FnOnce() -> bool + Send + 'static>;

struct Task {
    group: Arc<GroupState>,
    func: TaskFn,
}

#[derive(Debug, Default)]
struct GroupState {
    pending: AtomicUsize,
    failed: AtomicBool,
    stop_after_error: AtomicBool,
}

#[derive(Default)]
struct PoolState {
    /// Indexed by queue, slot 0 (the syncing thread) is always `None`
    workers: Vec<Option<JoinHandle<()>>>,
    running: Vec<bool>,
    shutdown: bool,
}

struct Shared {
    id: usize,
    queues: Vec<Mutex<VecDeque<Task>>>,
    next_queue: AtomicUsize,
    /// Tasks submitted and not yet popped
    queued: AtomicUsize,
    state: Mutex<PoolState>,
    /// Signalled when work is submitted, wakes idle workers
    work_cv: Condvar,
    /// Signalled when work is submitted or a task completes, wakes syncing threads
    sync_cv: Condvar,
    idle_timeout: Duration,
}

impl Shared {
    fn push(self: &Arc<Self>, task: Task) {
        task.group.pending.fetch_add(1, Ordering::SeqCst);
        self.queued.fetch_add(1, Ordering::SeqCst);

        let count = self.queues.len();
        let start = self.next_queue.fetch_add(1, Ordering::Relaxed) % count;
        let mut task = Some(task);
        for offset in 0..count {
            let idx = (start + offset) % count;
            if let Some(mut queue) = self.queues[idx].try_lock() {
                if let Some(task) = task.take() {
                    queue.push_back(task);
                }
                break;
            }
        }
        if let Some(task) = task {
            self.queues[start].lock().push_back(task);
        }

        let mut state = self.state.lock();
        self.start_workers(&mut state);
        self.work_cv.notify_one();
        self.sync_cv.notify_all();
    }

    fn pop(&self, own: usize) -> Option<Task> {
        let count = self.queues.len();
        for offset in 0..count {
            let idx = (own + offset) % count;
            if let Some(task) = self.queues[idx].lock().pop_front() {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                return Some(task);
            }
        }
        None
    }

    fn execute(&self, task: Task) {
        let group = task.group;
        let skip = group.stop_after_error.load(Ordering::SeqCst) && group.failed.load(Ordering::SeqCst);

        if !skip {
            let success = match catch_unwind(AssertUnwindSafe(task.func)) {
                Ok(success) => success,
                Err(_) => {
                    error!("Task panicked");
                    false
                }
            };
            if !success {
                group.failed.store(true, Ordering::SeqCst);
            }
        }

        group.pending.fetch_sub(1, Ordering::SeqCst);
        let _state = self.state.lock();
        self.sync_cv.notify_all();
    }

    fn start_workers(self: &Arc<Self>, state: &mut PoolState) {
        if state.shutdown {
            return;
        }

        for idx in 1..self.queues.len() {
            if state.running[idx] {
                continue;
            }
            // A previous worker for this slot already exited
            if let Some(handle) = state.workers[idx].take() {
                drop(handle);
            }

            let shared = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name(format!("kiln-worker-{}", idx))
                .spawn(move || shared.work(idx));
            match spawned {
                Ok(handle) => {
                    state.workers[idx] = Some(handle);
                    state.running[idx] = true;
                }
                Err(e) => error!("Failed to start worker thread: {}", e),
            }
        }
    }

    fn work(self: &Arc<Self>, idx: usize) {
        WORKER.with(|w| w.set(Some((self.id, idx))));
        debug!(worker = idx, "Worker started");

        loop {
            if let Some(task) = self.pop(idx) {
                self.execute(task);
                continue;
            }

            let mut state = self.state.lock();
            if state.shutdown {
                break;
            }
            if self.queued.load(Ordering::SeqCst) > 0 {
                drop(state);
                thread::yield_now();
                continue;
            }

            let timed_out = self
                .work_cv
                .wait_for(&mut state, self.idle_timeout)
                .timed_out();
            if state.shutdown {
                break;
            }
            if timed_out && self.queued.load(Ordering::SeqCst) == 0 {
                state.running[idx] = false;
                debug!(worker = idx, "Worker idle, exiting");
                return;
            }
        }

        self.state.lock().running[idx] = false;
    }

    /// Queue of the current thread in this pool: its own when it is one of
    /// our workers, the caller slot otherwise
    fn current_queue(&self) -> usize {
        WORKER.with(|w| match w.get() {
            Some((pool, idx)) if pool == self.id => idx,
            _ => 0,
        })
    }
}

struct PoolHandle {
    shared: Arc<Shared>,
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.work_cv.notify_all();
            state.workers.iter_mut().filter_map(Option::take).collect()
        };

        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() != current && handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

/// Shared handle on a pool of worker threads
#[derive(Clone)]
pub struct TaskPool {
    handle: Arc<PoolHandle>,
}

impl TaskPool {
    /// Pool running up to `jobs` tasks at once. The thread calling
    /// [`TaskGroup::sync`] counts as one, so `jobs - 1` workers are used.
    pub fn new(jobs: usize) -> Self {
        Self::with_idle_timeout(jobs, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(jobs: usize, idle_timeout: Duration) -> Self {
        let jobs = jobs.max(1);
        let shared = Arc::new(Shared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            queues: (0..jobs).map(|_| Mutex::new(VecDeque::new())).collect(),
            next_queue: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            state: Mutex::new(PoolState {
                workers: (0..jobs).map(|_| None).collect(),
                running: vec![false; jobs],
                shutdown: false,
            }),
            work_cv: Condvar::new(),
            sync_cv: Condvar::new(),
            idle_timeout,
        });

        Self {
            handle: Arc::new(PoolHandle { shared }),
        }
    }

    /// Maximum number of tasks running at once
    pub fn jobs(&self) -> usize {
        self.shared().queues.len()
    }

    /// Worker threads currently alive
    pub fn running_workers(&self) -> usize {
        self.shared().state.lock().running.iter().filter(|r| **r).count()
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.handle.shared
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("jobs", &self.jobs())
            .field("queued", &self.shared().queued.load(Ordering::Relaxed))
            .finish()
    }
}

/// A set of tasks waited for together
pub struct TaskGroup {
    pool: TaskPool,
    state: Arc<GroupState>,
}

impl TaskGroup {
    pub fn new(pool: &TaskPool) -> Self {
        Self {
            pool: pool.clone(),
            state: Arc::new(GroupState::default()),
        }
    }

    /// Skip tasks of this group that have not started once one failed
    pub fn with_stop_after_error(self, stop: bool) -> Self {
        self.state.stop_after_error.store(stop, Ordering::SeqCst);
        self
    }

    /// Queue `func`; returning false marks the group as failed
    pub fn run(&self, func: impl FnOnce() -> bool + Send + 'static) {
        self.pool.shared().push(Task {
            group: Arc::clone(&self.state),
            func: Box::new(func),
        });
    }

    /// Run queued tasks until every task of this group has finished.
    /// Returns whether all of them succeeded.
    pub fn sync(&self) -> bool {
        let shared = self.pool.shared();
        let own = shared.current_queue();

        loop {
            if self.state.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
            if let Some(task) = shared.pop(own) {
                shared.execute(task);
                continue;
            }

            let mut state = shared.state.lock();
            if self.state.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
            if shared.queued.load(Ordering::SeqCst) > 0 {
                drop(state);
                thread::yield_now();
                continue;
            }
            shared.sync_cv.wait(&mut state);
        }

        self.is_success()
    }

    pub fn is_success(&self) -> bool {
        !self.state.failed.load(Ordering::SeqCst)
    }

    /// Tasks queued or running
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        if self.pending() > 0 {
            self.sync();
        }
    }
}
