// Single-threaded cooperative event dispatcher. One OS thread drains a FIFO
// job queue; callers enqueue closures and may block on `wait_for_event` until
// everything up to a given id has been processed.

use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    id: u64,
    bundle_id: Option<u64>,
    work: Job,
}

struct Shared {
    queue: Mutex<VecDeque<QueuedJob>>,
    not_empty: Condvar,
    completion: Mutex<()>,
    completed_cvar: Condvar,
    next_event_id: AtomicU64,
    completed_event_id: AtomicU64,
    stopping: AtomicBool,
    uninstalled_bundles: Mutex<HashSet<u64>>,
}

/// The framework's event bus: one dedicated thread, one ordered queue.
pub struct EventBus {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            completion: Mutex::new(()),
            completed_cvar: Condvar::new(),
            next_event_id: AtomicU64::new(1),
            completed_event_id: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
            uninstalled_bundles: Mutex::new(HashSet::new()),
        });

        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("modhost-event-bus".into())
            .spawn(move || run_loop(worker_shared))
            .expect("failed to spawn event bus thread");

        Self {
            shared,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Reserve the next event id without enqueuing any work. The caller can
    /// pass this id to `fire_generic` and then race `wait_for_event` against
    /// it; `completed_event_id` uses a max-update (see `run_loop`) so a job
    /// reserved-but-not-yet-pushed can never make a later completion regress
    /// the counter backwards underneath a waiter.
    pub fn next_event_id(&self) -> u64 {
        self.shared.next_event_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueue arbitrary work to run on the event thread, returning its id.
    /// Id assignment and the queue push happen under the same lock, so two
    /// concurrent callers can never land their jobs in the queue in an order
    /// that contradicts their ids.
    pub fn enqueue(&self, bundle_id: Option<u64>, work: impl FnOnce() + Send + 'static) -> u64 {
        let mut queue = self.shared.queue.lock().unwrap();
        let id = self.shared.next_event_id.fetch_add(1, Ordering::SeqCst);
        queue.push_back(QueuedJob {
            id,
            bundle_id,
            work: Box::new(work),
        });
        drop(queue);
        self.shared.not_empty.notify_all();
        id
    }

    fn enqueue_with_id(&self, id: u64, bundle_id: Option<u64>, work: impl FnOnce() + Send + 'static) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(QueuedJob {
            id,
            bundle_id,
            work: Box::new(work),
        });
        self.shared.not_empty.notify_all();
    }

    /// `do_work` runs on the event thread; `on_done` is guaranteed to run
    /// after it, even if `do_work` panics.
    pub fn fire_generic(
        &self,
        event_id: u64,
        _bundle_id: u64,
        name: impl Into<String>,
        do_work: impl FnOnce() + Send + 'static,
        on_done: impl FnOnce() + Send + 'static,
    ) {
        let name = name.into();
        self.enqueue_with_id(event_id, Some(_bundle_id), move || {
            let result = panic::catch_unwind(AssertUnwindSafe(do_work));
            if let Err(payload) = result {
                let msg = panic_message(&payload);
                error!("generic event '{name}' panicked: {msg}");
            }
            on_done();
        });
    }

    /// Block until every event with id <= `event_id` has completed. Returns
    /// immediately if `event_id` was never issued.
    pub fn wait_for_event(&self, event_id: u64) {
        let issued = self.shared.next_event_id.load(Ordering::SeqCst);
        if event_id >= issued {
            return;
        }
        let guard = self.shared.completion.lock().unwrap();
        let _unused = self
            .shared
            .completed_cvar
            .wait_while(guard, |_| {
                self.shared.completed_event_id.load(Ordering::SeqCst) < event_id
            })
            .unwrap();
    }

    /// Mark a bundle as uninstalled; queued jobs tagged with this bundle id
    /// are dropped rather than executed during drain.
    pub fn mark_bundle_uninstalled(&self, bundle_id: u64) {
        self.shared.uninstalled_bundles.lock().unwrap().insert(bundle_id);
    }

    /// Drain the queue to completion, dropping jobs for uninstalled bundles,
    /// then join the event thread.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.not_empty.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn run_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if shared.stopping.load(Ordering::SeqCst) {
                    break None;
                }
                queue = shared.not_empty.wait(queue).unwrap();
            }
        };

        let Some(job) = job else { break };

        let skip = job
            .bundle_id
            .map(|id| shared.uninstalled_bundles.lock().unwrap().contains(&id))
            .unwrap_or(false);

        if !skip {
            let result = panic::catch_unwind(AssertUnwindSafe(job.work));
            if let Err(payload) = result {
                let msg = panic_message(&payload);
                error!("event bus job panicked: {msg}");
            }
        } else {
            warn!("dropping event {} for uninstalled bundle", job.id);
        }

        let _completion = shared.completion.lock().unwrap();
        // A job reserved via `next_event_id` can be pushed to the queue later
        // than a job reserved after it, so completion order doesn't always
        // match id order; fetch_max keeps this counter from ever regressing
        // backwards underneath a `wait_for_event` call already past a later id.
        shared.completed_event_id.fetch_max(job.id, Ordering::SeqCst);
        drop(_completion);
        shared.completed_cvar.notify_all();
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if !self.shared.stopping.load(Ordering::SeqCst) {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn wait_for_event_blocks_until_work_completes() {
        let bus = EventBus::new();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);
        let done_flag = Arc::new(AtomicBool::new(false));
        let done_clone = Arc::clone(&done_flag);

        let id = bus.next_event_id();
        bus.fire_generic(
            id,
            1,
            "t",
            move || {
                std::thread::sleep(Duration::from_millis(50));
                flag_clone.store(true, Ordering::SeqCst);
            },
            move || {
                done_clone.store(true, Ordering::SeqCst);
            },
        );

        bus.wait_for_event(id);
        assert!(flag.load(Ordering::SeqCst));
        assert!(done_flag.load(Ordering::SeqCst));
        bus.stop();
    }

    #[test]
    fn wait_for_never_issued_event_returns_immediately() {
        let bus = EventBus::new();
        bus.wait_for_event(9999);
        bus.stop();
    }

    #[test]
    fn jobs_run_in_fifo_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut last_id = 0;
        for i in 0..5 {
            let order = Arc::clone(&order);
            last_id = bus.enqueue(None, move || {
                order.lock().unwrap().push(i);
            });
        }
        bus.wait_for_event(last_id);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        bus.stop();
    }

    #[test]
    fn on_done_runs_even_if_work_panics() {
        let bus = EventBus::new();
        let done = Arc::new(AtomicU32::new(0));
        let done_clone = Arc::clone(&done);
        let id = bus.next_event_id();
        bus.fire_generic(
            id,
            1,
            "boom",
            || panic!("boom"),
            move || {
                done_clone.fetch_add(1, Ordering::SeqCst);
            },
        );
        bus.wait_for_event(id);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        bus.stop();
    }

    #[test]
    fn drops_jobs_for_uninstalled_bundles() {
        let bus = EventBus::new();
        bus.mark_bundle_uninstalled(7);
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let id = bus.enqueue(Some(7), move || {
            ran_clone.store(true, Ordering::SeqCst);
        });
        bus.wait_for_event(id);
        assert!(!ran.load(Ordering::SeqCst));
        bus.stop();
    }
}
