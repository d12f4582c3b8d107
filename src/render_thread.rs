//! Dedicated render thread: owns the producer GL context and drains a FIFO task queue.
//!
//! The decoder and the host both post work onto this thread instead of touching GL state
//! directly; this is what keeps the producer context confined to a single thread.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel as channel;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    tasks: Mutex<VecDeque<Task>>,
    not_empty: Condvar,
    shutdown: Mutex<bool>,
}

/// A single dedicated OS thread draining a FIFO of boxed closures in enqueue order.
///
/// `post` and `post_and_wait` may be called from any thread, including the render thread
/// itself (`post_and_wait` detects that case and runs the closure inline rather than
/// deadlocking against its own queue).
pub struct RenderThread {
    queue: Arc<Queue>,
    worker_id: thread::ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RenderThread {
    /// Spawns the dedicated render thread and raises its priority on a best-effort basis.
    pub fn spawn(name: &str) -> Arc<Self> {
        let queue = Arc::new(Queue {
            tasks: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            shutdown: Mutex::new(false),
        });

        let worker_queue = queue.clone();
        let (id_tx, id_rx) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                elevate_thread_priority();
                let _ = id_tx.send(thread::current().id());
                run_worker(&worker_queue);
            })
            .expect("failed to spawn render thread");

        let worker_id = id_rx
            .recv()
            .expect("render thread exited before reporting its id");

        Arc::new(Self {
            queue,
            worker_id,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Returns whether the calling thread is the render thread.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Enqueues `f` for execution on the render thread. Returns `false` if shutdown has begun
    /// (the task is dropped without running).
    pub fn post(&self, f: impl FnOnce() + Send + 'static) -> bool {
        if *self.queue.shutdown.lock().expect("lock poisoned") {
            return false;
        }
        self.queue
            .tasks
            .lock()
            .expect("lock poisoned")
            .push_back(Box::new(f));
        self.queue.not_empty.notify_one();
        true
    }

    /// Enqueues `f` and blocks the caller until it has run.
    ///
    /// Called from the render thread itself, `f` runs inline instead of being queued, since
    /// waiting on a task the thread would have to drain itself would deadlock.
    pub fn post_and_wait<R: Send + 'static>(&self, f: impl FnOnce() -> R + Send + 'static) -> R {
        if self.is_current_thread() {
            return f();
        }

        let (done_tx, done_rx) = channel::bounded(1);
        let posted = self.post(move || {
            let result = f();
            let _ = done_tx.send(result);
        });
        if !posted {
            panic!("post_and_wait called after render thread shutdown");
        }

        done_rx
            .recv()
            .expect("render thread dropped the task before running it")
    }

    /// Signals the worker to stop after draining everything already queued.
    pub fn request_shutdown(&self) {
        *self.queue.shutdown.lock().expect("lock poisoned") = true;
        self.queue.not_empty.notify_all();
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.request_shutdown();
        if let Some(handle) = self.handle.lock().expect("lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(queue: &Queue) {
    loop {
        let task = {
            let mut tasks = queue.tasks.lock().expect("lock poisoned");
            loop {
                if let Some(task) = tasks.pop_front() {
                    break Some(task);
                }
                if *queue.shutdown.lock().expect("lock poisoned") {
                    break None;
                }
                tasks = queue.not_empty.wait(tasks).expect("lock poisoned");
            }
        };

        match task {
            Some(task) => task(),
            None => return,
        }
    }
}

#[cfg(target_os = "linux")]
fn elevate_thread_priority() {
    // Best effort: raise the render thread to the max normal (non-realtime) niceness available
    // to this process. Failure here must never be fatal.
    unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::pid_t;
        let _ = libc::setpriority(libc::PRIO_PROCESS, tid as libc::id_t, -20);
    }
}

#[cfg(not(target_os = "linux"))]
fn elevate_thread_priority() {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn tasks_run_in_enqueue_order() {
        let rt = RenderThread::spawn("test-render-thread");
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..8 {
            let order = order.clone();
            rt.post(move || order.lock().unwrap().push(i));
        }
        let seen = rt.post_and_wait(move || order.lock().unwrap().clone());
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn post_and_wait_from_render_thread_runs_inline() {
        let rt = RenderThread::spawn("test-render-thread-reentrant");
        let ran = Arc::new(AtomicU32::new(0));
        let ran2 = ran.clone();
        let rt2 = rt.clone();
        rt.post_and_wait(move || {
            // Calling post_and_wait from the render thread itself must not deadlock.
            rt2.post_and_wait(move || {
                ran2.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_after_shutdown_is_rejected() {
        let rt = RenderThread::spawn("test-render-thread-shutdown");
        rt.request_shutdown();
        // give the worker a chance to observe shutdown and exit
        rt.handle.lock().unwrap().take().map(|h| h.join());
        assert!(!rt.post(|| {}));
    }
}
