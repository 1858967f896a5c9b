//! The worker-pool primitive: one long-lived OS thread with a one-slot
//! mailbox.
//!
//! [`ProcessingThread`] accepts at most one pending task at a time.
//! [`ProcessingThread::schedule_work`] blocks the caller with a deadline
//! while the thread is busy and hands the task back on timeout; this is
//! the mechanism the dispatcher turns into backpressure: a rejected handoff
//! becomes an `Overtriggered` frame instead of unbounded buffering.
//!
//! Scheduling-class and CPU-affinity changes are recorded as a pending
//! request and applied by the run loop itself the next time it is about to
//! wait for work; a running task is never preempted.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A unit of work: run the active graph on one frame.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Callback invoked on the worker thread itself immediately after a task
/// finishes, before the thread goes idle. Must not block significantly.
pub type WorkDoneCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Requested scheduling class for a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingClass {
    /// SCHED_OTHER with the given nice value.
    Nice(i32),
    /// SCHED_BATCH with the given nice value.
    Batch(i32),
    /// SCHED_FIFO with the given realtime priority.
    RealTime(i32),
}

/// Pending reconfiguration, consumed at the worker's next idle point.
#[derive(Debug, Clone, Copy, Default)]
struct SchedulerRequest {
    class: Option<SchedulingClass>,
    cpu: Option<usize>,
}

struct State {
    pending: Option<Work>,
    executing: bool,
    finishing: bool,
    sched_request: SchedulerRequest,
    work_done: Option<Arc<WorkDoneCallback>>,
}

struct Shared {
    state: Mutex<State>,
    /// Signaled towards the worker: new task, shutdown or reconfiguration.
    work_available: Condvar,
    /// Signaled towards schedulers/joiners: task finished, thread idle.
    idle: Condvar,
}

/// A single dedicated worker thread executing one task at a time.
pub struct ProcessingThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessingThread {
    /// Spawns the worker thread. `index` only names the thread for logs.
    pub fn spawn(index: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: None,
                executing: false,
                finishing: false,
                sched_request: SchedulerRequest::default(),
                work_done: None,
            }),
            work_available: Condvar::new(),
            idle: Condvar::new(),
        });

        let run_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(format!("inspect-worker-{index}"))
            .spawn(move || run_loop(&run_shared))?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Installs the completion callback. Intended to be set once, before
    /// the first task is scheduled.
    pub fn set_work_done_callback(&self, callback: WorkDoneCallback) {
        let mut state = self.lock_state();
        state.work_done = Some(Arc::new(callback));
    }

    /// Attempts to install `work` as the thread's next task.
    ///
    /// Returns `Ok(())` once the handoff succeeded. If the thread is still
    /// busy when `wait_for` elapses, returns `Err(work)` and the caller keeps
    /// ownership and decides what rejection means.
    pub fn schedule_work(&self, work: Work, wait_for: Duration) -> Result<(), Work> {
        let deadline = Instant::now() + wait_for;
        let mut state = self.lock_state();

        while state.pending.is_some() || state.executing {
            let now = Instant::now();
            if now >= deadline {
                return Err(work);
            }
            let (guard, timeout) = self
                .shared
                .idle
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
            if timeout.timed_out() && (state.pending.is_some() || state.executing) {
                return Err(work);
            }
        }

        if state.finishing {
            return Err(work);
        }

        state.pending = Some(work);
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Blocks until the thread has no pending and no executing task. Safe
    /// to call on an idle thread.
    pub fn join(&self) {
        let mut state = self.lock_state();
        while state.pending.is_some() || state.executing {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// True if a task is pending or executing right now.
    pub fn is_busy(&self) -> bool {
        let state = self.lock_state();
        state.pending.is_some() || state.executing
    }

    /// Requests SCHED_OTHER with the given nice value at the next idle
    /// point.
    pub fn set_nice(&self, nice: i32) {
        self.request_class(SchedulingClass::Nice(nice));
    }

    /// Requests SCHED_BATCH with the given nice value at the next idle
    /// point.
    pub fn set_batch(&self, nice: i32) {
        self.request_class(SchedulingClass::Batch(nice));
    }

    /// Enables or disables realtime (SCHED_FIFO) scheduling at the next
    /// idle point. Disabling falls back to SCHED_OTHER at nice 0.
    pub fn set_rt_priority(&self, enabled: bool, priority: i32) {
        if enabled {
            self.request_class(SchedulingClass::RealTime(priority));
        } else {
            self.request_class(SchedulingClass::Nice(0));
        }
    }

    /// Requests pinning the worker to `cpu` at the next idle point.
    pub fn pin_to_cpu(&self, cpu: usize) {
        let mut state = self.lock_state();
        state.sched_request.cpu = Some(cpu);
        self.shared.work_available.notify_one();
    }

    fn request_class(&self, class: SchedulingClass) {
        let mut state = self.lock_state();
        state.sched_request.class = Some(class);
        self.shared.work_available.notify_one();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ProcessingThread {
    fn drop(&mut self) {
        {
            let mut state = self.lock_state();
            state.finishing = true;
            self.shared.work_available.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
    }
}

fn run_loop(shared: &Shared) {
    loop {
        let (work, work_done) = {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                let request = std::mem::take(&mut state.sched_request);
                apply_scheduler_request(request);

                if let Some(work) = state.pending.take() {
                    state.executing = true;
                    break (work, state.work_done.clone());
                }
                if state.finishing {
                    return;
                }
                state = shared
                    .work_available
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };

        work();
        // completion callback runs inline, before the thread accepts the
        // next task
        if let Some(callback) = work_done {
            callback();
        }

        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.executing = false;
        drop(state);
        shared.idle.notify_all();
    }
}

fn apply_scheduler_request(request: SchedulerRequest) {
    if let Some(class) = request.class {
        if let Err(err) = apply_scheduling_class(class) {
            warn!(?class, %err, "failed to change worker scheduling class");
        } else {
            debug!(?class, "worker scheduling class changed");
        }
    }
    if let Some(cpu) = request.cpu {
        if let Err(err) = pin_current_thread(cpu) {
            warn!(cpu, %err, "failed to pin worker thread");
        } else {
            debug!(cpu, "worker thread pinned");
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn apply_scheduling_class(class: SchedulingClass) -> std::io::Result<()> {
    let (policy, priority, nice) = match class {
        SchedulingClass::Nice(nice) => (libc::SCHED_OTHER, 0, Some(nice)),
        SchedulingClass::Batch(nice) => (libc::SCHED_BATCH, 0, Some(nice)),
        SchedulingClass::RealTime(priority) => (libc::SCHED_FIFO, priority, None),
    };

    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: plain syscalls on the calling thread with a valid sched_param
    let rc = unsafe { libc::sched_setscheduler(0, policy, &param) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    if let Some(nice) = nice {
        // SAFETY: PRIO_PROCESS with pid 0 targets the calling thread group
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_scheduling_class(_class: SchedulingClass) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "scheduling classes are unsupported on this platform",
    ))
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn pin_current_thread(cpu: usize) -> std::io::Result<()> {
    // SAFETY: cpu_set_t is POD; CPU_ZERO/CPU_SET only write into it
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        if cpu >= libc::CPU_SETSIZE as usize {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cpu index {cpu} out of range"),
            ));
        }
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        let rc = libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        );
        if rc != 0 {
            return Err(std::io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn pin_current_thread(_cpu: usize) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "per-thread CPU affinity is unsupported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_work(counter: &Arc<AtomicUsize>, pause: Duration) -> Work {
        let counter = Arc::clone(counter);
        Box::new(move || {
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn executes_submitted_work() {
        let worker = ProcessingThread::spawn(0).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        worker
            .schedule_work(counted_work(&counter, Duration::ZERO), Duration::from_secs(1))
            .ok()
            .unwrap();
        worker.join();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fast_tasks_run_in_submission_order() {
        let worker = ProcessingThread::spawn(0).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..20 {
            let order = Arc::clone(&order);
            let work: Work = Box::new(move || {
                order.lock().unwrap_or_else(|e| e.into_inner()).push(n);
            });
            assert!(worker.schedule_work(work, Duration::from_secs(1)).is_ok());
        }
        worker.join();
        let order = order.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(*order, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn busy_worker_rejects_after_timeout() {
        let worker = ProcessingThread::spawn(0).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        worker
            .schedule_work(
                counted_work(&counter, Duration::from_millis(300)),
                Duration::from_secs(1),
            )
            .ok()
            .unwrap();
        // give the worker time to pick up the first task, then occupy the
        // one-slot mailbox with a second one
        std::thread::sleep(Duration::from_millis(30));
        worker
            .schedule_work(
                counted_work(&counter, Duration::from_millis(300)),
                Duration::from_secs(1),
            )
            .ok()
            .unwrap();

        let rejected = worker.schedule_work(
            counted_work(&counter, Duration::ZERO),
            Duration::from_millis(20),
        );
        assert!(rejected.is_err());

        worker.join();
        // exactly the two accepted tasks ran, nothing lost, nothing twice
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn join_on_idle_thread_returns_immediately() {
        let worker = ProcessingThread::spawn(0).unwrap();
        worker.join();
        assert!(!worker.is_busy());
    }

    #[test]
    fn callback_runs_after_each_task() {
        let worker = ProcessingThread::spawn(0).unwrap();
        let completions = Arc::new(AtomicUsize::new(0));
        let cb_count = Arc::clone(&completions);
        worker.set_work_done_callback(Box::new(move || {
            cb_count.fetch_add(1, Ordering::SeqCst);
        }));

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            worker
                .schedule_work(counted_work(&counter, Duration::ZERO), Duration::from_secs(1))
                .ok()
                .unwrap();
            worker.join();
        }
        assert_eq!(completions.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn drop_completes_pending_work() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let worker = ProcessingThread::spawn(0).unwrap();
            worker
                .schedule_work(
                    counted_work(&counter, Duration::from_millis(50)),
                    Duration::from_secs(1),
                )
                .ok()
                .unwrap();
        }
        // drop joined the thread; the accepted task must have completed
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejected_work_is_returned_to_caller() {
        let worker = ProcessingThread::spawn(0).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        worker
            .schedule_work(
                counted_work(&counter, Duration::from_millis(200)),
                Duration::from_secs(1),
            )
            .ok()
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let work = counted_work(&counter, Duration::ZERO);
        match worker.schedule_work(work, Duration::from_millis(10)) {
            Err(returned) => {
                // the caller still owns the task and may run it elsewhere
                returned();
            }
            Ok(()) => panic!("expected rejection"),
        }
        worker.join();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
