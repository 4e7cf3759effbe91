//! Supervised threads.
//!
//! A [`RunnerThreadGroup`] owns every thread the runner starts for a suite,
//! and every thread those threads start through [`spawn`]. The group can
//! enumerate live members, interrupt or stop them, and collects panics that
//! escape them.
//!
//! Rust threads cannot be killed from the outside. Interruption and stopping
//! are cooperative: [`interrupt`](SupervisedThread::interrupt) sets a flag
//! and unparks the thread, [`stop`](SupervisedThread::stop) additionally
//! makes the next [`checkpoint`] unwind with a [`ThreadDeath`] payload.
//! Threads that never reach a checkpoint are detected and disowned.
//!
//! Each thread carries a breadcrumb stack ([`trace_scope`]) that stands in
//! for a stack snapshot when a timeout or leak is reported.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::Thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::context;
use crate::result::{RunnerError, RunnerResult};
use crate::throwable::{StackFrame, TestResult, ThreadDeath, Throwable};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Root breadcrumb of every supervised thread.
pub const THREAD_ROOT_CLASS: &str = "std::thread";

/// Stable identity of a supervised thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadKey(u64);

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable state of a supervised thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    /// Spawned, body not entered yet
    New,
    /// Running user code
    Runnable,
    /// Inside a supervised sleep
    TimedWaiting,
    /// Body returned or unwound
    Terminated,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "NEW",
            Self::Runnable => "RUNNABLE",
            Self::TimedWaiting => "TIMED_WAITING",
            Self::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

struct ThreadRecord {
    key: ThreadKey,
    name: String,
    state: Mutex<ThreadState>,
    terminated: Condvar,
    interrupt: AtomicBool,
    stop: AtomicBool,
    frames: Mutex<Vec<StackFrame>>,
    seed_chain: Mutex<Vec<u64>>,
    handle: OnceLock<Thread>,
}

impl ThreadRecord {
    fn new(name: String) -> Self {
        Self {
            key: ThreadKey(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            state: Mutex::new(ThreadState::New),
            terminated: Condvar::new(),
            interrupt: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            frames: Mutex::new(vec![StackFrame::new(THREAD_ROOT_CLASS, "spawn")]),
            seed_chain: Mutex::new(Vec::new()),
            handle: OnceLock::new(),
        }
    }

    fn set_state(&self, state: ThreadState) {
        let mut current = self.state.lock();
        if *current != ThreadState::Terminated {
            *current = state;
        }
    }

    fn finish(&self) {
        *self.state.lock() = ThreadState::Terminated;
        self.terminated.notify_all();
    }

    fn unpark(&self) {
        if let Some(handle) = self.handle.get() {
            handle.unpark();
        }
    }
}

/// Handle to a supervised thread
#[derive(Clone)]
pub struct SupervisedThread {
    record: Arc<ThreadRecord>,
}

impl SupervisedThread {
    /// Thread identity
    #[must_use]
    pub fn key(&self) -> ThreadKey {
        self.record.key
    }

    /// Thread name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ThreadState {
        *self.record.state.lock()
    }

    /// Whether the body has not finished yet
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state() != ThreadState::Terminated
    }

    /// Wait for the thread to finish; `None` waits forever.
    ///
    /// Returns `true` if the thread has terminated.
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.record.state.lock();
        match timeout {
            None => {
                while *state != ThreadState::Terminated {
                    self.record.terminated.wait(&mut state);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while *state != ThreadState::Terminated {
                    if self.record.terminated.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        *state == ThreadState::Terminated
    }

    /// Request interruption; observed by [`sleep`] and [`interrupted`].
    pub fn interrupt(&self) {
        self.record.interrupt.store(true, Ordering::SeqCst);
        self.record.unpark();
    }

    /// Request a stop; the next [`checkpoint`] unwinds the thread.
    pub fn stop(&self) {
        self.record.stop.store(true, Ordering::SeqCst);
        self.record.unpark();
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.record.stop.load(Ordering::SeqCst)
    }

    /// Breadcrumb frames, root first
    #[must_use]
    pub fn frames(&self) -> Vec<StackFrame> {
        self.record.frames.lock().clone()
    }

    /// Seed chain of the thread's randomized context (empty outside one)
    #[must_use]
    pub fn seed_chain(&self) -> Vec<u64> {
        self.record.seed_chain.lock().clone()
    }
}

impl fmt::Debug for SupervisedThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedThread")
            .field("key", &self.record.key)
            .field("name", &self.record.name)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for SupervisedThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread[id={}, name={}, state={}]", self.record.key.0, self.record.name, self.state())
    }
}

/// A panic that escaped a supervised thread
#[derive(Debug, Clone)]
pub struct UncaughtException {
    /// Thread that panicked
    pub thread_key: ThreadKey,
    /// Name of that thread
    pub thread_name: String,
    /// Converted panic payload
    pub throwable: Throwable,
    /// Recorded after the supervisor tried to terminate the thread
    pub after_termination: bool,
}

struct GroupInner {
    name: String,
    threads: Mutex<Vec<Arc<ThreadRecord>>>,
    uncaught: Mutex<Vec<UncaughtException>>,
    being_terminated: Mutex<HashSet<ThreadKey>>,
}

/// Registry of the threads belonging to one suite run
#[derive(Clone)]
pub struct RunnerThreadGroup {
    inner: Arc<GroupInner>,
}

impl fmt::Debug for RunnerThreadGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerThreadGroup")
            .field("name", &self.inner.name)
            .field("threads", &self.inner.threads.lock().len())
            .finish()
    }
}

struct Current {
    group: RunnerThreadGroup,
    record: Arc<ThreadRecord>,
}

thread_local! {
    static CURRENT: RefCell<Option<Current>> = const { RefCell::new(None) };
}

impl RunnerThreadGroup {
    /// Create an empty group
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                threads: Mutex::new(Vec::new()),
                uncaught: Mutex::new(Vec::new()),
                being_terminated: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Group name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Group of the calling thread, if it is supervised
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT.with(|c| c.borrow().as_ref().map(|c| c.group.clone()))
    }

    /// Start a thread in this group.
    ///
    /// The child inherits a fresh copy of the caller's randomized context.
    pub fn spawn<F>(&self, name: impl Into<String>, body: F) -> RunnerResult<SupervisedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let record = Arc::new(ThreadRecord::new(name.into()));
        let inherited = context::inherit();
        let group = self.clone();
        let child = Arc::clone(&record);

        self.inner.threads.lock().push(Arc::clone(&record));
        let spawned = std::thread::Builder::new()
            .name(record.name.clone())
            .spawn(move || {
                let _ = child.handle.set(std::thread::current());
                child.set_state(ThreadState::Runnable);
                CURRENT.with(|c| {
                    *c.borrow_mut() = Some(Current {
                        group: group.clone(),
                        record: Arc::clone(&child),
                    });
                });
                let guard = inherited.map(context::InheritedContext::enter);
                let outcome = catch_unwind(AssertUnwindSafe(body));
                drop(guard);
                if let Err(payload) = outcome {
                    let throwable = Throwable::from_panic(payload);
                    group.record_uncaught(&child, throwable);
                }
                CURRENT.with(|c| *c.borrow_mut() = None);
                child.finish();
            });

        match spawned {
            Ok(_detached) => Ok(SupervisedThread { record }),
            Err(e) => {
                record.finish();
                Err(RunnerError::Io(e))
            }
        }
    }

    /// Live members of the group, including the calling thread
    #[must_use]
    pub fn active_threads(&self) -> Vec<SupervisedThread> {
        let mut threads = self.inner.threads.lock();
        threads.retain(|r| *r.state.lock() != ThreadState::Terminated);
        threads
            .iter()
            .map(|r| SupervisedThread { record: Arc::clone(r) })
            .collect()
    }

    /// Live members of the group, excluding the calling thread
    #[must_use]
    pub fn snapshot(&self) -> ThreadSnapshot {
        let me = current_key();
        ThreadSnapshot {
            threads: self
                .active_threads()
                .into_iter()
                .filter(|t| Some(t.key()) != me)
                .collect(),
        }
    }

    /// Mark a thread as being terminated by the supervisor.
    ///
    /// Panics it reports from now on are attributed to the termination.
    pub fn mark_as_being_terminated(&self, thread: &SupervisedThread) {
        self.inner.being_terminated.lock().insert(thread.key());
    }

    /// Whether the supervisor tried to terminate this thread
    #[must_use]
    pub fn is_being_terminated(&self, key: ThreadKey) -> bool {
        self.inner.being_terminated.lock().contains(&key)
    }

    fn record_uncaught(&self, record: &ThreadRecord, throwable: Throwable) {
        let after_termination = self.is_being_terminated(record.key);
        tracing::debug!(
            thread = %record.name,
            after_termination,
            "uncaught exception in supervised thread: {throwable}"
        );
        self.inner.uncaught.lock().push(UncaughtException {
            thread_key: record.key,
            thread_name: record.name.clone(),
            throwable,
            after_termination,
        });
    }

    /// Take every uncaught exception recorded so far
    pub fn drain_uncaught(&self) -> Vec<UncaughtException> {
        std::mem::take(&mut *self.inner.uncaught.lock())
    }
}

/// Live threads of a group at one instant
#[derive(Debug, Clone, Default)]
pub struct ThreadSnapshot {
    threads: Vec<SupervisedThread>,
}

impl ThreadSnapshot {
    /// Keys of the captured threads
    #[must_use]
    pub fn keys(&self) -> HashSet<ThreadKey> {
        self.threads.iter().map(SupervisedThread::key).collect()
    }

    /// Captured threads
    #[must_use]
    pub fn threads(&self) -> &[SupervisedThread] {
        &self.threads
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Captured threads not contained in `expected`
    #[must_use]
    pub fn without(&self, expected: &HashSet<ThreadKey>) -> Vec<SupervisedThread> {
        self.threads
            .iter()
            .filter(|t| !expected.contains(&t.key()))
            .cloned()
            .collect()
    }
}

fn with_current<R>(f: impl FnOnce(&Current) -> R) -> Option<R> {
    CURRENT.with(|c| c.borrow().as_ref().map(f))
}

fn current_key() -> Option<ThreadKey> {
    with_current(|c| c.record.key)
}

/// Handle of the calling thread, if supervised
#[must_use]
pub fn current() -> Option<SupervisedThread> {
    with_current(|c| SupervisedThread {
        record: Arc::clone(&c.record),
    })
}

/// Spawn into the calling thread's group.
///
/// Fails outside a supervised thread.
pub fn spawn<F>(name: impl Into<String>, body: F) -> RunnerResult<SupervisedThread>
where
    F: FnOnce() + Send + 'static,
{
    let group = RunnerThreadGroup::current()
        .ok_or_else(|| RunnerError::invalid_state("supervised::spawn called outside a runner thread group"))?;
    group.spawn(name, body)
}

/// Unwind with [`ThreadDeath`] if a stop was requested.
pub fn checkpoint() {
    let stop = with_current(|c| c.record.stop.load(Ordering::SeqCst)).unwrap_or(false);
    if stop {
        std::panic::resume_unwind(Box::new(ThreadDeath));
    }
}

/// Test and clear the calling thread's interrupt flag.
pub fn interrupted() -> bool {
    checkpoint();
    with_current(|c| c.record.interrupt.swap(false, Ordering::SeqCst)).unwrap_or(false)
}

/// Read the interrupt flag without clearing it.
#[must_use]
pub fn is_interrupted() -> bool {
    with_current(|c| c.record.interrupt.load(Ordering::SeqCst)).unwrap_or(false)
}

/// Sleep, waking early on interrupt (returns `Err`) or stop (unwinds).
pub fn sleep(duration: Duration) -> TestResult {
    let Some(record) = with_current(|c| Arc::clone(&c.record)) else {
        std::thread::sleep(duration);
        return Ok(());
    };
    let deadline = Instant::now() + duration;
    record.set_state(ThreadState::TimedWaiting);
    let outcome = loop {
        checkpoint();
        if record.interrupt.swap(false, Ordering::SeqCst) {
            break Err(Throwable::interrupted().capture_stack());
        }
        let now = Instant::now();
        if now >= deadline {
            break Ok(());
        }
        std::thread::park_timeout(deadline - now);
    };
    record.set_state(ThreadState::Runnable);
    outcome
}

/// Breadcrumb pushed by [`trace_scope`]; popped on drop.
#[derive(Debug)]
#[must_use = "the breadcrumb is popped when the guard drops"]
pub struct FrameGuard {
    pushed: bool,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.pushed {
            with_current(|c| c.record.frames.lock().pop());
        }
    }
}

/// Push a breadcrumb frame on the calling thread's supervised stack.
pub fn trace_scope(class_name: impl Into<String>, method_name: impl Into<String>) -> FrameGuard {
    let frame = StackFrame::new(class_name, method_name);
    let pushed = with_current(|c| c.record.frames.lock().push(frame)).is_some();
    FrameGuard { pushed }
}

/// Breadcrumbs of the calling thread, root first.
pub(crate) fn current_frames() -> Vec<StackFrame> {
    with_current(|c| c.record.frames.lock().clone()).unwrap_or_default()
}

/// Publish the calling thread's seed chain for supervisor reports.
pub(crate) fn publish_seed_chain(seeds: Vec<u64>) {
    with_current(|c| *c.record.seed_chain.lock() = seeds);
}
