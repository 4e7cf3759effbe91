//! Thread leak detection and termination.
//!
//! After every test and after the suite, the live members of the runner's
//! thread group are compared with a snapshot taken before. Threads that
//! appeared in between are leaks unless a [`ThreadLeakFilter`] accepts
//! them. Leaked and timed-out threads go through the same escalation:
//! interrupt, then stop, each retried with a wait in between. Threads that
//! survive both are zombies; they are reported once and excluded from later
//! comparisons.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use crate::annotations::ThreadLeaks;
use crate::description::Description;
use crate::randomness::{format_seed_chain, Randomness};
use crate::resources::LifecycleScope;
use crate::supervised::{RunnerThreadGroup, SupervisedThread, ThreadKey, ThreadSnapshot};
use crate::throwable::{StackFrame, Throwable};

/// Breadcrumb class marking a thread as a known daemon.
pub const DAEMON_ROOT_CLASS: &str = "__randomizedtesting.Daemon";

const LINGER_POLL: Duration = Duration::from_millis(100);

/// Decides whether a live thread should be ignored by leak checks.
pub trait ThreadLeakFilter: Send + Sync {
    /// `true` if `thread` is not a leak
    fn reject(&self, thread: &SupervisedThread) -> bool;
}

/// Accepts threads whose first breadcrumb under the thread root starts
/// with one of the configured class prefixes.
///
/// Thread names are not stable, so matching is done on the shape of the
/// breadcrumb stack.
#[derive(Debug, Clone)]
pub struct KnownDaemonFilter {
    roots: Vec<String>,
}

impl Default for KnownDaemonFilter {
    fn default() -> Self {
        Self {
            roots: vec![DAEMON_ROOT_CLASS.to_string()],
        }
    }
}

impl KnownDaemonFilter {
    /// Filter with additional root prefixes
    #[must_use]
    pub fn with_roots<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::default();
        filter.roots.extend(roots.into_iter().map(Into::into));
        filter
    }
}

impl ThreadLeakFilter for KnownDaemonFilter {
    fn reject(&self, thread: &SupervisedThread) -> bool {
        thread
            .frames()
            .get(1)
            .is_some_and(|frame| self.roots.iter().any(|r| frame.class_name.starts_with(r.as_str())))
    }
}

/// Outcome of terminating one thread
#[derive(Debug, Clone)]
pub struct Termination {
    /// The thread
    pub thread: SupervisedThread,
    /// Whether it ended
    pub terminated: bool,
}

impl Termination {
    /// Suffix appended to failure messages
    #[must_use]
    pub fn suffix(&self) -> String {
        if self.terminated {
            " (and terminated)".to_string()
        } else {
            format!(" (and NOT TERMINATED, left in state {})", self.thread.state())
        }
    }
}

/// Escalates interrupt and stop requests against stray threads and keeps
/// the zombie set of one run.
pub struct ThreadTerminator {
    group: RunnerThreadGroup,
    kill_attempts: u32,
    kill_wait: Duration,
    zombies: Mutex<HashSet<ThreadKey>>,
    filter: Arc<dyn ThreadLeakFilter>,
}

impl fmt::Debug for ThreadTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadTerminator")
            .field("group", &self.group.name())
            .field("kill_attempts", &self.kill_attempts)
            .field("kill_wait", &self.kill_wait)
            .field("zombies", &self.zombies.lock().len())
            .finish()
    }
}

impl ThreadTerminator {
    /// Terminator over `group`
    pub fn new(
        group: RunnerThreadGroup,
        kill_attempts: u32,
        kill_wait: Duration,
        filter: Arc<dyn ThreadLeakFilter>,
    ) -> Self {
        Self {
            group,
            kill_attempts,
            kill_wait,
            zombies: Mutex::new(HashSet::new()),
            filter,
        }
    }

    /// The supervised group
    #[must_use]
    pub fn group(&self) -> &RunnerThreadGroup {
        &self.group
    }

    /// Keys of threads that could not be terminated
    #[must_use]
    pub fn zombies(&self) -> HashSet<ThreadKey> {
        self.zombies.lock().clone()
    }

    /// Interrupt, then stop, `thread` until it ends or attempts run out.
    pub fn terminate(&self, thread: &SupervisedThread) -> Termination {
        self.group.mark_as_being_terminated(thread);

        for attempt in 1..=self.kill_attempts {
            if !thread.is_alive() {
                break;
            }
            tracing::debug!(thread = %thread, attempt, "interrupting");
            thread.interrupt();
            thread.join(Some(self.kill_wait));
        }

        for attempt in 1..=self.kill_attempts {
            if !thread.is_alive() {
                break;
            }
            tracing::warn!(thread = %thread, attempt, "stopping");
            thread.stop();
            thread.join(Some(self.kill_wait));
        }

        let terminated = !thread.is_alive();
        if terminated {
            tracing::info!(thread = %thread, "thread terminated");
        } else {
            tracing::error!(thread = %thread, "could not terminate thread; marking as zombie");
            self.zombies.lock().insert(thread.key());
        }
        Termination {
            thread: thread.clone(),
            terminated,
        }
    }

    /// Threads alive now that were not in `before`, excluding zombies and
    /// filtered daemons.
    #[must_use]
    pub fn leaked_since(&self, before: &ThreadSnapshot) -> Vec<SupervisedThread> {
        let mut expected = before.keys();
        expected.extend(self.zombies());
        self.group
            .snapshot()
            .without(&expected)
            .into_iter()
            .filter(|t| !self.filter.reject(t))
            .collect()
    }

    /// Compare live threads with `before` and handle leaks according to
    /// `policy`. Returns at most one failure describing every leaked
    /// thread and its termination outcome.
    pub fn check_leftover(
        &self,
        scope: LifecycleScope,
        policy: ThreadLeaks,
        before: &ThreadSnapshot,
        description: &Description,
    ) -> Option<Throwable> {
        if scope == LifecycleScope::Test && policy.leaked_threads_belong_to_suite {
            return None;
        }

        let mut leaked = self.leaked_since(before);
        if !leaked.is_empty() && policy.linger_ms > 0 {
            let deadline = Instant::now() + Duration::from_millis(policy.linger_ms);
            tracing::debug!(count = leaked.len(), linger_ms = policy.linger_ms, "lingering for leaked threads");
            while !leaked.is_empty() && Instant::now() < deadline {
                thread::sleep(LINGER_POLL.min(deadline.saturating_duration_since(Instant::now())));
                leaked = self.leaked_since(before);
            }
        }
        if leaked.is_empty() {
            return None;
        }

        // Describe threads before terminating them, the state changes after.
        let described: Vec<(String, String)> = leaked
            .iter()
            .map(|t| {
                let frames: String = t.frames().iter().rev().map(|frame| format!("\n        at {frame}")).collect();
                (t.to_string(), frames)
            })
            .collect();
        let outcomes: Vec<Option<Termination>> = leaked
            .iter()
            .map(|t| policy.fail.then(|| self.terminate(t)))
            .collect();

        let mut message = format!(
            "{} thread{} leaked from {} scope at {}:",
            leaked.len(),
            if leaked.len() == 1 { "" } else { "s" },
            scope,
            description
        );
        for (i, ((head, frames), outcome)) in described.iter().zip(&outcomes).enumerate() {
            let suffix = outcome.as_ref().map(Termination::suffix).unwrap_or_default();
            message.push_str(&format!("\n  {}) {head}{suffix}{frames}", i + 1));
        }

        if !policy.fail {
            tracing::warn!("{message}");
            return None;
        }
        Some(Throwable::threading(message))
    }
}

/// Breadcrumb samples of a thread, taken before it is terminated
#[derive(Debug, Clone, Default)]
pub struct StackSamples {
    samples: Vec<Vec<StackFrame>>,
}

impl StackSamples {
    /// Take up to `count` samples at random 10-100 ms intervals.
    ///
    /// Sampling stops early when the thread ends.
    pub fn collect(thread: &SupervisedThread, count: u32, randomness: &mut Randomness) -> Self {
        let mut samples = Vec::new();
        for _ in 0..count {
            if !thread.is_alive() {
                break;
            }
            samples.push(thread.frames());
            let pause = randomness.gen_range(10..=100);
            thread::sleep(Duration::from_millis(pause));
        }
        Self { samples }
    }

    /// Collected samples, oldest first
    #[must_use]
    pub fn samples(&self) -> &[Vec<StackFrame>] {
        &self.samples
    }

    /// Frames shared by every sample, root first
    #[must_use]
    pub fn common_root(&self) -> Vec<StackFrame> {
        let Some(first) = self.samples.first() else {
            return Vec::new();
        };
        let len = self
            .samples
            .iter()
            .map(|s| s.iter().zip(first).take_while(|(a, b)| a == b).count())
            .min()
            .unwrap_or(0);
        first[..len].to_vec()
    }

    /// Log the common root and the distinct tails
    pub fn log(&self, thread: &SupervisedThread, seeds: &[u64]) {
        if self.samples.is_empty() {
            return;
        }
        let root = self.common_root();
        let mut tails: Vec<Vec<StackFrame>> = Vec::new();
        for sample in &self.samples {
            let tail = sample[root.len().min(sample.len())..].to_vec();
            if !tails.contains(&tail) {
                tails.push(tail);
            }
        }
        let render = |frames: &[StackFrame]| {
            frames
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" > ")
        };
        tracing::warn!(
            thread = %thread,
            seed = %format_seed_chain(seeds),
            samples = self.samples.len(),
            "stack samples: common root [{}], {} distinct tail(s): {}",
            render(&root),
            tails.len(),
            tails.iter().map(|t| format!("[{}]", render(t))).collect::<Vec<_>>().join(", ")
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::supervised::{self, trace_scope};
    use std::sync::mpsc;

    fn terminator(group: &RunnerThreadGroup) -> ThreadTerminator {
        ThreadTerminator::new(
            group.clone(),
            2,
            Duration::from_millis(200),
            Arc::new(KnownDaemonFilter::default()),
        )
    }

    mod terminate_tests {
        use super::*;

        #[test]
        fn test_interrupt_ends_sleeping_thread() {
            let group = RunnerThreadGroup::new("t");
            let t = group
                .spawn("sleeper", || {
                    let _ = supervised::sleep(Duration::from_secs(30));
                })
                .unwrap();
            let outcome = terminator(&group).terminate(&t);
            assert!(outcome.terminated);
            assert_eq!(outcome.suffix(), " (and terminated)");
            assert!(group.is_being_terminated(t.key()));
        }

        #[test]
        fn test_stop_ends_thread_ignoring_interrupts() {
            let group = RunnerThreadGroup::new("t");
            let t = group
                .spawn("stubborn", || loop {
                    let _ = supervised::interrupted();
                    std::thread::sleep(Duration::from_millis(5));
                })
                .unwrap();
            let outcome = terminator(&group).terminate(&t);
            assert!(outcome.terminated);
            let uncaught = group.drain_uncaught();
            assert!(uncaught.iter().all(|u| u.after_termination && u.throwable.is_thread_death()));
        }

        #[test]
        fn test_unkillable_becomes_zombie() {
            let group = RunnerThreadGroup::new("t");
            let (tx, rx) = mpsc::channel::<()>();
            let t = group
                .spawn("zombie", move || {
                    let _ = rx.recv_timeout(Duration::from_secs(5));
                })
                .unwrap();
            let term = ThreadTerminator::new(group.clone(), 1, Duration::from_millis(20), Arc::new(KnownDaemonFilter::default()));
            let outcome = term.terminate(&t);
            assert!(!outcome.terminated);
            assert!(outcome.suffix().contains("NOT TERMINATED"));
            assert!(term.zombies().contains(&t.key()));
            drop(tx);
            t.join(None);
        }
    }

    mod leak_tests {
        use super::*;

        #[test]
        fn test_leak_reported_and_terminated() {
            let group = RunnerThreadGroup::new("t");
            let term = terminator(&group);
            let before = group.snapshot();
            let _t = group
                .spawn("leaker", || {
                    let _ = supervised::sleep(Duration::from_secs(30));
                })
                .unwrap();
            let failure = term
                .check_leftover(LifecycleScope::Test, ThreadLeaks::default(), &before, &Description::test("S", "t"))
                .unwrap();
            assert!(failure.message().starts_with("1 thread leaked from TEST scope at t(S):"));
            assert!(failure.message().contains("(and terminated)"));
        }

        #[test]
        fn test_leak_message_lists_each_thread_once() {
            let group = RunnerThreadGroup::new("t");
            let term = terminator(&group);
            let before = group.snapshot();
            for name in ["leaker-a", "leaker-b"] {
                group
                    .spawn(name, || {
                        let _ = supervised::sleep(Duration::from_secs(30));
                    })
                    .unwrap();
            }
            let failure = term
                .check_leftover(LifecycleScope::Test, ThreadLeaks::default(), &before, &Description::test("S", "t"))
                .unwrap();
            let message = failure.message();
            assert!(message.starts_with("2 threads leaked from TEST scope"));
            assert_eq!(message.matches("leaker-a").count(), 1);
            assert_eq!(message.matches("leaker-b").count(), 1);
            for line in message.lines().filter(|l| l.contains("leaker-")) {
                assert!(line.ends_with(" (and terminated)"), "{line}");
                assert!(!line.contains("state=TERMINATED"), "{line}");
            }
        }

        #[test]
        fn test_linger_lets_thread_finish() {
            let group = RunnerThreadGroup::new("t");
            let term = terminator(&group);
            let before = group.snapshot();
            group
                .spawn("short", || std::thread::sleep(Duration::from_millis(50)))
                .unwrap();
            let policy = ThreadLeaks::default().linger_ms(2000);
            assert!(term
                .check_leftover(LifecycleScope::Suite, policy, &before, &Description::suite("S"))
                .is_none());
        }

        #[test]
        fn test_belongs_to_suite_skips_test_scope() {
            let group = RunnerThreadGroup::new("t");
            let term = terminator(&group);
            let before = group.snapshot();
            let t = group
                .spawn("leaker", || {
                    let _ = supervised::sleep(Duration::from_secs(30));
                })
                .unwrap();
            let policy = ThreadLeaks::default().belong_to_suite(true);
            assert!(term
                .check_leftover(LifecycleScope::Test, policy, &before, &Description::test("S", "t"))
                .is_none());
            assert!(term
                .check_leftover(LifecycleScope::Suite, policy, &before, &Description::suite("S"))
                .is_some());
            assert!(!t.is_alive());
        }

        #[test]
        fn test_daemon_filter() {
            let group = RunnerThreadGroup::new("t");
            let term = terminator(&group);
            let before = group.snapshot();
            let (tx, rx) = mpsc::channel::<()>();
            let t = group
                .spawn("daemon", move || {
                    let _root = trace_scope(DAEMON_ROOT_CLASS, "run");
                    let _ = rx.recv();
                })
                .unwrap();
            std::thread::sleep(Duration::from_millis(50));
            assert!(term.leaked_since(&before).is_empty());
            drop(tx);
            t.join(None);
        }

        #[test]
        fn test_warn_only_policy() {
            let group = RunnerThreadGroup::new("t");
            let term = terminator(&group);
            let before = group.snapshot();
            let t = group
                .spawn("leaker", || {
                    let _ = supervised::sleep(Duration::from_millis(300));
                })
                .unwrap();
            let policy = ThreadLeaks::default().fail(false);
            assert!(term
                .check_leftover(LifecycleScope::Test, policy, &before, &Description::test("S", "t"))
                .is_none());
            assert!(t.join(Some(Duration::from_secs(5))));
        }
    }

    mod sample_tests {
        use super::*;

        #[test]
        fn test_common_root() {
            let a = StackFrame::new("std::thread", "spawn");
            let b = StackFrame::new("S", "testA");
            let c = StackFrame::new("S", "helper");
            let samples = StackSamples {
                samples: vec![vec![a.clone(), b.clone()], vec![a.clone(), b.clone(), c]],
            };
            assert_eq!(samples.common_root(), vec![a, b]);
            assert!(StackSamples::default().common_root().is_empty());
        }

        #[test]
        fn test_collect_stops_when_thread_ends() {
            let group = RunnerThreadGroup::new("t");
            let t = group.spawn("quick", || {}).unwrap();
            t.join(None);
            let samples = StackSamples::collect(&t, 5, &mut Randomness::new(1));
            assert!(samples.samples().is_empty());
        }
    }
}
