//! Per-thread randomized execution context.
//!
//! Every thread running suite code carries a stack of [`Randomness`]
//! values: the runner seed at the bottom, then one entry per nested scope
//! (test candidate, child thread). The stack lives in a thread-local and is
//! pushed and popped through RAII guards. Supervised child threads start
//! with a fresh copy of their spawner's stack.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::annotations::TestGroup;
use crate::groups::GroupEvaluator;
use crate::randomness::Randomness;
use crate::resources::{Closeable, LifecycleScope, ResourceRegistry};
use crate::result::{RunnerError, RunnerResult};
use crate::supervised;

/// State shared by every thread of one suite run
pub(crate) struct SuiteContext {
    suite_name: String,
    runner_seed: u64,
    groups: GroupEvaluator,
    resources: ResourceRegistry,
}

impl fmt::Debug for SuiteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteContext")
            .field("suite_name", &self.suite_name)
            .field("runner_seed", &format_args!("{:X}", self.runner_seed))
            .field("resources", &self.resources)
            .finish()
    }
}

impl SuiteContext {
    pub(crate) fn new(suite_name: impl Into<String>, runner_seed: u64, groups: GroupEvaluator) -> Self {
        Self {
            suite_name: suite_name.into(),
            runner_seed,
            groups,
            resources: ResourceRegistry::default(),
        }
    }

    pub(crate) fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }
}

struct ThreadContext {
    suite: Arc<SuiteContext>,
    stack: Vec<Randomness>,
}

thread_local! {
    static CONTEXT: RefCell<Option<ThreadContext>> = const { RefCell::new(None) };
}

fn publish(stack: &[Randomness]) {
    supervised::publish_seed_chain(stack.iter().map(Randomness::seed).collect());
}

/// Restores the previous context of the thread on drop.
#[must_use = "the context is left when the guard drops"]
pub(crate) struct ContextGuard {
    previous: Option<ThreadContext>,
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("nested", &self.previous.is_some())
            .finish()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CONTEXT.with(|c| {
            let mut slot = c.borrow_mut();
            *slot = previous;
            publish(slot.as_ref().map_or(&[][..], |ctx| ctx.stack.as_slice()));
        });
    }
}

/// Make `suite` the calling thread's context, with `root` at the bottom of
/// the randomness stack.
pub(crate) fn enter(suite: Arc<SuiteContext>, root: Randomness) -> ContextGuard {
    install(ThreadContext {
        suite,
        stack: vec![root],
    })
}

fn install(context: ThreadContext) -> ContextGuard {
    publish(&context.stack);
    let previous = CONTEXT.with(|c| c.borrow_mut().replace(context));
    ContextGuard { previous }
}

/// Pops one randomness level on drop.
#[must_use = "the randomness is popped when the guard drops"]
#[derive(Debug)]
pub(crate) struct RandomnessGuard {
    depth: usize,
}

impl Drop for RandomnessGuard {
    fn drop(&mut self) {
        CONTEXT.with(|c| {
            if let Some(ctx) = c.borrow_mut().as_mut() {
                if ctx.stack.len() == self.depth {
                    ctx.stack.pop();
                } else {
                    tracing::warn!(
                        expected = self.depth,
                        actual = ctx.stack.len(),
                        "randomness stack out of balance"
                    );
                    ctx.stack.truncate(self.depth.saturating_sub(1));
                }
                publish(&ctx.stack);
            }
        });
    }
}

/// Push a randomness level on the calling thread's stack.
pub(crate) fn push(randomness: Randomness) -> RunnerResult<RandomnessGuard> {
    CONTEXT.with(|c| {
        let mut slot = c.borrow_mut();
        let ctx = slot.as_mut().ok_or_else(no_context)?;
        ctx.stack.push(randomness);
        publish(&ctx.stack);
        Ok(RandomnessGuard { depth: ctx.stack.len() })
    })
}

/// Snapshot of a context handed to a child thread.
pub(crate) struct InheritedContext {
    suite: Arc<SuiteContext>,
    stack: Vec<Randomness>,
}

impl InheritedContext {
    /// Install the inherited context on the calling (child) thread.
    pub(crate) fn enter(self) -> ContextGuard {
        install(ThreadContext {
            suite: self.suite,
            stack: self.stack,
        })
    }
}

/// Fresh copy of the calling thread's context, rewound to each seed.
pub(crate) fn inherit() -> Option<InheritedContext> {
    CONTEXT.with(|c| {
        c.borrow().as_ref().map(|ctx| InheritedContext {
            suite: Arc::clone(&ctx.suite),
            stack: ctx.stack.iter().map(Randomness::fork).collect(),
        })
    })
}

fn no_context() -> RunnerError {
    RunnerError::invalid_state(
        "No randomized context for this thread: not running under the randomized runner or a supervised thread",
    )
}

fn with_context<R>(f: impl FnOnce(&mut ThreadContext) -> R) -> RunnerResult<R> {
    CONTEXT.with(|c| c.borrow_mut().as_mut().map(f).ok_or_else(no_context))
}

/// Access to the randomized context of the calling thread.
///
/// Obtained with [`RandomizedContext::current`]; valid on the runner thread
/// and on any thread spawned through [`supervised::spawn`].
#[derive(Clone)]
pub struct RandomizedContext {
    suite: Arc<SuiteContext>,
}

impl fmt::Debug for RandomizedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomizedContext")
            .field("suite", &self.suite.suite_name)
            .finish()
    }
}

impl RandomizedContext {
    /// Context of the calling thread
    pub fn current() -> RunnerResult<Self> {
        with_context(|ctx| Self {
            suite: Arc::clone(&ctx.suite),
        })
    }

    /// Whether the calling thread has a context
    #[must_use]
    pub fn is_active() -> bool {
        CONTEXT.with(|c| c.borrow().is_some())
    }

    /// Name of the running suite
    #[must_use]
    pub fn suite_name(&self) -> &str {
        &self.suite.suite_name
    }

    /// Seed of the runner (bottom of the stack)
    #[must_use]
    pub fn runner_seed(&self) -> u64 {
        self.suite.runner_seed
    }

    /// Seeds of the calling thread's stack, bottom first
    pub fn seed_chain(&self) -> RunnerResult<Vec<u64>> {
        with_context(|ctx| ctx.stack.iter().map(Randomness::seed).collect())
    }

    /// Run `f` with the innermost randomness of the calling thread.
    ///
    /// `f` must not call back into the context.
    pub fn with_random<R>(&self, f: impl FnOnce(&mut Randomness) -> R) -> RunnerResult<R> {
        with_context(|ctx| ctx.stack.last_mut().map(f))?.ok_or_else(no_context)
    }

    /// Whether nightly mode is on
    #[must_use]
    pub fn is_nightly(&self) -> bool {
        self.suite.groups.is_nightly()
    }

    /// Whether a test group is enabled for this run
    pub fn is_group_enabled(&self, group: &TestGroup) -> RunnerResult<bool> {
        self.suite.groups.is_enabled(group)
    }

    /// Close `resource` when the current test ends
    pub fn close_after_test<C: Closeable + 'static>(&self, resource: C) {
        self.suite
            .resources
            .register(Box::new(resource), LifecycleScope::Test);
    }

    /// Close `resource` when the suite ends
    pub fn close_after_suite<C: Closeable + 'static>(&self, resource: C) {
        self.suite
            .resources
            .register(Box::new(resource), LifecycleScope::Suite);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::resources::CloseableFn;
    use crate::supervised::RunnerThreadGroup;
    use rand::RngCore;

    fn suite() -> Arc<SuiteContext> {
        Arc::new(SuiteContext::new("demo.Suite", 0xAB, GroupEvaluator::default()))
    }

    mod stack_tests {
        use super::*;

        #[test]
        fn test_no_context_outside_runner() {
            assert!(!RandomizedContext::is_active());
            assert!(RandomizedContext::current().is_err());
            assert!(push(Randomness::new(1)).is_err());
        }

        #[test]
        fn test_push_and_pop() {
            let _ctx = enter(suite(), Randomness::new(0xAB));
            let rc = RandomizedContext::current().unwrap();
            assert_eq!(rc.suite_name(), "demo.Suite");
            assert_eq!(rc.runner_seed(), 0xAB);
            {
                let _level = push(Randomness::new(0xCD)).unwrap();
                assert_eq!(rc.seed_chain().unwrap(), vec![0xAB, 0xCD]);
            }
            assert_eq!(rc.seed_chain().unwrap(), vec![0xAB]);
        }

        #[test]
        fn test_guard_restores_previous_context() {
            {
                let _ctx = enter(suite(), Randomness::new(1));
                assert!(RandomizedContext::is_active());
            }
            assert!(!RandomizedContext::is_active());
        }

        #[test]
        fn test_with_random_is_reproducible() {
            let _ctx = enter(suite(), Randomness::new(7));
            let rc = RandomizedContext::current().unwrap();
            let a = rc.with_random(|r| r.next_u64()).unwrap();
            let mut expected = Randomness::new(7);
            assert_eq!(a, expected.next_u64());
        }
    }

    mod inheritance_tests {
        use super::*;
        use std::sync::mpsc;

        #[test]
        fn test_child_gets_fresh_copy() {
            let group = RunnerThreadGroup::new("ctx");
            let (tx, rx) = mpsc::channel();
            let (first_tx, first_rx) = mpsc::channel();
            let outer = group
                .spawn("outer", move || {
                    let _ctx = enter(suite(), Randomness::new(5));
                    let rc = RandomizedContext::current().unwrap();
                    let parent_first = rc.with_random(|r| r.next_u64()).unwrap();
                    first_tx.send(parent_first).unwrap();
                    let child = supervised::spawn("inner", move || {
                        let rc = RandomizedContext::current().unwrap();
                        let seeds = rc.seed_chain().unwrap();
                        let first = rc.with_random(|r| r.next_u64()).unwrap();
                        tx.send((seeds, first)).unwrap();
                    })
                    .unwrap();
                    child.join(None);
                })
                .unwrap();
            outer.join(None);
            let (seeds, child_first) = rx.recv().unwrap();
            assert_eq!(seeds, vec![5]);
            assert_eq!(child_first, first_rx.recv().unwrap());
        }
    }

    mod resource_tests {
        use super::*;

        #[test]
        fn test_registration_goes_to_suite_registry() {
            let shared = suite();
            let _ctx = enter(Arc::clone(&shared), Randomness::new(1));
            let rc = RandomizedContext::current().unwrap();
            rc.close_after_test(CloseableFn::new("a", || Ok(())));
            rc.close_after_suite(CloseableFn::new("b", || Ok(())));
            assert_eq!(shared.resources().count(LifecycleScope::Test), 1);
            assert_eq!(shared.resources().count(LifecycleScope::Suite), 1);
            assert!(shared.resources().close(LifecycleScope::Test).is_empty());
        }
    }
}
