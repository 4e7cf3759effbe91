//! Failure values flowing through a run.
//!
//! A [`Throwable`] is what a test body, hook, constructor or supervisor
//! reports: a kind, an error class tag, a message, a synthetic stack and an
//! optional cause chain. Any `std::error::Error` converts into one with `?`;
//! panics are captured by the runner and converted with
//! [`Throwable::from_panic`].

use std::any::Any;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Once};

use serde::{Deserialize, Serialize};

use crate::randomness::format_seed_chain;

/// Class-name prefix of the synthetic stack frame carrying the seed chain.
pub const AUGMENTED_SEED_PACKAGE: &str = "__randomizedtesting";

/// Full class name of the seed frame.
pub const SEED_INFO_CLASS: &str = "__randomizedtesting.SeedInfo";

/// Result of a test body, hook or factory.
pub type TestResult = Result<(), Throwable>;

/// Panic payload used to unwind a stopped thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadDeath;

/// Category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrowableKind {
    /// Ordinary failure (assertion or error returned from test code)
    Failure,
    /// Panic captured from test code
    Panic,
    /// Test preconditions not met; reported as skipped
    AssumptionViolated,
    /// A supervised wait observed an interrupt request
    Interrupted,
    /// A supervised thread unwound after a stop request
    ThreadDeath,
    /// Timeout or thread leak detected by the supervisor
    Threading,
    /// A registered resource failed to close
    ResourceDisposal,
}

/// One synthetic stack frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    /// Class or module path
    pub class_name: String,
    /// Method or function name
    pub method_name: String,
    /// File name, when known
    pub file_name: Option<String>,
    /// Line number (0 when unknown)
    pub line: u32,
}

impl StackFrame {
    /// Create a frame without location
    #[must_use]
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            file_name: None,
            line: 0,
        }
    }

    /// Attach a source location
    #[must_use]
    pub fn with_location(mut self, file_name: impl Into<String>, line: u32) -> Self {
        self.file_name = Some(file_name.into());
        self.line = line;
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_name {
            Some(file) => write!(
                f,
                "{}.{}({}:{})",
                self.class_name, self.method_name, file, self.line
            ),
            None => write!(f, "{}.{}(Unknown Source)", self.class_name, self.method_name),
        }
    }
}

/// A failure reported by test code or by the runner itself
#[derive(Clone, Serialize, Deserialize)]
pub struct Throwable {
    kind: ThrowableKind,
    class_name: String,
    message: String,
    stack: Vec<StackFrame>,
    cause: Option<Box<Throwable>>,
    #[serde(skip)]
    origin: Option<Arc<dyn StdError + Send + Sync>>,
}

impl Throwable {
    /// Create a throwable of a given kind and class tag
    #[must_use]
    pub fn new(kind: ThrowableKind, class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            class_name: class_name.into(),
            message: message.into(),
            stack: Vec::new(),
            cause: None,
            origin: None,
        }
    }

    /// Assertion-style failure
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(ThrowableKind::Failure, "AssertionError", message)
    }

    /// Failure tagged with an explicit error class
    #[must_use]
    pub fn error(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ThrowableKind::Failure, class_name, message)
    }

    /// Assumption violation
    #[must_use]
    pub fn assumption(message: impl Into<String>) -> Self {
        Self::new(
            ThrowableKind::AssumptionViolated,
            "AssumptionViolatedException",
            message,
        )
    }

    /// Interrupted wait
    #[must_use]
    pub fn interrupted() -> Self {
        Self::new(
            ThrowableKind::Interrupted,
            "InterruptedException",
            "sleep interrupted",
        )
    }

    /// Stopped thread
    #[must_use]
    pub fn thread_death() -> Self {
        Self::new(ThrowableKind::ThreadDeath, "ThreadDeath", "thread stopped")
    }

    /// Supervisor-detected timeout or leak
    #[must_use]
    pub fn threading(message: impl Into<String>) -> Self {
        Self::new(ThrowableKind::Threading, "ThreadingError", message)
    }

    /// Resource close failure
    #[must_use]
    pub fn resource_disposal(message: impl Into<String>) -> Self {
        Self::new(
            ThrowableKind::ResourceDisposal,
            "ResourceDisposalError",
            message,
        )
    }

    /// Wrap any error, keeping it for later downcasts
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut throwable = Self::error(std::any::type_name::<E>(), error.to_string());
        throwable.cause = error.source().map(|s| Box::new(Self::from_source(s)));
        throwable.origin = Some(Arc::new(error));
        throwable.capture_stack()
    }

    fn from_source(source: &(dyn StdError + 'static)) -> Self {
        let mut throwable = Self::error("source", source.to_string());
        throwable.cause = source.source().map(|s| Box::new(Self::from_source(s)));
        throwable
    }

    /// Convert a panic payload captured by `catch_unwind`.
    ///
    /// `Throwable` and [`ThreadDeath`] payloads keep their kind; string
    /// payloads become [`ThrowableKind::Panic`].
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let location = take_panic_location();
        let payload = match payload.downcast::<Self>() {
            Ok(throwable) => return *throwable,
            Err(other) => other,
        };
        if payload.is::<ThreadDeath>() {
            return Self::thread_death();
        }
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        let mut throwable = Self::new(ThrowableKind::Panic, "panic", message).capture_stack();
        if let Some(frame) = location {
            throwable.stack.insert(0, frame);
        }
        throwable
    }

    /// Unwind the current thread with this throwable as payload
    pub fn raise(self) -> ! {
        std::panic::panic_any(self)
    }

    /// Attach a cause
    #[must_use]
    pub fn with_cause(mut self, cause: Self) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Replace the stack
    #[must_use]
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }

    /// Append the current thread's supervised breadcrumbs, innermost first.
    #[must_use]
    pub fn capture_stack(mut self) -> Self {
        let mut frames = crate::supervised::current_frames();
        frames.reverse();
        self.stack.extend(frames);
        self
    }

    /// Insert the seed frame at the top of the stack.
    #[must_use]
    pub fn augment(mut self, seeds: &[u64]) -> Self {
        if seeds.is_empty() {
            return self;
        }
        let frame = StackFrame::new(SEED_INFO_CLASS, "seed").with_location(format_seed_chain(seeds), 0);
        self.stack.insert(0, frame);
        self
    }

    /// Prefix the message
    #[must_use]
    pub fn with_message_prefix(mut self, prefix: &str) -> Self {
        self.message = format!("{prefix}{}", self.message);
        self
    }

    /// Kind of failure
    #[must_use]
    pub const fn kind(&self) -> ThrowableKind {
        self.kind
    }

    /// Error class tag
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack frames, innermost first
    #[must_use]
    pub fn stack(&self) -> &[StackFrame] {
        &self.stack
    }

    /// Direct cause
    #[must_use]
    pub fn cause(&self) -> Option<&Self> {
        self.cause.as_deref()
    }

    /// This throwable followed by its cause chain
    pub fn chain(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |t| t.cause())
    }

    /// Whether this is an assumption violation
    #[must_use]
    pub fn is_assumption(&self) -> bool {
        self.kind == ThrowableKind::AssumptionViolated
    }

    /// Whether this is the unwinding of a stopped thread
    #[must_use]
    pub fn is_thread_death(&self) -> bool {
        self.kind == ThrowableKind::ThreadDeath
    }

    /// Whether this is an interrupted wait
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.kind == ThrowableKind::Interrupted
    }

    /// Downcast the wrapped error, if this throwable came from one
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.origin.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

impl<E> From<E> for Throwable
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::from_error(error)
    }
}

impl fmt::Debug for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throwable")
            .field("kind", &self.kind)
            .field("class_name", &self.class_name)
            .field("message", &self.message)
            .field("stack", &self.stack)
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.class_name)
        } else {
            write!(f, "{}: {}", self.class_name, self.message)
        }
    }
}

/// Collect every seed chain recorded in the throwable and its causes.
///
/// Returns `None` when no seed frame is present.
#[must_use]
pub fn seed_from_throwable(throwable: &Throwable) -> Option<String> {
    let seeds: Vec<&str> = throwable
        .chain()
        .flat_map(|t| t.stack.iter())
        .filter(|f| f.class_name.starts_with(AUGMENTED_SEED_PACKAGE))
        .filter_map(|f| f.file_name.as_deref())
        .collect();
    if seeds.is_empty() {
        None
    } else {
        Some(seeds.join(", "))
    }
}

/// Fail with an assumption violation unless `condition` holds.
pub fn assume_true(condition: bool, message: impl Into<String>) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(Throwable::assumption(message))
    }
}

/// Fail with an assumption violation if `condition` holds.
pub fn assume_false(condition: bool, message: impl Into<String>) -> TestResult {
    assume_true(!condition, message)
}

/// Turn an error into an assumption violation (the error becomes the cause).
pub fn assume_no_error<T, E>(result: Result<T, E>) -> Result<T, Throwable>
where
    E: StdError + Send + Sync + 'static,
{
    result.map_err(|e| {
        let cause = Throwable::from_error(e);
        Throwable::assumption(format!("No error expected: {}", cause.message())).with_cause(cause)
    })
}

/// Renders throwables with optional frame filtering.
#[derive(Debug, Clone)]
pub struct TraceFormatting {
    filters: Vec<String>,
    enabled: bool,
}

impl Default for TraceFormatting {
    fn default() -> Self {
        Self {
            filters: vec![
                "std::".to_string(),
                "core::".to_string(),
                "alloc::".to_string(),
                "randomized_runner::".to_string(),
            ],
            enabled: true,
        }
    }
}

impl TraceFormatting {
    /// Formatting with the given class-name prefixes filtered out
    #[must_use]
    pub fn new(filters: Vec<String>) -> Self {
        Self {
            filters,
            enabled: true,
        }
    }

    /// Enable or disable filtering
    #[must_use]
    pub fn with_filtering(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn is_filtered(&self, frame: &StackFrame) -> bool {
        self.enabled && self.filters.iter().any(|p| frame.class_name.starts_with(p.as_str()))
    }

    /// Format frames, collapsing runs of filtered frames.
    #[must_use]
    pub fn format_stack(&self, frames: &[StackFrame]) -> String {
        let mut out = String::new();
        let mut filtered = 0usize;
        for frame in frames {
            if self.is_filtered(frame) {
                filtered += 1;
                continue;
            }
            if filtered > 0 {
                out.push_str(&format!("    [...{filtered} frames filtered]\n"));
                filtered = 0;
            }
            out.push_str(&format!("    at {frame}\n"));
        }
        if filtered > 0 {
            out.push_str(&format!("    [...{filtered} frames filtered]\n"));
        }
        out
    }

    /// Format a throwable with its cause chain.
    #[must_use]
    pub fn format_throwable(&self, throwable: &Throwable) -> String {
        let mut out = String::new();
        for (i, t) in throwable.chain().enumerate() {
            if i > 0 {
                out.push_str("Caused by: ");
            }
            out.push_str(&format!("{t}\n"));
            out.push_str(&self.format_stack(t.stack()));
        }
        out
    }
}

thread_local! {
    static LAST_PANIC_LOCATION: RefCell<Option<StackFrame>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install the process-wide panic hook (once).
///
/// The hook records the panic location for [`Throwable::from_panic`] and
/// keeps control-flow payloads (`Throwable`, [`ThreadDeath`]) off stderr.
pub(crate) fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                let frame = StackFrame::new("panic", "at").with_location(location.file(), location.line());
                LAST_PANIC_LOCATION.with(|slot| *slot.borrow_mut() = Some(frame));
            }
            let payload = info.payload();
            if payload.is::<Throwable>() || payload.is::<ThreadDeath>() {
                return;
            }
            previous(info);
        }));
    });
}

fn take_panic_location() -> Option<StackFrame> {
    LAST_PANIC_LOCATION.with(|slot| slot.borrow_mut().take())
}
