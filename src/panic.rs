//! Panic capture for spawned tasks
//!
//! Every background task in this crate runs inside [`CatchPanic`], so a panic
//! never tears down the runtime worker; it becomes a [`WrappedPanic`] on the
//! task's result path instead.
//!
//! Unwinding destroys the frames we care about before `catch_unwind` returns,
//! so the trace is taken by a panic hook while the panicking frame is still
//! on the stack. The hook only records (and stays silent) while a
//! `CatchPanic` poll is running on the current thread; every other panic is
//! forwarded to the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::task::{Context as TaskContext, Poll};

use parking_lot::Mutex;
use thiserror::Error;

/// Frames that raise a panic; the last one sits directly above the panicking function
const PANIC_ENTRY_MARKERS: &[&str] = &[
    "core::panicking::",
    "core::option::expect_failed",
    "core::result::unwrap_failed",
    "std::panicking::begin_panic",
    "std::panicking::rust_panic_with_hook",
    "std::panicking::panic_with_hook",
    "std::panicking::panic_handler",
    "std::panic::panic_any",
    "rust_begin_unwind",
    "__rust_end_short_backtrace",
];

/// Frames of the capture itself, above the panic entry
const CAPTURE_MARKERS: &[&str] = &[
    "std::backtrace",
    "backtrace_rs",
    "std::sys",
    "panic::install_hook",
    "alloc::boxed::Box<",
    "core::ops::function::Fn",
];

struct Captured {
    location: String,
    trace: String,
}

thread_local! {
    static CAPTURE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<Captured>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURE_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let location = info
                .location()
                .map(ToString::to_string)
                .unwrap_or_else(|| "<unknown>".to_string());
            let trace = Backtrace::force_capture().to_string();
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(Captured { location, trace }));
        }));
    });
}

struct CaptureScope;

impl CaptureScope {
    fn enter() -> Self {
        LAST_PANIC.with(|slot| slot.borrow_mut().take());
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        CaptureScope
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        let depth = CAPTURE_DEPTH.with(|depth| {
            let left = depth.get().saturating_sub(1);
            depth.set(left);
            left
        });
        // Anything not claimed by now was caught by an inner catch_unwind
        if depth == 0 {
            LAST_PANIC.with(|slot| slot.borrow_mut().take());
        }
    }
}

/// A recovered panic: the original payload plus a trimmed stack trace
///
/// The first line of [`stack`](Self::stack) is `panicked at <file:line:col>`;
/// the frames that follow start at the panicking function.
#[derive(Error, Clone)]
#[error("panic: {message}\n{stack}")]
pub struct WrappedPanic {
    message: String,
    stack: String,
    payload: Arc<Mutex<Box<dyn Any + Send>>>,
}

impl WrappedPanic {
    /// Convert the result of `catch_unwind`; a call that did not panic yields no error
    pub fn recover<T>(result: std::thread::Result<T>) -> Result<T, WrappedPanic> {
        result.map_err(Self::from_payload)
    }

    /// Wrap a panic payload, attaching the trace recorded for this thread if any
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = payload_message(payload.as_ref());
        let stack = match LAST_PANIC.with(|slot| slot.borrow_mut().take()) {
            Some(captured) => format!(
                "panicked at {}\n{}",
                captured.location,
                chop_stack(&captured.trace)
            ),
            None => format!(
                "panicked at <unknown>\n{}",
                chop_stack(&Backtrace::force_capture().to_string())
            ),
        };
        Self {
            message,
            stack,
            payload: Arc::new(Mutex::new(payload)),
        }
    }

    /// Panic message rendered from the payload
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Clone the original payload out if it has type `T`
    pub fn value<T: Any + Clone>(&self) -> Option<T> {
        self.payload.lock().downcast_ref::<T>().cloned()
    }
}

impl std::fmt::Debug for WrappedPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedPanic")
            .field("message", &self.message)
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

fn is_frame_header(line: &str) -> bool {
    line.trim_start()
        .split_once(": ")
        .map(|(n, _)| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

fn is_panic_entry(line: &str) -> bool {
    PANIC_ENTRY_MARKERS.iter().any(|marker| line.contains(marker))
}

fn is_machinery(line: &str) -> bool {
    is_panic_entry(line) || CAPTURE_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Drop the leading panic/backtrace frames of a rendered [`Backtrace`]
///
/// Everything up to and including the last panic entry frame above the
/// panicking function is removed. Traces that do not start with such frames
/// are returned unchanged.
pub fn chop_stack(trace: &str) -> String {
    let lines: Vec<&str> = trace.lines().collect();
    let headers: Vec<usize> = (0..lines.len())
        .filter(|&i| is_frame_header(lines[i]))
        .collect();

    let Some(&first) = headers.first() else {
        return trace.to_string();
    };
    if !is_machinery(lines[first]) {
        return trace.to_string();
    }

    // Capture frames come first, then a contiguous run of panic entry frames.
    let mut last_entry = None;
    for (pos, &idx) in headers.iter().enumerate() {
        if is_panic_entry(lines[idx]) {
            last_entry = Some(pos);
        } else if last_entry.is_some() {
            break;
        }
    }

    let start = match last_entry {
        Some(pos) => headers.get(pos + 1).copied(),
        None => headers.iter().copied().find(|&i| !is_machinery(lines[i])),
    };
    match start {
        Some(idx) => lines[idx..].join("\n"),
        None => String::new(),
    }
}

/// Future adapter that turns a panic during any poll into `Err(WrappedPanic)`
pub struct CatchPanic<F> {
    inner: Pin<Box<F>>,
}

impl<F> CatchPanic<F> {
    pub fn new(fut: F) -> Self {
        install_hook();
        Self {
            inner: Box::pin(fut),
        }
    }
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, WrappedPanic>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let inner = self.get_mut().inner.as_mut();
        let _scope = CaptureScope::enter();
        match WrappedPanic::recover(panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx)))) {
            Ok(Poll::Ready(out)) => Poll::Ready(Ok(out)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(wrapped) => Poll::Ready(Err(wrapped)),
        }
    }
}

/// Shorthand for [`CatchPanic::new`]
pub fn catch_panic<F: Future>(fut: F) -> CatchPanic<F> {
    CatchPanic::new(fut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Payload(u32);

    #[test]
    fn test_recover_without_panic_is_ok() {
        let out = WrappedPanic::recover(Ok::<_, Box<dyn Any + Send>>(5));
        assert_eq!(out.unwrap(), 5);
    }

    #[test]
    fn test_chop_stack_with_invalid_input() {
        let s = "\n\t\tpanic:\n\n\t\tThis is a string with many newlines\n\n\t\tcool.\n\t\t";
        assert_eq!(chop_stack(s), s);
    }

    #[test]
    fn test_chop_stack_keeps_user_frames() {
        let trace = "   0: std::backtrace::Backtrace::force_capture\n\
                     \x20            at /rustc/library/std/src/backtrace.rs:312:9\n\
                     \x20  1: update_gitignore::panic::install_hook::{{closure}}\n\
                     \x20  2: <alloc::boxed::Box<F,A> as core::ops::function::Fn<Args>>::call\n\
                     \x20  3: std::panicking::rust_panic_with_hook\n\
                     \x20  4: std::panicking::begin_panic_handler::{{closure}}\n\
                     \x20  5: std::sys::backtrace::__rust_end_short_backtrace\n\
                     \x20  6: rust_begin_unwind\n\
                     \x20  7: core::panicking::panic_fmt\n\
                     \x20  8: my_crate::explode\n\
                     \x20            at ./src/lib.rs:10:5\n\
                     \x20  9: std::panicking::try";
        let chopped = chop_stack(trace);
        let lines: Vec<&str> = chopped.lines().collect();
        assert_eq!(lines[0].trim(), "8: my_crate::explode");
        assert_eq!(lines[1].trim(), "at ./src/lib.rs:10:5");
        assert_eq!(lines[2].trim(), "9: std::panicking::try");
    }

    #[test]
    fn test_chop_stack_without_entry_frames_skips_capture() {
        let trace = "   0: std::backtrace::Backtrace::force_capture\n\
                     \x20  1: update_gitignore::panic::install_hook::{{closure}}\n\
                     \x20  2: my_crate::explode";
        assert_eq!(chop_stack(trace).trim(), "2: my_crate::explode");
    }

    #[inline(never)]
    fn explode_here() {
        panic!("kaboom");
    }

    #[tokio::test]
    async fn test_stack_starts_at_panicking_function() {
        let wrapped = catch_panic(async { explode_here() }).await.unwrap_err();

        let frame = wrapped.stack().lines().nth(1).unwrap();
        assert!(frame.contains("explode_here"), "{}", wrapped.stack());
        assert!(!wrapped.stack().contains("force_capture"), "{}", wrapped.stack());
        assert!(!wrapped.stack().contains("panic_fmt"), "{}", wrapped.stack());
    }

    #[tokio::test]
    async fn test_panic_caught_inside_the_future_leaves_no_record() {
        let result = catch_panic(async {
            let _ = std::panic::catch_unwind(|| panic!("inner"));
            1
        })
        .await;
        assert_eq!(result.unwrap(), 1);

        let late = WrappedPanic::from_payload(Box::new("late"));
        assert!(late.stack().starts_with("panicked at <unknown>"), "{}", late.stack());
    }

    #[test]
    fn test_chop_stack_leaves_user_first_trace_alone() {
        let trace = "   0: my_crate::explode\n   1: std::panicking::try";
        assert_eq!(chop_stack(trace), trace);
    }

    #[tokio::test]
    async fn test_catch_panic_names_call_site() {
        let line = line!() + 2;
        let result = catch_panic(async {
            panic!("boom");
        })
        .await;

        let wrapped = result.unwrap_err();
        assert_eq!(wrapped.message(), "boom");
        let first = wrapped.stack().lines().next().unwrap();
        assert!(first.starts_with("panicked at "), "{first}");
        assert!(first.contains(file!()), "{first}");
        assert!(first.contains(&format!(":{line}:")), "{first}");
        assert!(wrapped.to_string().starts_with("panic: boom\npanicked at "));
    }

    #[tokio::test]
    async fn test_catch_panic_keeps_payload() {
        let result = catch_panic(async {
            std::panic::panic_any(Payload(42));
        })
        .await;

        let wrapped = result.unwrap_err();
        assert_eq!(wrapped.value::<Payload>(), Some(Payload(42)));
        assert_eq!(wrapped.value::<String>(), None);
        assert_eq!(wrapped.message(), "Box<dyn Any>");
    }

    #[tokio::test]
    async fn test_catch_panic_passes_output_through() {
        let result = catch_panic(async { 40 + 2 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_catch_panic_across_await_points() {
        let result = catch_panic(async {
            tokio::task::yield_now().await;
            let v: Vec<u8> = Vec::new();
            v[3]
        })
        .await;

        let wrapped = result.unwrap_err();
        assert!(wrapped.message().contains("index out of bounds"));
        assert!(wrapped.stack().lines().next().unwrap().contains(file!()));
    }
}
