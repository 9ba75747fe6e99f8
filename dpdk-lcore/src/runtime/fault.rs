//! Panic isolation for work units.
//!
//! A panicking work unit must not take its lcore thread down with it: the
//! shutdown protocol waits for every lcore to acknowledge its stop
//! instruction. [`isolate`] catches the unwind, logs the lcore id, the panic
//! message and the frames leading to the panic, and returns normally.
//!
//! The frames are captured by a process-wide panic hook, because the stack
//! is already unwound once `catch_unwind` returns. The hook only handles
//! panics raised inside a work unit; everything else goes to the hook that
//! was installed before.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use tracing::error;

/// Frames logged per panic.
const MAX_FRAMES: usize = 10;

static HOOK: Once = Once::new();

thread_local! {
    static IN_WORK_UNIT: Cell<bool> = const { Cell::new(false) };
    static LAST_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

pub(crate) fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_WORK_UNIT.get() {
                LAST_TRACE.set(Some(Backtrace::force_capture()));
            } else {
                previous(info);
            }
        }));
    });
}

/// Run `f`, converting a panic into `Err(message)`.
pub(crate) fn isolate<F: FnOnce()>(lcore: u32, f: F) -> Result<(), String> {
    LAST_TRACE.set(None);
    IN_WORK_UNIT.set(true);
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    IN_WORK_UNIT.set(false);

    let payload = match result {
        Ok(()) => return Ok(()),
        Err(payload) => payload,
    };

    let message = panic_message(payload.as_ref());
    error!(lcore, panic = %message, "panic on lcore");
    if let Some(trace) = LAST_TRACE.take() {
        for frame in origin_frames(&trace.to_string()).into_iter().take(MAX_FRAMES) {
            error!(lcore, "... at {}, {}", frame.location, frame.function);
        }
    }
    Err(message)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Frame {
    function: String,
    location: String,
}

/// Symbols belonging to the panic machinery, this boundary, or the thread
/// entry rather than to the code that panicked. Unresolved symbols and
/// closure call shims carry no origin either.
fn is_machinery(function: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "std::",
        "core::",
        "alloc::",
        "<alloc::",
        "<core::",
        "<std::",
        "rust_begin_unwind",
        "rust_panic",
        "__rust",
        "__pthread",
        "dpdk_lcore::runtime::fault::",
        "dpdk_lcore::runtime::worker::",
    ];
    const THREAD_ENTRY: &[&str] = &["start_thread", "clone", "clone3", "__clone", "__clone3"];
    function == "<unknown>"
        || function.contains(" as core::ops::function::Fn")
        || PREFIXES.iter().any(|p| function.starts_with(p))
        || THREAD_ENTRY.contains(&function)
}

/// Extract the non-machinery frames from a rendered [`Backtrace`].
///
/// The rendering lists each frame as `N: symbol`, optionally followed by an
/// `at file:line:col` line.
fn origin_frames(rendered: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for line in rendered.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            match frames.last_mut() {
                Some(last) if last.location.is_empty() => last.location = location.to_string(),
                _ => {}
            }
            continue;
        }
        let Some((index, function)) = line.split_once(": ") else {
            continue;
        };
        if index.parse::<usize>().is_ok() {
            frames.push(Frame {
                function: function.to_string(),
                location: String::new(),
            });
        }
    }
    frames.retain(|f| !is_machinery(&f.function));
    for frame in &mut frames {
        if frame.location.is_empty() {
            frame.location = "<unknown>".to_string();
        }
    }
    frames
}
