//! Panic trapping for dispatch.
//!
//! A process-wide panic hook is installed on first use. While a [`catch`]
//! is active on the current thread, the hook records the panic location and
//! a backtrace instead of printing the usual message; everywhere else it
//! defers to the hook that was installed before it.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

static INSTALL: Once = Once::new();

thread_local! {
    static ACTIVE: Cell<usize> = const { Cell::new(0) };
    static CAPTURED: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// A panic intercepted by [`catch`].
pub(crate) struct Caught {
    pub value: Box<dyn Any + Send>,
    pub stack: String,
}

fn install_hook() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if ACTIVE.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "<unknown>".to_string());
            let stack = format!("panicked at {location}\n{}", Backtrace::force_capture());
            CAPTURED.with(|c| *c.borrow_mut() = Some(stack));
        }));
    });
}

/// Run `f`, returning any panic it raises as a [`Caught`].
pub(crate) fn catch<T>(f: impl FnOnce() -> T) -> Result<T, Caught> {
    install_hook();
    ACTIVE.with(|a| a.set(a.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    ACTIVE.with(|a| a.set(a.get().saturating_sub(1)));

    result.map_err(|value| {
        let stack = CAPTURED
            .with(|c| c.borrow_mut().take())
            .unwrap_or_else(|| Backtrace::force_capture().to_string());
        Caught { value, stack }
    })
}
