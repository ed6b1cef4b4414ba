//! Turning panics inside condition and check bodies into data.

use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    cell::{Cell, RefCell},
    panic::{self, AssertUnwindSafe},
    sync::Once,
};

thread_local! {
    static CATCHING: Cell<bool> = const { Cell::new(false) };
    static TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A caught panic: its message and whatever trace we could capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panic {
    pub message: String,
    pub traceback: String,
}

// Panics we catch are reported as events, not printed; all others still
// reach the previously installed hook.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !CATCHING.with(Cell::get) {
                previous(info);
                return;
            }
            let mut trace = match info.location() {
                Some(location) => format!("panicked at {location}"),
                None => "panicked".to_string(),
            };
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                trace.push_str(&format!("\n{backtrace}"));
            }
            TRACE.with(|t| *t.borrow_mut() = Some(trace));
        }));
    });
}

/// Run `f`, catching a panic.
pub fn catch<T>(f: impl FnOnce() -> T) -> Result<T, Panic> {
    install_hook();
    let was_catching = CATCHING.with(|c| c.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CATCHING.with(|c| c.set(was_catching));
    result.map_err(|payload| {
        let message = get_panic_message(payload);
        let trace = TRACE
            .with(|t| t.borrow_mut().take())
            .unwrap_or_else(|| "panicked".to_string());
        Panic {
            traceback: format!("{trace}\n{message}"),
            message,
        }
    })
}

pub(crate) fn get_panic_message(msg: Box<dyn Any + Send + 'static>) -> String {
    match msg.downcast_ref::<&'static str>() {
        Some(s) => s.to_string(),
        None => match msg.downcast_ref::<String>() {
            Some(s) => s.to_owned(),
            None => "Box<dyn Any>".to_owned(),
        },
    }
}
