//! Process-wide diagnostic trace capture.
//!
//! Code under test writes free-form diagnostic text with [`write`] / [`write_line`]. While a
//! [`TraceSession`] is attached the text is queued; the engine [`drain`]s the queue into the
//! result it has just completed, so every piece of output is attributed to exactly one
//! result. Without an attached session writes are discarded.
//!
//! Only one thread holds the buffer at a time. [`attach`] blocks until a session on another
//! thread is dropped, which also serializes engine runs within a process. Attaching again on
//! the thread that already holds the buffer nests: the inner session starts with an empty
//! queue and the outer queue is restored when it is dropped.
//!
//! # Examples
//!
//! ```rust
//! use testkitchen::trace;
//!
//! let session = trace::attach();
//! trace::write("connecting... ");
//! trace::write_line("done");
//! assert_eq!(trace::drain().as_deref(), Some("connecting... done\n"));
//! assert_eq!(trace::drain().as_deref(), Some(""));
//! drop(session);
//!
//! trace::write_line("lost");
//! assert_eq!(trace::drain(), None);
//! ```

use std::{
    cell::Cell,
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

static BUFFER: Mutex<Option<VecDeque<String>>> = Mutex::new(None);
static SESSION: Mutex<()> = Mutex::new(());

thread_local! {
    static HOLDS_SESSION: Cell<bool> = const { Cell::new(false) };
}

/// Ownership of the trace buffer.
///
/// Dropping the outermost session detaches the buffer; dropping a nested one restores the
/// queue of the session it interrupted.
#[must_use = "the trace buffer is detached as soon as the session is dropped"]
pub struct TraceSession {
    exclusive: Option<MutexGuard<'static, ()>>,
    outer: Option<VecDeque<String>>,
}

impl Drop for TraceSession {
    fn drop(&mut self) {
        if self.exclusive.is_some() {
            lock!(BUFFER).take();
            HOLDS_SESSION.with(|held| held.set(false));
        } else {
            *lock!(BUFFER) = self.outer.take();
        }
    }
}

/// Attach an empty buffer, waiting for a session held by another thread to end first.
///
/// On a thread that already holds a session the call returns immediately with a nested
/// session.
pub fn attach() -> TraceSession {
    if HOLDS_SESSION.with(Cell::get) {
        let outer = lock!(BUFFER).replace(VecDeque::new());
        return TraceSession {
            exclusive: None,
            outer,
        };
    }

    let exclusive = lock!(SESSION);
    HOLDS_SESSION.with(|held| held.set(true));
    *lock!(BUFFER) = Some(VecDeque::new());
    TraceSession {
        exclusive: Some(exclusive),
        outer: None,
    }
}

/// Returns true while a session is attached.
#[must_use]
pub fn is_attached() -> bool {
    lock!(BUFFER).is_some()
}

/// Queue `text` as-is.
pub fn write(text: impl Into<String>) {
    if let Some(queue) = lock!(BUFFER).as_mut() {
        queue.push_back(text.into());
    }
}

/// Queue `text` followed by a newline.
pub fn write_line(text: impl Into<String>) {
    if let Some(queue) = lock!(BUFFER).as_mut() {
        queue.push_back(text.into());
        queue.push_back("\n".to_string());
    }
}

/// Remove and concatenate everything queued so far. `None` when no session is attached.
#[must_use]
pub fn drain() -> Option<String> {
    lock!(BUFFER)
        .as_mut()
        .map(|queue| queue.drain(..).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drained_text_is_not_repeated() {
        let _session = attach();
        assert!(is_attached());

        write_line("first");
        assert_eq!(drain().as_deref(), Some("first\n"));

        write("second");
        assert_eq!(drain().as_deref(), Some("second"));
    }

    #[test]
    fn attach_starts_empty() {
        {
            let _session = attach();
            write("left behind");
        }

        let _session = attach();
        assert_eq!(drain().as_deref(), Some(""));
    }

    #[test]
    fn nested_attach_keeps_the_outer_queue() {
        let _outer = attach();
        write_line("outer");

        {
            let _inner = attach();
            write_line("inner");
            assert_eq!(drain().as_deref(), Some("inner\n"));
        }

        assert!(is_attached());
        assert_eq!(drain().as_deref(), Some("outer\n"));
    }
}
