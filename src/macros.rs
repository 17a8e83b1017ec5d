#![allow(unused_macros)]

/// Helper macro for locking items
///
/// A poisoned lock is recovered instead of propagated: the guarded state in this crate
/// (trace buffers, lazily created services) stays consistent even when a test body panics
/// while another thread holds the guard.
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex);
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let data = read_lock!(my_arc_rwlock);
///  println!("{}", data.some_field);
/// ```
macro_rules! read_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut data = write_lock!(my_arc_rwlock);
///  data.some_field = 42;
/// ```
macro_rules! write_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}
