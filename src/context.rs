//! The per-invocation handle passed to test bodies.
//!
//! A [`TestContext`] lets a test body assert and log values, skip itself, ask for
//! repetitions, take randomized branches, populate a value with random numbers, and look up
//! services from the current test scope.
//!
//! # Examples
//!
//! ```rust
//! use testkitchen::{context::TestContext, engine::LogMessageSink, fixture::TestFixture};
//!
//! let fixture = TestFixture::new();
//! let context = TestContext::new(&fixture, &LogMessageSink, Some(7));
//!
//! assert!(context.assert_eq(2 + 2, 4));
//! assert!(!context.skip("not on this platform"));
//! assert!(context.is_skipped());
//! ```

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt::Display,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{engine::MessageSink, fixture::TestFixture};

/// Small xorshift generator, reproducible for a given seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Create a generator. A zero seed is replaced, xorshift would stay at zero forever.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        let state = if seed == 0 {
            0x9E37_79B9_7F4A_7C15
        } else {
            seed
        };
        Self { state }
    }

    /// Seed from the system clock.
    #[must_use]
    pub fn from_time() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        #[allow(clippy::cast_possible_truncation)]
        let seed = nanos as u64;
        Self::seeded(seed)
    }

    /// Next raw value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// A fair coin.
    pub fn next_bool(&mut self) -> bool {
        self.next_u64() >> 63 == 1
    }

    /// A value in `[0, i32::MAX)`.
    pub fn next_non_negative_i32(&mut self) -> i32 {
        let bound = i32::MAX as u64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let value = (self.next_u64() % bound) as i32;
        value
    }
}

/// Types whose `i32` fields can be populated by [`TestContext::fill`].
///
/// ```rust
/// use testkitchen::context::RandomFill;
///
/// struct Point { x: i32, y: i32, label: String }
///
/// impl RandomFill for Point {
///     fn fill_fields(&mut self, fill: &mut dyn FnMut(&mut i32)) {
///         fill(&mut self.x);
///         fill(&mut self.y);
///     }
/// }
/// ```
pub trait RandomFill {
    /// Call `fill` once for every `i32` field that should receive a random value.
    fn fill_fields(&mut self, fill: &mut dyn FnMut(&mut i32));
}

/// Per-invocation state visible to a test body.
///
/// The engine creates one context per planned case and reuses it across that case's
/// repetitions. The skip flag is cleared before every invocation; a repeat request is only
/// honoured from the first invocation.
pub struct TestContext<'run> {
    fixture: &'run TestFixture,
    sink: &'run dyn MessageSink,
    rng: RefCell<DeterministicRng>,
    skipped: Cell<bool>,
    skip_reason: RefCell<String>,
    repeat: Cell<u32>,
}

impl<'run> TestContext<'run> {
    /// Create a context over `fixture`, logging through `sink`. Without a seed the generator is
    /// seeded from the clock.
    #[must_use]
    pub fn new(fixture: &'run TestFixture, sink: &'run dyn MessageSink, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(DeterministicRng::from_time, DeterministicRng::seeded);
        TestContext {
            fixture,
            sink,
            rng: RefCell::new(rng),
            skipped: Cell::new(false),
            skip_reason: RefCell::new(String::new()),
            repeat: Cell::new(0),
        }
    }

    /// Compare two values, logging an error when they differ and an info line when they agree.
    pub fn assert_eq<T: PartialEq + Display>(&self, left: T, right: T) -> bool {
        let equal = left == right;
        if equal {
            self.sink.info(&format!("Values were both {left}"));
        } else {
            self.sink.error(&format!("Expected {left}, but was {right}"));
        }
        equal
    }

    /// Mark the current invocation as skipped. Returns `false` so a body can `return Ok(ctx.skip(..))`.
    pub fn skip(&self, reason: impl Into<String>) -> bool {
        self.skipped.set(true);
        *self.skip_reason.borrow_mut() = reason.into();
        false
    }

    /// Returns true if [`TestContext::skip`] was called during the current invocation.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped.get()
    }

    /// Reason given to the last [`TestContext::skip`].
    #[must_use]
    pub fn skip_reason(&self) -> String {
        self.skip_reason.borrow().clone()
    }

    /// Run `action` with probability one half. Returns whether it ran.
    pub fn maybe(&self, action: impl FnOnce()) -> bool {
        let taken = self.rng.borrow_mut().next_bool();
        self.sink.info(&format!("Maybe: {taken}"));
        if taken {
            action();
        }
        taken
    }

    /// Flip `n` coins, running `action` for each head.
    ///
    /// A first coin is flipped and logged as `#1` without running anything; the `n` coins
    /// that can run `action` are logged as `#2` onwards.
    pub fn maybe_repeat(&self, n: u32, mut action: impl FnMut()) {
        let first = self.rng.borrow_mut().next_bool();
        self.sink.info(&format!("MaybeRepeat #1: {first}"));

        for i in 0..n {
            let taken = self.rng.borrow_mut().next_bool();
            self.sink.info(&format!("MaybeRepeat #{}: {taken}", i + 2));
            if taken {
                action();
            }
        }
    }

    /// Ask for `n` additional invocations of the current test.
    pub fn repeat(&self, n: u32) {
        self.repeat.set(n);
    }

    /// Ask for one additional invocation.
    pub fn repeat_once(&self) {
        self.repeat(1);
    }

    /// Set every `i32` field `target` exposes to a random value in `[0, i32::MAX)`.
    pub fn fill<T: RandomFill + ?Sized>(&self, target: &mut T) {
        let mut rng = self.rng.borrow_mut();
        target.fill_fields(&mut |field: &mut i32| *field = rng.next_non_negative_i32());
    }

    /// Look up a service, current test scope first.
    #[must_use]
    pub fn service<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.fixture.resolve::<T>()
    }

    /// The fixture this context resolves from.
    #[must_use]
    pub fn fixture(&self) -> &TestFixture {
        self.fixture
    }

    pub(crate) fn reset_invocation(&self) {
        self.skipped.set(false);
        self.skip_reason.borrow_mut().clear();
    }

    pub(crate) fn take_repeat(&self) -> u32 {
        self.repeat.replace(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::engine::MessageLevel;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(MessageLevel, String)>>);

    impl MessageSink for Recorder {
        fn send_message(&self, level: MessageLevel, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
        }
    }

    struct Sample {
        a: i32,
        b: i32,
        untouched: i64,
    }

    impl RandomFill for Sample {
        fn fill_fields(&mut self, fill: &mut dyn FnMut(&mut i32)) {
            fill(&mut self.a);
            fill(&mut self.b);
        }
    }

    #[test]
    fn rng_is_reproducible() {
        let mut a = DeterministicRng::seeded(42);
        let mut b = DeterministicRng::seeded(42);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }

        let mut zero = DeterministicRng::seeded(0);
        assert_ne!(zero.next_u64(), 0);
    }

    #[test]
    fn assert_logs_both_ways() {
        let fixture = TestFixture::new();
        let sink = Recorder::default();
        let context = TestContext::new(&fixture, &sink, Some(1));

        assert!(context.assert_eq(3, 3));
        assert!(!context.assert_eq("left", "right"));

        let messages = sink.0.lock().unwrap().clone();
        assert_eq!(
            messages,
            vec![
                (MessageLevel::Informational, "Values were both 3".to_string()),
                (MessageLevel::Error, "Expected left, but was right".to_string()),
            ]
        );
    }

    #[test]
    fn skip_and_reset() {
        let fixture = TestFixture::new();
        let sink = Recorder::default();
        let context = TestContext::new(&fixture, &sink, Some(1));

        assert!(!context.skip("later"));
        assert!(context.is_skipped());
        assert_eq!(context.skip_reason(), "later");

        context.reset_invocation();
        assert!(!context.is_skipped());
        assert_eq!(context.skip_reason(), "");
    }

    #[test]
    fn repeat_is_taken_once() {
        let fixture = TestFixture::new();
        let sink = Recorder::default();
        let context = TestContext::new(&fixture, &sink, Some(1));

        context.repeat(3);
        assert_eq!(context.take_repeat(), 3);
        assert_eq!(context.take_repeat(), 0);

        context.repeat_once();
        assert_eq!(context.take_repeat(), 1);
    }

    #[test]
    fn maybe_repeat_logs_every_flip() {
        let fixture = TestFixture::new();
        let sink = Recorder::default();
        let context = TestContext::new(&fixture, &sink, Some(99));

        let mut ran = 0;
        context.maybe_repeat(4, || ran += 1);

        let lines = sink.lines();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("MaybeRepeat #1: "));
        assert!(lines[4].starts_with("MaybeRepeat #5: "));
        let heads = lines[1..].iter().filter(|l| l.ends_with("true")).count();
        assert_eq!(ran, heads);
    }

    #[test]
    fn maybe_runs_when_logged_true() {
        let fixture = TestFixture::new();
        let sink = Recorder::default();
        let context = TestContext::new(&fixture, &sink, Some(5));

        for _ in 0..8 {
            let mut ran = false;
            let taken = context.maybe(|| ran = true);
            assert_eq!(taken, ran);
        }
        assert_eq!(sink.lines().len(), 8);
        assert!(sink.lines().iter().all(|l| l.starts_with("Maybe: ")));
    }

    #[test]
    fn fill_sets_non_negative_values() {
        let fixture = TestFixture::new();
        let sink = Recorder::default();
        let context = TestContext::new(&fixture, &sink, Some(11));

        let mut sample = Sample {
            a: -1,
            b: -1,
            untouched: -1,
        };
        context.fill(&mut sample);

        assert!(sample.a >= 0 && sample.a < i32::MAX);
        assert!(sample.b >= 0 && sample.b < i32::MAX);
        assert_eq!(sample.untouched, -1);
    }

    #[test]
    fn service_lookup_goes_through_fixture() {
        let fixture = TestFixture::new();
        fixture.add_singleton(String::from("shared")).unwrap();
        fixture.begin().unwrap();
        let sink = Recorder::default();
        let context = TestContext::new(&fixture, &sink, None);

        assert_eq!(context.service::<String>().as_deref().map(String::as_str), Some("shared"));
        assert!(context.service::<u8>().is_none());
    }
}
