//! Shared state block: the only synchronization primitive between the render
//! head and the generator.
//!
//! The block is a fixed array of machine words with slot indices assigned at
//! startup and never resized:
//!
//! | slot | word        | writer(s)            | reader(s)            |
//! |------|-------------|----------------------|----------------------|
//! | 0    | request     | render head, generator | generator, render head |
//! | 1    | frequency   | render head          | generator            |
//! | 2    | cursor      | render head          | generator, tap       |
//! | 3    | flags       | generator            | render head          |
//! | 4    | signals     | render head          | host                 |
//! | 5    | overruns    | render head          | host                 |
//!
//! Only the request word carries read-modify-write semantics; every other
//! slot is single-writer with staleness tolerated by contract, so plain
//! atomic loads/stores suffice. Each slot is cache-padded so the render
//! head's stores never bounce the generator's lines.
//!
//! Waking: the generator blocks on a condvar paired with the request word.
//! The render head stores the request and notifies WITHOUT taking the mutex
//! (it must never block); the generator re-arms with a short timed wait, so a
//! notify that races the gap between its check and its sleep is recovered on
//! the next tick; the request word is sticky until the generator clears it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crossbeam::utils::CachePadded;

/// No work outstanding.
pub const REQUEST_IDLE: u32 = 0;
/// Render head asks for the vacated kernel to be refilled.
pub const REQUEST_RENDER: u32 = 1;
/// Session teardown; releases the generator from its wait for good.
pub const REQUEST_SHUTDOWN: u32 = 2;

const SLOT_REQUEST: usize = 0;
const SLOT_FREQ_BITS: usize = 1;
const SLOT_CURSOR: usize = 2;
const SLOT_FLAGS: usize = 3;
const SLOT_SIGNALS: usize = 4;
const SLOT_OVERRUNS: usize = 5;
const SLOT_COUNT: usize = 6;

const FLAG_GENERATOR_FAILED: u32 = 1 << 0;

/// How long the generator sleeps between re-checks of the request word.
const WAKE_RECHECK: Duration = Duration::from_millis(1);

/// The shared state block. One per session, allocated by the handshake
/// coordinator and handed to both sides behind an `Arc`.
pub struct SharedState {
    words: [CachePadded<AtomicU32>; SLOT_COUNT],
    wake: Mutex<()>,
    wake_cv: Condvar,
}

impl SharedState {
    pub fn new(initial_freq_hz: f32) -> Self {
        let s = Self {
            words: std::array::from_fn(|_| CachePadded::new(AtomicU32::new(0))),
            wake: Mutex::new(()),
            wake_cv: Condvar::new(),
        };
        s.set_frequency(initial_freq_hz);
        s
    }

    // --- request word -------------------------------------------------------

    #[inline]
    pub fn request(&self) -> u32 {
        self.words[SLOT_REQUEST].load(Ordering::Acquire)
    }

    /// Render-head side: publish a render request and wake the generator.
    /// Callers must have checked that the previous request was consumed; the
    /// protocol allows one outstanding request at a time.
    #[inline]
    pub fn signal_render(&self) {
        self.words[SLOT_REQUEST].store(REQUEST_RENDER, Ordering::Release);
        self.words[SLOT_SIGNALS].fetch_add(1, Ordering::Relaxed);
        // No lock here. A missed notify is recovered by the generator's
        // timed re-check against the sticky request word.
        self.wake_cv.notify_one();
    }

    /// Generator side: mark the current render request consumed. Leaves a
    /// concurrently-stored shutdown request in place.
    #[inline]
    pub fn clear_request(&self) {
        let _ = self.words[SLOT_REQUEST].compare_exchange(
            REQUEST_RENDER,
            REQUEST_IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Force the request word back to idle (malformed-value recovery).
    #[inline]
    pub fn reset_request(&self) {
        self.words[SLOT_REQUEST].store(REQUEST_IDLE, Ordering::Release);
    }

    /// Teardown: release the generator from its wait with a distinguished
    /// value it cannot mistake for work.
    pub fn request_shutdown(&self) {
        self.words[SLOT_REQUEST].store(REQUEST_SHUTDOWN, Ordering::Release);
        self.wake_cv.notify_one();
    }

    /// Generator side: block until the request word leaves idle, then return
    /// it. Cooperative wait, no busy loop; the timed re-arm only covers the
    /// lock-free notify above.
    pub fn wait_for_request(&self) -> u32 {
        loop {
            let r = self.request();
            if r != REQUEST_IDLE {
                return r;
            }
            let guard = self.wake.lock().unwrap();
            // Re-check under the mutex would not help: the notifier never
            // takes it. The sticky request word plus the timeout is what
            // bounds the race.
            let _ = self.wake_cv.wait_timeout(guard, WAKE_RECHECK).unwrap();
        }
    }

    // --- parameters ---------------------------------------------------------

    /// Latest requested frequency. Written once per quantum by the render
    /// head, read once per kernel by the generator; staleness by one kernel
    /// is fine, so relaxed single-word accesses are all this needs.
    #[inline]
    pub fn set_frequency(&self, hz: f32) {
        self.words[SLOT_FREQ_BITS].store(hz.max(0.0).to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        f32::from_bits(self.words[SLOT_FREQ_BITS].load(Ordering::Relaxed))
    }

    // --- cursor -------------------------------------------------------------

    /// Render-head side: publish the kernel segment now being drained.
    /// Ordered before the render signal so the generator's snapshot sees it.
    #[inline]
    pub fn publish_cursor(&self, kernel: u32) {
        self.words[SLOT_CURSOR].store(kernel, Ordering::Release);
    }

    #[inline]
    pub fn cursor(&self) -> u32 {
        self.words[SLOT_CURSOR].load(Ordering::Acquire)
    }

    // --- status / counters --------------------------------------------------

    pub fn mark_generator_failed(&self) {
        self.words[SLOT_FLAGS].fetch_or(FLAG_GENERATOR_FAILED, Ordering::Release);
    }

    #[inline]
    pub fn generator_failed(&self) -> bool {
        self.words[SLOT_FLAGS].load(Ordering::Acquire) & FLAG_GENERATOR_FAILED != 0
    }

    #[inline]
    pub fn count_overrun(&self) {
        self.words[SLOT_OVERRUNS].fetch_add(1, Ordering::Relaxed);
    }

    /// Render requests issued since session start.
    pub fn signals(&self) -> u32 {
        self.words[SLOT_SIGNALS].load(Ordering::Relaxed)
    }

    /// Kernel boundaries where the previous request was still outstanding,
    /// i.e. laps where a stale kernel went out audible.
    pub fn overruns(&self) -> u32 {
        self.words[SLOT_OVERRUNS].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn request_lifecycle() {
        let s = SharedState::new(440.0);
        assert_eq!(s.request(), REQUEST_IDLE);
        s.signal_render();
        assert_eq!(s.request(), REQUEST_RENDER);
        assert_eq!(s.signals(), 1);
        s.clear_request();
        assert_eq!(s.request(), REQUEST_IDLE);
    }

    #[test]
    fn clear_does_not_swallow_shutdown() {
        let s = SharedState::new(440.0);
        s.signal_render();
        s.request_shutdown();
        s.clear_request();
        assert_eq!(s.request(), REQUEST_SHUTDOWN);
    }

    #[test]
    fn frequency_bits_roundtrip() {
        let s = SharedState::new(440.0);
        assert_eq!(s.frequency(), 440.0);
        s.set_frequency(123.5);
        assert_eq!(s.frequency(), 123.5);
        s.set_frequency(-10.0);
        assert_eq!(s.frequency(), 0.0);
    }

    #[test]
    fn wait_returns_on_signal() {
        let s = Arc::new(SharedState::new(440.0));
        let waiter = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.wait_for_request())
        };
        thread::sleep(Duration::from_millis(10));
        s.signal_render();
        assert_eq!(waiter.join().unwrap(), REQUEST_RENDER);
    }

    #[test]
    fn shutdown_releases_a_blocked_waiter() {
        let s = Arc::new(SharedState::new(440.0));
        let waiter = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.wait_for_request())
        };
        thread::sleep(Duration::from_millis(10));
        s.request_shutdown();
        assert_eq!(waiter.join().unwrap(), REQUEST_SHUTDOWN);
    }

    #[test]
    fn counters_accumulate() {
        let s = SharedState::new(440.0);
        s.count_overrun();
        s.count_overrun();
        assert_eq!(s.overruns(), 2);
        assert!(!s.generator_failed());
        s.mark_generator_failed();
        assert!(s.generator_failed());
    }
}
