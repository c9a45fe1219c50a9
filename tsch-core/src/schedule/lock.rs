/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Recursive schedule lock with deferred radio actions.
//!
//! This is a counter, not a mutex.  The node runs a single thread of control;
//! the only hazard is a structural schedule edit racing the slot operation
//! that is already on air.  Code that edits the schedule holds the lock, and
//! radio on/off requests that arrive meanwhile are queued and replayed, in
//! arrival order, when the outermost holder releases.
//!
//! ```text
//! acquire ─► depth 1 ─► acquire ─► depth 2 ─► release ─► depth 1 ─► release ─► depth 0
//!                         request_radio(Off) queued ──────────────────────────► applied
//! ```
//!
//! The lock is deliberately `!Sync` (interior `Cell`/`RefCell`): sharing it
//! between threads would break the single-context assumption.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

use tracing::{trace, warn};

// ── Radio seam ────────────────────────────────────────────────────────────────

/// A radio power request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioRequest {
    On,
    Off,
}

/// Hardware radio power control, supplied by the platform driver.
///
/// `apply` may call [`ScheduleLock::request_radio`] again; such requests are
/// queued and applied after the current one returns.
pub trait RadioControl {
    fn apply(&mut self, request: RadioRequest);
}

/// Radio that ignores every request (simulation, tests).
#[derive(Debug, Default)]
pub struct NoopRadio;

impl RadioControl for NoopRadio {
    fn apply(&mut self, _request: RadioRequest) {}
}

// ── ScheduleLock ──────────────────────────────────────────────────────────────

/// Recursive critical-section counter guarding the schedule.
pub struct ScheduleLock {
    depth: Cell<u32>,
    pending: RefCell<VecDeque<RadioRequest>>,
    radio: RefCell<Box<dyn RadioControl>>,
}

impl ScheduleLock {
    pub fn new(radio: Box<dyn RadioControl>) -> Self {
        Self {
            depth: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            radio: RefCell::new(radio),
        }
    }

    /// Enter the critical section; the returned guard leaves it on drop.
    pub fn acquire(&self) -> LockGuard<'_> {
        self.acquire_raw();
        LockGuard { lock: self }
    }

    /// Enter the critical section without a guard.
    ///
    /// Must be paired with [`release`](Self::release).
    pub fn acquire_raw(&self) {
        let depth = self.depth.get().saturating_add(1);
        self.depth.set(depth);
        trace!(depth, "schedule lock acquired");
    }

    /// Leave the critical section.  When the depth reaches zero every queued
    /// radio request is applied.
    pub fn release(&self) {
        let depth = self.depth.get();
        if depth == 0 {
            warn!("schedule lock released while not held, ignoring");
            return;
        }
        self.depth.set(depth - 1);
        trace!(depth = depth - 1, "schedule lock released");
        if depth == 1 {
            self.flush_pending();
        }
    }

    pub fn is_locked(&self) -> bool {
        self.depth.get() > 0
    }

    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Number of radio requests waiting for the lock to drop.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Apply a radio request now, or queue it if the lock is held.
    pub fn request_radio(&self, request: RadioRequest) {
        self.pending.borrow_mut().push_back(request);
        if self.is_locked() {
            trace!(?request, depth = self.depth.get(), "radio request deferred");
            return;
        }
        self.flush_pending();
    }

    fn flush_pending(&self) {
        // Already inside `apply`: the running loop below picks the request up
        let Ok(mut radio) = self.radio.try_borrow_mut() else {
            trace!("radio busy, request queued behind the current one");
            return;
        };
        loop {
            // The queue borrow ends with this statement, before `apply` runs
            let next = self.pending.borrow_mut().pop_front();
            let Some(request) = next else {
                break;
            };
            trace!(?request, "applying radio request");
            radio.apply(request);
        }
    }
}

impl Default for ScheduleLock {
    fn default() -> Self {
        Self::new(Box::new(NoopRadio))
    }
}

impl fmt::Debug for ScheduleLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleLock")
            .field("depth", &self.depth.get())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

// ── LockGuard ─────────────────────────────────────────────────────────────────

/// Proof that the schedule lock is held.
///
/// Structural [`ScheduleStore`](super::ScheduleStore) mutators take a
/// `&LockGuard` argument, so an unlocked edit does not compile.
#[must_use = "dropping the guard immediately releases the schedule lock"]
pub struct LockGuard<'a> {
    lock: &'a ScheduleLock,
}

impl LockGuard<'_> {
    pub fn depth(&self) -> u32 {
        self.lock.depth()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("depth", &self.lock.depth())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::OnceCell;
    use std::rc::{Rc, Weak};

    /// Radio that records every applied request.
    #[derive(Clone, Default)]
    struct RecordingRadio(Rc<RefCell<Vec<RadioRequest>>>);

    impl RadioControl for RecordingRadio {
        fn apply(&mut self, request: RadioRequest) {
            self.0.borrow_mut().push(request);
        }
    }

    fn recording_lock() -> (ScheduleLock, Rc<RefCell<Vec<RadioRequest>>>) {
        let radio = RecordingRadio::default();
        let log = radio.0.clone();
        (ScheduleLock::new(Box::new(radio)), log)
    }

    #[test]
    fn request_applies_immediately_when_unlocked() {
        let (lock, log) = recording_lock();
        lock.request_radio(RadioRequest::On);
        assert_eq!(*log.borrow(), vec![RadioRequest::On]);
        assert_eq!(lock.pending(), 0);
    }

    #[test]
    fn request_is_deferred_until_guard_drops() {
        let (lock, log) = recording_lock();
        {
            let _guard = lock.acquire();
            lock.request_radio(RadioRequest::Off);
            lock.request_radio(RadioRequest::On);
            assert!(log.borrow().is_empty());
            assert_eq!(lock.pending(), 2);
        }
        assert_eq!(*log.borrow(), vec![RadioRequest::Off, RadioRequest::On]);
        assert!(!lock.is_locked());
    }

    #[test]
    fn nested_acquire_only_flushes_at_outermost_release() {
        let (lock, log) = recording_lock();
        let outer = lock.acquire();
        {
            let inner = lock.acquire();
            assert_eq!(inner.depth(), 2);
            lock.request_radio(RadioRequest::Off);
        }
        assert_eq!(lock.depth(), 1);
        assert!(log.borrow().is_empty(), "inner release must not flush");
        drop(outer);
        assert_eq!(*log.borrow(), vec![RadioRequest::Off]);
    }

    #[test]
    fn raw_acquire_release_pairs() {
        let (lock, log) = recording_lock();
        lock.acquire_raw();
        lock.request_radio(RadioRequest::On);
        lock.release();
        assert_eq!(*log.borrow(), vec![RadioRequest::On]);
    }

    /// Radio whose driver answers every `Off` with a follow-up `On`
    /// request through the lock.
    struct EchoRadio {
        lock: Rc<OnceCell<Weak<ScheduleLock>>>,
        log: Rc<RefCell<Vec<RadioRequest>>>,
    }

    impl RadioControl for EchoRadio {
        fn apply(&mut self, request: RadioRequest) {
            self.log.borrow_mut().push(request);
            if request == RadioRequest::Off {
                if let Some(lock) = self.lock.get().and_then(Weak::upgrade) {
                    lock.request_radio(RadioRequest::On);
                }
            }
        }
    }

    fn echo_lock() -> (Rc<ScheduleLock>, Rc<RefCell<Vec<RadioRequest>>>) {
        let slot = Rc::new(OnceCell::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let radio = EchoRadio {
            lock: slot.clone(),
            log: log.clone(),
        };
        let lock = Rc::new(ScheduleLock::new(Box::new(radio)));
        slot.set(Rc::downgrade(&lock)).unwrap();
        (lock, log)
    }

    #[test]
    fn driver_may_request_from_inside_apply() {
        let (lock, log) = echo_lock();
        lock.request_radio(RadioRequest::Off);
        assert_eq!(*log.borrow(), vec![RadioRequest::Off, RadioRequest::On]);
        assert_eq!(lock.pending(), 0);
    }

    #[test]
    fn reentrant_request_during_flush_keeps_order() {
        let (lock, log) = echo_lock();
        {
            let _guard = lock.acquire();
            lock.request_radio(RadioRequest::Off);
            lock.request_radio(RadioRequest::Off);
        }
        assert_eq!(
            *log.borrow(),
            vec![
                RadioRequest::Off,
                RadioRequest::Off,
                RadioRequest::On,
                RadioRequest::On
            ]
        );
        assert_eq!(lock.pending(), 0);
    }

    #[test]
    fn release_without_acquire_is_ignored() {
        let lock = ScheduleLock::default();
        lock.release();
        assert_eq!(lock.depth(), 0);
    }
}
