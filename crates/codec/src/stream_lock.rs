// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The element's reentrant stream lock.
//!
//! All shared stream state ([`CodecState`] and the frame-number counter) lives
//! inside the lock, so holding a [`StreamLockGuard`] is the only way to reach it.
//! The lock can be taken again by the thread that already holds it; a transition
//! handler holding the lock may therefore create frames or reset the element.
//!
//! State borrows are scoped to a closure ([`StreamLockGuard::with_state`],
//! [`StreamLockGuard::with_state_mut`]). When the outermost closure returns the
//! guard settles the state:
//! - frames the closure dropped from the live list are released, with no borrow
//!   outstanding, so coder hooks may read the state again
//! - a reset requested while the state was borrowed is applied
//!
//! Asking for mutable access from inside another closure on the same thread is
//! still a bug and panics.

use crate::codec_state::CodecState;
use crate::frame::VideoFrame;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::{Cell, RefCell};
use std::time::Duration;

struct StreamShared {
    // Kept out of the RefCell so frame numbers can be issued while the
    // state is borrowed further up the stack.
    next_frame_number: Cell<u64>,
    reset_pending: Cell<bool>,
    state: RefCell<CodecState>,
}

/// Reentrant lock owning the element's stream state.
pub struct StreamLock {
    inner: ReentrantMutex<StreamShared>,
}

impl StreamLock {
    pub fn new(state: CodecState) -> Self {
        Self {
            inner: ReentrantMutex::new(StreamShared {
                next_frame_number: Cell::new(0),
                reset_pending: Cell::new(false),
                state: RefCell::new(state),
            }),
        }
    }

    /// Block until the lock is held by the current thread.
    pub fn lock(&self) -> StreamLockGuard<'_> {
        StreamLockGuard { guard: self.inner.lock() }
    }

    pub fn try_lock(&self) -> Option<StreamLockGuard<'_>> {
        self.inner.try_lock().map(|guard| StreamLockGuard { guard })
    }

    /// Whether any thread currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl Default for StreamLock {
    fn default() -> Self {
        Self::new(CodecState::default())
    }
}

impl std::fmt::Debug for StreamLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLock").field("locked", &self.is_locked()).finish_non_exhaustive()
    }
}

/// Proof that the stream lock is held by the current thread.
pub struct StreamLockGuard<'a> {
    guard: ReentrantMutexGuard<'a, StreamShared>,
}

impl StreamLockGuard<'_> {
    /// Run `f` with shared access to the stream state.
    pub fn with_state<R>(&self, f: impl FnOnce(&CodecState) -> R) -> R {
        let ret = {
            let state = self.guard.state.borrow();
            f(&state)
        };
        self.settle();
        ret
    }

    /// Run `f` with exclusive access to the stream state.
    ///
    /// # Panics
    ///
    /// If the current thread is already inside a `with_state*` closure.
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut CodecState) -> R) -> R {
        let ret = {
            let mut state = self.guard.state.borrow_mut();
            f(&mut state)
        };
        self.settle();
        ret
    }

    /// Release parked frames and apply a deferred reset.
    ///
    /// Does nothing while a borrow further up the stack is live; that borrow's
    /// own settle picks the work up.
    fn settle(&self) {
        let released = {
            let Ok(mut state) = self.guard.state.try_borrow_mut() else { return };
            if self.guard.reset_pending.take() {
                let frames = state.clear();
                tracing::debug!("deferred reset applied, releasing {} frames", frames.len());
                frames
            } else {
                state.frames.take_released()
            }
        };
        drop(released);
    }

    /// Clear the stream state.
    ///
    /// Returns the drained frames for the caller to release. If the state is
    /// borrowed on this thread the clear is deferred to the end of the outermost
    /// `with_state*` closure, before the lock can change hands, and `None` is
    /// returned.
    pub(crate) fn clear_state(&self) -> Option<Vec<VideoFrame>> {
        if let Ok(mut state) = self.guard.state.try_borrow_mut() {
            self.guard.reset_pending.set(false);
            Some(state.clear())
        } else {
            self.guard.reset_pending.set(true);
            None
        }
    }

    /// Number the next created frame will get.
    pub fn next_frame_number(&self) -> u64 {
        self.guard.next_frame_number.get()
    }

    /// Read and advance the frame-number counter.
    pub(crate) fn take_frame_number(&self) -> u64 {
        let number = self.guard.next_frame_number.get();
        self.guard.next_frame_number.set(number + 1);
        number
    }

    /// Hand a reference to the element; frames are kept in arrival order.
    pub fn push_frame(&self, frame: VideoFrame) {
        self.with_state_mut(|state| state.frames.push_back(frame));
    }

    /// Take a frame out of the live list, giving its reference to the caller.
    pub fn remove_frame(&self, system_frame_number: u64) -> Option<VideoFrame> {
        self.with_state_mut(|state| state.frames.remove(system_frame_number))
    }

    pub fn frame_by_number(&self, system_frame_number: u64) -> Option<VideoFrame> {
        self.with_state(|state| state.frames.find(system_frame_number).cloned())
    }

    pub fn oldest_frame(&self) -> Option<VideoFrame> {
        self.with_state(|state| state.frames.front().cloned())
    }

    pub fn live_frames(&self) -> usize {
        self.with_state(|state| state.frames.len())
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.with_state_mut(|state| state.bytes = state.bytes.saturating_add(bytes));
    }

    pub fn add_time(&self, time: Duration) {
        self.with_state_mut(|state| state.time = state.time.saturating_add(time));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn reentrant_lock_does_not_deadlock() {
        let lock = StreamLock::default();
        let outer = lock.lock();
        let inner = lock.lock();
        assert_eq!(inner.take_frame_number(), 0);
        drop(inner);
        assert_eq!(outer.next_frame_number(), 1);
        assert!(lock.is_locked());
        drop(outer);
        assert!(!lock.is_locked());
    }

    #[test]
    fn frame_numbers_issue_while_state_is_borrowed() {
        let lock = StreamLock::default();
        let guard = lock.lock();
        guard.with_state_mut(|state| {
            state.bytes = 10;

            let nested = lock.lock();
            assert_eq!(nested.take_frame_number(), 0);
            drop(nested);

            state.bytes += 1;
        });
        assert_eq!(guard.with_state(|state| state.bytes), 11);
    }

    #[test]
    fn nested_reads_share_the_state() {
        let lock = StreamLock::default();
        lock.lock().add_bytes(3);

        let guard = lock.lock();
        let total =
            guard.with_state(|outer| outer.bytes + lock.lock().with_state(|inner| inner.bytes));
        assert_eq!(total, 6);
    }

    #[test]
    #[should_panic(expected = "already")]
    fn overlapping_mutable_borrow_panics() {
        let lock = StreamLock::default();
        let guard = lock.lock();
        guard.with_state_mut(|_| {
            let nested = lock.lock();
            nested.with_state_mut(|_| ());
        });
    }

    #[test]
    fn clear_under_a_borrow_is_deferred_to_its_end() {
        let lock = StreamLock::default();
        let guard = lock.lock();
        guard.push_frame(VideoFrame::new(guard.take_frame_number()));
        guard.add_bytes(64);

        let seen = guard.with_state(|state| {
            assert!(lock.lock().clear_state().is_none());
            (state.frames.len(), state.bytes)
        });
        assert_eq!(seen, (1, 64));
        assert!(guard.with_state(CodecState::is_clear));

        // Nothing left pending once applied.
        guard.add_bytes(1);
        assert_eq!(guard.with_state(|state| state.bytes), 1);
    }

    #[test]
    fn hooks_of_cleared_frames_can_read_the_state() {
        let lock = Arc::new(StreamLock::default());
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let guard = lock.lock();
        {
            let frame = VideoFrame::new(guard.take_frame_number());
            let lock = lock.clone();
            let seen = seen.clone();
            frame.set_coder_hook((), move |()| {
                seen.store(lock.lock().live_frames(), Ordering::SeqCst);
            });
            guard.push_frame(frame);
        }
        guard.push_frame(VideoFrame::new(guard.take_frame_number()));

        guard.with_state_mut(|state| {
            state.frames.retain(|f| f.system_frame_number() != 0);
            assert_eq!(seen.load(Ordering::SeqCst), usize::MAX, "released inside the borrow");
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_threads_wait_for_the_lock() {
        let lock = Arc::new(StreamLock::default());
        let guard = lock.lock();

        let contender = {
            let lock = lock.clone();
            std::thread::spawn(move || {
                let guard = lock.lock();
                guard.add_bytes(5);
                guard.with_state(|state| state.bytes)
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(lock.try_lock().is_some(), "owner can re-enter");
        guard.add_bytes(1);
        drop(guard);

        assert_eq!(contender.join().unwrap(), 6);
    }

    #[test]
    fn live_frame_list_helpers() {
        let lock = StreamLock::default();
        let guard = lock.lock();
        for n in 0..3 {
            let number = guard.take_frame_number();
            assert_eq!(number, n);
            guard.push_frame(VideoFrame::new(number));
        }

        assert_eq!(guard.live_frames(), 3);
        assert_eq!(guard.oldest_frame().unwrap().system_frame_number(), 0);

        let frame = guard.remove_frame(1).unwrap();
        assert_eq!(frame.ref_count(), 1);
        assert!(guard.remove_frame(1).is_none());
        assert_eq!(guard.frame_by_number(2).unwrap().ref_count(), 2);
        assert_eq!(guard.live_frames(), 2);
    }
}
