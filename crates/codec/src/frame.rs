// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Reference-counted video frames.
//!
//! A [`VideoFrame`] is the unit of work tracked by a codec element: the metadata
//! of one picture in flight plus the buffers and events attached to it.
//!
//! - cloning a handle takes a reference (atomic increment)
//! - dropping a handle releases it (atomic decrement)
//! - the thread that drops the last handle releases the frame's resources,
//!   in order: sink buffer, src buffer, attached events, coder hook
//!
//! Refcounting never touches the element's stream lock. Frame contents sit behind
//! a small per-frame mutex so any holder can update them.

use crate::buffer::Buffer;
use crate::event::FrameEvent;
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Events attached to a frame; most frames carry none or one.
pub type FrameEvents = SmallVec<[FrameEvent; 2]>;

type DestroyNotify = Box<dyn FnOnce(Box<dyn Any + Send>) + Send>;

/// Private per-frame data attached by a codec implementation.
///
/// Holds opaque data and an optional destroy callback. The callback receives the
/// data exactly once when the hook is dropped, which happens when the owning frame
/// is destroyed or the hook is replaced. It may run on any thread.
pub struct CoderHook {
    data: Option<Box<dyn Any + Send>>,
    destroy: Option<DestroyNotify>,
}

impl CoderHook {
    /// Attach `data` and call `destroy(data)` when the hook is released.
    pub fn new<T, F>(data: T, destroy: F) -> Self
    where
        T: Any + Send,
        F: FnOnce(T) + Send + 'static,
    {
        let destroy: DestroyNotify = Box::new(move |any: Box<dyn Any + Send>| {
            if let Ok(data) = any.downcast::<T>() {
                destroy(*data);
            }
        });
        Self { data: Some(Box::new(data)), destroy: Some(destroy) }
    }

    /// Attach `data` without a destroy callback; it is simply dropped on release.
    pub fn from_data<T: Any + Send>(data: T) -> Self {
        Self { data: Some(Box::new(data)), destroy: None }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.as_ref().and_then(|d| d.downcast_ref::<T>())
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data.as_mut().and_then(|d| d.downcast_mut::<T>())
    }

    /// Detach the data without running the destroy callback.
    ///
    /// Returns the hook unchanged if the data is not a `T`.
    pub fn into_data<T: Any>(mut self) -> Result<T, Self> {
        let Some(data) = self.data.take() else { return Err(self) };
        match data.downcast::<T>() {
            Ok(data) => {
                self.destroy = None;
                Ok(*data)
            },
            Err(data) => {
                self.data = Some(data);
                Err(self)
            },
        }
    }
}

impl Drop for CoderHook {
    fn drop(&mut self) {
        if let (Some(data), Some(destroy)) = (self.data.take(), self.destroy.take()) {
            destroy(data);
        }
    }
}

impl std::fmt::Debug for CoderHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoderHook")
            .field("has_data", &self.data.is_some())
            .field("has_destroy", &self.destroy.is_some())
            .finish()
    }
}

/// Mutable contents of a frame.
///
/// Reached through [`VideoFrame::lock`]. Everything defaults to empty/unset.
#[derive(Debug, Default)]
pub struct FrameData {
    pub decode_timestamp: Option<Duration>,
    pub presentation_timestamp: Option<Duration>,
    pub presentation_duration: Option<Duration>,

    pub decode_frame_number: u64,
    pub presentation_frame_number: u64,

    /// Frames since the last sync point (0 for a sync point itself).
    pub distance_from_sync: u32,
    pub is_sync_point: bool,
    pub is_eos: bool,

    pub field_index: u32,
    pub n_fields: u32,

    /// Running time by which the frame should be processed.
    pub deadline: Option<Duration>,
    pub force_keyframe: bool,
    pub force_keyframe_headers: bool,

    /// Input buffer received on the sink pad.
    pub sink_buffer: Option<Buffer>,
    /// Output buffer to push on the src pad.
    pub src_buffer: Option<Buffer>,
    /// Events to push downstream together with this frame.
    pub events: FrameEvents,
    pub coder_hook: Option<CoderHook>,
}

struct FrameInner {
    system_frame_number: u64,
    data: Mutex<FrameData>,
}

impl Drop for FrameInner {
    fn drop(&mut self) {
        let data = self.data.get_mut();
        tracing::trace!(
            "Releasing frame {} ({} events)",
            self.system_frame_number,
            data.events.len()
        );

        drop(data.sink_buffer.take());
        drop(data.src_buffer.take());
        data.events.clear();
        drop(data.coder_hook.take());
    }
}

/// Shared handle to a frame in flight.
///
/// `Clone` takes a reference, dropping releases it. Handles are `Send + Sync`.
#[derive(Clone)]
pub struct VideoFrame {
    inner: Arc<FrameInner>,
}

impl VideoFrame {
    pub(crate) fn new(system_frame_number: u64) -> Self {
        Self {
            inner: Arc::new(FrameInner {
                system_frame_number,
                data: Mutex::new(FrameData::default()),
            }),
        }
    }

    /// Number assigned by the element at creation. Unique for the element's lifetime.
    #[inline]
    pub fn system_frame_number(&self) -> u64 {
        self.inner.system_frame_number
    }

    /// Current number of live handles.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Take another reference. Same as `clone`.
    #[inline]
    #[must_use]
    pub fn ref_frame(&self) -> Self {
        self.clone()
    }

    /// Release this reference.
    ///
    /// Returns `true` if this was the last reference and the frame was destroyed.
    pub fn unref(self) -> bool {
        Arc::into_inner(self.inner).is_some()
    }

    /// Whether two handles point at the same frame.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Lock the frame contents.
    ///
    /// This is a per-frame lock, independent of the element's stream lock.
    /// Keep it short; don't hold it while acquiring the stream lock.
    pub fn lock(&self) -> MutexGuard<'_, FrameData> {
        self.inner.data.lock()
    }

    pub fn set_sink_buffer(&self, buffer: Buffer) -> Option<Buffer> {
        self.lock().sink_buffer.replace(buffer)
    }

    pub fn sink_buffer(&self) -> Option<Buffer> {
        self.lock().sink_buffer.clone()
    }

    pub fn set_src_buffer(&self, buffer: Buffer) -> Option<Buffer> {
        self.lock().src_buffer.replace(buffer)
    }

    pub fn take_src_buffer(&self) -> Option<Buffer> {
        self.lock().src_buffer.take()
    }

    pub fn push_event(&self, event: FrameEvent) {
        self.lock().events.push(event);
    }

    /// Detach all events, in the order they were attached.
    pub fn take_events(&self) -> FrameEvents {
        std::mem::take(&mut self.lock().events)
    }

    /// Attach private data with a destroy callback, releasing any previous hook.
    pub fn set_coder_hook<T, F>(&self, data: T, destroy: F)
    where
        T: Any + Send,
        F: FnOnce(T) + Send + 'static,
    {
        self.replace_coder_hook(CoderHook::new(data, destroy));
    }

    /// Attach private data without a destroy callback, releasing any previous hook.
    pub fn set_coder_hook_data<T: Any + Send>(&self, data: T) {
        self.replace_coder_hook(CoderHook::from_data(data));
    }

    fn replace_coder_hook(&self, hook: CoderHook) {
        // The old hook is released after the frame lock is dropped.
        let previous = { self.lock().coder_hook.replace(hook) };
        drop(previous);
    }

    /// Run `f` on the hook data if it is present and a `T`.
    pub fn with_coder_hook<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut data = self.lock();
        data.coder_hook.as_mut().and_then(CoderHook::downcast_mut::<T>).map(f)
    }

    /// Detach the hook data without running its destroy callback.
    pub fn take_coder_hook<T: Any>(&self) -> Option<T> {
        let mut data = self.lock();
        let hook = data.coder_hook.take()?;
        match hook.into_data::<T>() {
            Ok(value) => Some(value),
            Err(hook) => {
                data.coder_hook = Some(hook);
                None
            },
        }
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("system_frame_number", &self.system_frame_number())
            .field("ref_count", &self.ref_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook(frame: &VideoFrame) -> Arc<AtomicUsize> {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        frame.set_coder_hook(7u32, move |value| {
            assert_eq!(value, 7);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        released
    }

    #[test]
    fn new_frame_is_empty() {
        let frame = VideoFrame::new(3);
        assert_eq!(frame.system_frame_number(), 3);
        assert_eq!(frame.ref_count(), 1);

        let data = frame.lock();
        assert!(data.sink_buffer.is_none());
        assert!(data.src_buffer.is_none());
        assert!(data.events.is_empty());
        assert!(data.coder_hook.is_none());
        assert!(!data.is_sync_point);
    }

    #[test]
    fn destroyed_once_on_last_release() {
        let frame = VideoFrame::new(0);
        let released = counting_hook(&frame);

        let second = frame.ref_frame();
        assert_eq!(frame.ref_count(), 2);
        assert!(second.ptr_eq(&frame));

        assert!(!second.unref());
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(frame.ref_count(), 1);

        assert!(frame.unref());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_drops_buffers_and_events() {
        let frame = VideoFrame::new(0);
        let payload = bytes::Bytes::from(vec![0u8; 64]);
        frame.set_sink_buffer(Buffer::new(payload.clone()));
        frame.set_src_buffer(Buffer::from(vec![1u8, 2]));
        frame.push_event(FrameEvent::ForceKeyUnit { all_headers: false });

        // Our handle plus the frame's.
        assert!(!payload.is_unique());
        drop(frame);
        assert!(payload.is_unique());
    }

    #[test]
    fn hook_without_destroy_drops_data() {
        let frame = VideoFrame::new(0);
        frame.set_coder_hook_data(String::from("private"));
        assert_eq!(frame.with_coder_hook(|s: &mut String| s.len()), Some(7));
        assert!(frame.unref());
    }

    #[test]
    fn replacing_hook_releases_previous() {
        let frame = VideoFrame::new(0);
        let first = counting_hook(&frame);
        let second = counting_hook(&frame);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        drop(frame);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replaced_hook_destroy_may_lock_its_frame() {
        let frame = VideoFrame::new(0);
        let handle = frame.clone();
        frame.set_coder_hook((), move |()| {
            handle.lock().is_sync_point = true;
        });

        // Would deadlock if the old hook were released under the frame lock.
        frame.set_coder_hook_data(1u8);
        assert!(frame.lock().is_sync_point);
        assert_eq!(frame.ref_count(), 1);
    }

    #[test]
    fn take_coder_hook_skips_destroy() {
        let frame = VideoFrame::new(0);
        let released = counting_hook(&frame);

        assert_eq!(frame.take_coder_hook::<String>(), None);
        assert_eq!(frame.take_coder_hook::<u32>(), Some(7));
        drop(frame);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn events_keep_attach_order() {
        let frame = VideoFrame::new(0);
        frame.push_event(FrameEvent::Custom { name: "a".into(), data: None });
        frame.push_event(FrameEvent::Custom { name: "b".into(), data: None });

        let names: Vec<_> = frame
            .take_events()
            .into_iter()
            .map(|e| match e {
                FrameEvent::Custom { name, .. } => name,
                other => other.name().to_string(),
            })
            .collect();
        assert_eq!(names, ["a", "b"]);
        assert!(frame.lock().events.is_empty());
    }

    #[test]
    fn concurrent_ref_unref_releases_once() {
        let frame = VideoFrame::new(0);
        let released = counting_hook(&frame);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let frame = frame.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let extra = frame.ref_frame();
                        drop(extra);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(frame.ref_count(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(frame);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
