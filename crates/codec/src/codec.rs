// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Base for video encoder and decoder elements.
//!
//! [`BaseVideoCodec`] owns the stream lock and the state behind it, hands out
//! numbered frames, and resets the stream state when the element enters or
//! leaves `Paused`. Pads, negotiation and the codec itself belong to the
//! surrounding element.
//!
//! ```ignore
//! let codec = BaseVideoCodec::with_name("h264dec0");
//! let mut parent = codec.state_tracker(None);
//! codec.set_state(ElementState::Paused, &mut parent)?;
//!
//! let frame = codec.new_frame();
//! frame.set_sink_buffer(buffer);
//! codec.stream_lock().push_frame(frame);
//! ```

use crate::codec_state::CodecState;
use crate::config::{get_frame_list_capacity, CodecSettings};
use crate::element_state::{
    ElementState, ElementStateTracker, ElementStateUpdate, ParentElement, StateChange,
    StateChangeSuccess,
};
use crate::error::Result;
use crate::frame::VideoFrame;
use crate::stream_lock::{StreamLock, StreamLockGuard};
use tokio::sync::mpsc;

/// Name of the element's input pad.
pub const SINK_PAD_NAME: &str = "sink";
/// Name of the element's output pad.
pub const SRC_PAD_NAME: &str = "src";

/// Frame and stream-state core shared by video codec elements.
pub struct BaseVideoCodec {
    settings: CodecSettings,
    stream_lock: StreamLock,
}

impl BaseVideoCodec {
    pub fn new(settings: CodecSettings) -> Self {
        let state = CodecState::with_frame_capacity(get_frame_list_capacity());
        tracing::debug!("{}: created", settings.name);
        Self { settings, stream_lock: StreamLock::new(state) }
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(CodecSettings::named(name))
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub const fn settings(&self) -> &CodecSettings {
        &self.settings
    }

    pub const fn sink_pad_name(&self) -> &'static str {
        SINK_PAD_NAME
    }

    pub const fn src_pad_name(&self) -> &'static str {
        SRC_PAD_NAME
    }

    /// Default parent for [`Self::change_state`].
    ///
    /// `state_tx` is only used when the settings enable state updates.
    pub fn state_tracker(
        &self,
        state_tx: Option<mpsc::Sender<ElementStateUpdate>>,
    ) -> ElementStateTracker {
        let tracker = ElementStateTracker::new(self.name());
        match state_tx {
            Some(tx) if self.settings.emit_state_updates => tracker.with_updates(tx),
            _ => tracker,
        }
    }

    /// Take the stream lock.
    ///
    /// Reentrant: the current thread may already hold it.
    pub fn stream_lock(&self) -> StreamLockGuard<'_> {
        self.stream_lock.lock()
    }

    /// Create a blank frame carrying the next frame number.
    ///
    /// The lock is only held while the number is issued. The returned reference
    /// belongs to the caller; the frame is not added to the live-frame list.
    pub fn new_frame(&self) -> VideoFrame {
        let system_frame_number = self.stream_lock.lock().take_frame_number();
        tracing::trace!("{}: created new frame (sfn:{})", self.name(), system_frame_number);
        VideoFrame::new(system_frame_number)
    }

    /// Drop the element's stream state.
    ///
    /// Releases the element's reference on every live frame, zeroes the byte and
    /// time counters and forgets the negotiated format, caps and codec data.
    /// The frame-number counter keeps counting. Idempotent.
    ///
    /// May be called while the current thread holds the stream lock. If it is
    /// also inside a [`StreamLockGuard::with_state`] closure, that closure keeps
    /// seeing the old state; the clear is applied as soon as it returns, before
    /// any other thread can take the lock.
    pub fn reset(&self) {
        let drained = self.stream_lock.lock().clear_state();

        match drained {
            Some(frames) => {
                tracing::debug!("{}: reset, releasing {} frames", self.name(), frames.len());
                // Frames still held elsewhere survive; the rest are destroyed
                // here, after the lock is released.
                drop(frames);
            },
            None => {
                tracing::debug!(
                    "{}: reset deferred until the stream state is released",
                    self.name()
                );
            },
        }
    }

    /// Handle one state transition.
    ///
    /// Resets before `ReadyToPaused` is delegated and after `PausedToReady` was
    /// delegated, whatever the parent returned. Other transitions go straight to
    /// `parent`, whose result is passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns the parent's error.
    pub fn change_state<P>(
        &self,
        transition: StateChange,
        parent: &mut P,
    ) -> Result<StateChangeSuccess>
    where
        P: ParentElement + ?Sized,
    {
        if transition == StateChange::ReadyToPaused {
            self.reset();
        }

        let ret = parent.change_state(transition);

        if transition == StateChange::PausedToReady {
            self.reset();
        }

        ret
    }

    /// Walk the element from the parent's current state to `target`.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first failing transition.
    pub fn set_state<P>(&self, target: ElementState, parent: &mut P) -> Result<StateChangeSuccess>
    where
        P: ParentElement + ?Sized,
    {
        let mut ret = StateChangeSuccess::Success;
        for transition in parent.current_state().transition_to(target) {
            ret = self.change_state(transition, &mut *parent)?;
        }
        Ok(ret)
    }
}

impl Default for BaseVideoCodec {
    fn default() -> Self {
        Self::new(CodecSettings::default())
    }
}

impl std::fmt::Debug for BaseVideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseVideoCodec")
            .field("name", &self.settings.name)
            .field("stream_lock", &self.stream_lock)
            .finish()
    }
}
