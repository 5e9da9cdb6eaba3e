// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! StreamKit Codec - Frame lifecycle and stream state for video codec elements.
//!
//! A codec element sits between a sink pad (input) and a src pad (output) and
//! keeps track of every frame it has in flight. This crate provides that core:
//!
//! ## Modules
//!
//! - [`frame`]: Reference-counted frames (`VideoFrame`) and their coder hook
//! - [`buffer`]: Payload buffers attached to frames
//! - [`event`]: Serialized events held back with a frame
//! - [`stream_lock`]: The reentrant stream lock guarding shared state
//! - [`codec_state`]: Negotiated format, counters and the live-frame list
//! - [`codec`]: `BaseVideoCodec`: frame creation, reset, state transitions
//! - [`element_state`]: Element state machine and the delegated parent
//! - [`config`]: Global sizing and per-element settings
//! - [`error`]: Error types
//!
//! ## Quick Start
//!
//! ```ignore
//! use streamkit_codec::{BaseVideoCodec, ElementState};
//!
//! let codec = BaseVideoCodec::with_name("vp8dec0");
//! let mut parent = codec.state_tracker(None);
//! codec.set_state(ElementState::Playing, &mut parent)?;
//!
//! // Upstream data arrived: track a frame for it.
//! let frame = codec.new_frame();
//! frame.set_sink_buffer(buffer);
//! codec.stream_lock().push_frame(frame.clone());
//!
//! // Output is ready: hand the frame back.
//! let frame = codec.stream_lock().remove_frame(frame.system_frame_number());
//! ```

pub mod buffer;
pub mod codec;
pub mod codec_state;
pub mod config;
pub mod element_state;
pub mod error;
pub mod event;
pub mod frame;
pub mod stream_lock;

// Error handling
pub use error::{CodecError, Result};

// Frames
pub use buffer::Buffer;
pub use event::FrameEvent;
pub use frame::{CoderHook, FrameData, FrameEvents, VideoFrame};

// Stream state
pub use codec_state::{
    Caps, CodecState, FrameList, Segment, SegmentFormat, VideoFormat, VideoState,
};
pub use stream_lock::{StreamLock, StreamLockGuard};

// Element
pub use codec::{BaseVideoCodec, SINK_PAD_NAME, SRC_PAD_NAME};
pub use element_state::{
    state_helpers, ElementState, ElementStateTracker, ElementStateUpdate, ParentElement,
    StateChange, StateChangeSuccess,
};

// Configuration
pub use config::{
    get_frame_list_capacity, get_state_channel_capacity, set_codec_buffer_config,
    state_update_channel, CodecBufferConfig, CodecSettings,
};
