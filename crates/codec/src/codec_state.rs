// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared stream state of a codec element.
//!
//! [`CodecState`] is only reachable through a held stream lock
//! (see [`crate::stream_lock::StreamLockGuard`]). Nothing in this module locks.

use crate::buffer::Buffer;
use crate::frame::VideoFrame;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Raw picture format negotiated on the element's pads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoFormat {
    #[default]
    Unknown,
    I420,
    Yv12,
    Nv12,
    Yuy2,
    Uyvy,
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Gray8,
}

/// Capability descriptor: a media type plus named fields.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Caps {
    pub media_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Caps {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self { media_type: media_type.into(), fields: BTreeMap::new() }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Negotiated stream description.
///
/// `Default` is the unnegotiated state: format `Unknown`, no caps, all zero.
#[derive(Debug, Default, Clone)]
pub struct VideoState {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub fps_n: u32,
    pub fps_d: u32,
    pub par_n: u32,
    pub par_d: u32,

    pub have_interlaced: bool,
    pub interlaced: bool,
    pub top_field_first: bool,

    pub clean_width: u32,
    pub clean_height: u32,
    pub clean_offset_left: u32,
    pub clean_offset_top: u32,

    pub bytes_per_picture: usize,

    /// Out-of-band codec configuration (e.g. SPS/PPS, sequence header).
    pub codec_data: Option<Buffer>,
    pub caps: Option<Caps>,
}

impl VideoState {
    pub const fn is_negotiated(&self) -> bool {
        !matches!(self.format, VideoFormat::Unknown) || self.caps.is_some()
    }
}

/// Format a [`Segment`] is expressed in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentFormat {
    #[default]
    Time,
    Bytes,
}

/// Playback segment configured on the sink side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub format: SegmentFormat,
    pub rate: f64,
    pub start: Duration,
    pub stop: Option<Duration>,
    pub position: Duration,
}

impl Segment {
    pub const fn new(format: SegmentFormat) -> Self {
        Self { format, rate: 1.0, start: Duration::ZERO, stop: None, position: Duration::ZERO }
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::new(SegmentFormat::Time)
    }
}

/// Frames owned by an element, in arrival order.
///
/// Frames dropped by [`FrameList::clear`] or [`FrameList::retain`] are parked
/// rather than released on the spot. The stream lock guard releases them once
/// no borrow of the state is left, so a coder hook's destroy callback may read
/// the stream state.
#[derive(Debug, Default)]
pub struct FrameList {
    live: VecDeque<VideoFrame>,
    released: Vec<VideoFrame>,
}

impl FrameList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { live: VecDeque::with_capacity(capacity), released: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.live.capacity()
    }

    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, VideoFrame> {
        self.live.iter()
    }

    pub fn front(&self) -> Option<&VideoFrame> {
        self.live.front()
    }

    pub fn back(&self) -> Option<&VideoFrame> {
        self.live.back()
    }

    pub fn find(&self, system_frame_number: u64) -> Option<&VideoFrame> {
        self.live.iter().find(|f| f.system_frame_number() == system_frame_number)
    }

    pub fn push_back(&mut self, frame: VideoFrame) {
        self.live.push_back(frame);
    }

    /// Hand the oldest frame's reference to the caller.
    pub fn pop_front(&mut self) -> Option<VideoFrame> {
        self.live.pop_front()
    }

    /// Hand a frame's reference to the caller.
    pub fn remove(&mut self, system_frame_number: u64) -> Option<VideoFrame> {
        let idx = self.live.iter().position(|f| f.system_frame_number() == system_frame_number)?;
        self.live.remove(idx)
    }

    pub fn clear(&mut self) {
        self.released.extend(self.live.drain(..));
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&VideoFrame) -> bool) {
        let mut idx = 0;
        while idx < self.live.len() {
            if keep(&self.live[idx]) {
                idx += 1;
            } else if let Some(frame) = self.live.remove(idx) {
                self.released.push(frame);
            }
        }
    }

    /// Frames dropped from the list and not yet released.
    pub(crate) fn take_released(&mut self) -> Vec<VideoFrame> {
        std::mem::take(&mut self.released)
    }
}

impl<'a> IntoIterator for &'a FrameList {
    type Item = &'a VideoFrame;
    type IntoIter = std::collections::vec_deque::Iter<'a, VideoFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Mutable state shared by everything operating on one element's stream.
#[derive(Debug, Default)]
pub struct CodecState {
    pub video: VideoState,
    /// Bytes consumed since the last reset.
    pub bytes: u64,
    /// Stream time consumed since the last reset.
    pub time: Duration,
    /// Frames owned by the element, in arrival order.
    pub frames: FrameList,
    /// Not touched by [`CodecState::clear`].
    pub segment: Segment,
}

impl CodecState {
    pub fn with_frame_capacity(capacity: usize) -> Self {
        Self { frames: FrameList::with_capacity(capacity), ..Self::default() }
    }

    /// Drain the state back to its unnegotiated form.
    ///
    /// Returns the frames that were live, plus any still parked, so the caller
    /// decides where the references are released.
    pub fn clear(&mut self) -> Vec<VideoFrame> {
        self.frames.clear();
        let frames = self.frames.take_released();

        self.bytes = 0;
        self.time = Duration::ZERO;
        // Drops codec data and caps along with everything else.
        self.video = VideoState::default();

        frames
    }

    pub fn is_clear(&self) -> bool {
        self.frames.is_empty()
            && self.bytes == 0
            && self.time.is_zero()
            && !self.video.is_negotiated()
            && self.video.codec_data.is_none()
    }
}
