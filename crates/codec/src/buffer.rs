// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Payload buffers carried by frames.
//!
//! A [`Buffer`] is a cheap, reference-counted handle over encoded or raw picture
//! bytes. Frames own at most one input (sink) and one output (src) buffer; the
//! handle is released when the frame is destroyed.

use bytes::Bytes;
use std::time::Duration;

/// An immutable data buffer with optional timing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Bytes,
    /// Presentation timestamp of the first byte, if known.
    pub pts: Option<Duration>,
    /// Duration covered by this buffer, if known.
    pub duration: Option<Duration>,
}

impl Buffer {
    pub const fn new(data: Bytes) -> Self {
        Self { data, pts: None, duration: None }
    }

    pub fn from_static(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }

    #[must_use]
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for Buffer {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(Bytes::from(data))
    }
}
