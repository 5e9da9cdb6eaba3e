// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Serialized stream events held back with a frame.
//!
//! Events that arrive on the sink pad between two pictures are attached to the
//! next frame so they can be pushed downstream in order with its output. A
//! frame owns its events and releases them when it is destroyed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An event attached to a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameEvent {
    /// Stream metadata (title, encoder, bitrate...).
    Tag { tags: serde_json::Map<String, serde_json::Value> },
    /// A new playback segment starts at `start`.
    Segment { rate: f64, start: Duration, stop: Option<Duration> },
    /// Application-defined event travelling with the data.
    Custom { name: String, data: Option<serde_json::Value> },
    /// Downstream should produce a keyframe as soon as possible.
    ForceKeyUnit { all_headers: bool },
}

impl FrameEvent {
    /// Short name used for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tag { .. } => "tag",
            Self::Segment { .. } => "segment",
            Self::Custom { .. } => "custom",
            Self::ForceKeyUnit { .. } => "force-key-unit",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = FrameEvent::ForceKeyUnit { all_headers: true };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "force_key_unit");
        assert_eq!(event.name(), "force-key-unit");
    }
}
