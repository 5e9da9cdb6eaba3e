// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Configuration for codec elements.
//!
//! Two layers:
//! - [`CodecBufferConfig`]: process-wide sizing of internal collections, set once
//!   at startup
//! - [`CodecSettings`]: per-element settings, parsed from JSON parameters
//!
//! ## Usage
//!
//! Server startup:
//! ```ignore
//! use streamkit_codec::config::{set_codec_buffer_config, CodecBufferConfig};
//!
//! set_codec_buffer_config(CodecBufferConfig {
//!     frame_list_capacity: 32,
//!     state_channel_capacity: 8,
//! });
//! ```
//!
//! ## Default Values
//!
//! - `frame_list_capacity`: 16 frames
//! - `state_channel_capacity`: 8 updates

use crate::error::{CodecError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Default number of live frames preallocated per element.
const DEFAULT_FRAME_LIST_CAPACITY: usize = 16;

/// Default capacity for element state update channels.
const DEFAULT_STATE_CHANNEL_CAPACITY: usize = 8;

/// Process-wide sizing for codec element internals.
#[derive(Debug, Clone)]
pub struct CodecBufferConfig {
    /// Initial capacity of each element's live-frame list.
    /// Decoders with deep reorder queues benefit from a larger value.
    pub frame_list_capacity: usize,

    /// Capacity of state update channels created via [`state_update_channel`].
    pub state_channel_capacity: usize,
}

impl Default for CodecBufferConfig {
    fn default() -> Self {
        Self {
            frame_list_capacity: DEFAULT_FRAME_LIST_CAPACITY,
            state_channel_capacity: DEFAULT_STATE_CHANNEL_CAPACITY,
        }
    }
}

static CODEC_BUFFER_CONFIG: OnceLock<CodecBufferConfig> = OnceLock::new();

/// Sets the global codec buffer configuration.
///
/// Call once at startup, before elements are created.
/// Subsequent calls are ignored (the first configuration wins).
pub fn set_codec_buffer_config(config: CodecBufferConfig) {
    if CODEC_BUFFER_CONFIG.set(config).is_err() {
        tracing::warn!("Codec buffer config already set, ignoring new configuration");
    }
}

/// Returns the configured live-frame list capacity (default 16).
#[inline]
pub fn get_frame_list_capacity() -> usize {
    CODEC_BUFFER_CONFIG.get().map_or(DEFAULT_FRAME_LIST_CAPACITY, |c| c.frame_list_capacity)
}

/// Returns the configured state update channel capacity (default 8).
#[inline]
pub fn get_state_channel_capacity() -> usize {
    CODEC_BUFFER_CONFIG.get().map_or(DEFAULT_STATE_CHANNEL_CAPACITY, |c| c.state_channel_capacity)
}

/// Creates a channel for element state updates sized by the global config.
pub fn state_update_channel() -> (
    tokio::sync::mpsc::Sender<crate::element_state::ElementStateUpdate>,
    tokio::sync::mpsc::Receiver<crate::element_state::ElementStateUpdate>,
) {
    tokio::sync::mpsc::channel(get_state_channel_capacity())
}

/// Per-element settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct CodecSettings {
    /// Element name used in logs and state updates.
    pub name: String,
    /// Whether the element's state tracker reports state updates.
    pub emit_state_updates: bool,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self { name: "videocodec0".to_string(), emit_state_updates: false }
    }
}

impl CodecSettings {
    /// Parses settings from optional JSON parameters, using defaults if not provided.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Configuration` if the parameters are present but malformed.
    pub fn from_params(params: Option<&serde_json::Value>) -> Result<Self> {
        params.map_or_else(
            || Ok(Self::default()),
            |p| {
                serde_json::from_value(p.clone()).map_err(|e| {
                    CodecError::Configuration(format!("Failed to parse codec settings: {e}"))
                })
            },
        )
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}
