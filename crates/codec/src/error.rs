// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Error types for codec elements.
//!
//! Frame creation, reference counting and the reset protocol cannot fail at
//! runtime. Misuse of those (for example overlapping mutable borrows of the
//! stream state on one thread) is a caller bug and panics. The errors below
//! cover the recoverable surface: state transitions and configuration.

use crate::element_state::{ElementState, StateChange};
use thiserror::Error;

/// Main error type for codec element operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A transition was requested whose source state is not the element's current state.
    ///
    /// Examples:
    /// - `PausedToPlaying` while the element is still `Ready`
    /// - `ReadyToNull` twice in a row
    #[error("Invalid state transition {transition:?} from state {current:?}")]
    InvalidTransition { current: ElementState, transition: StateChange },

    /// The parent element refused or failed a state change.
    #[error("State change failed: {0}")]
    StateChange(String),

    /// Configuration or parameter validation error.
    ///
    /// Examples:
    /// - Malformed element settings
    /// - Unknown settings fields
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using `CodecError`.
pub type Result<T> = std::result::Result<T, CodecError>;

impl From<CodecError> for String {
    fn from(err: CodecError) -> Self {
        err.to_string()
    }
}

// Parent elements commonly report failures as plain text.
impl From<String> for CodecError {
    fn from(s: String) -> Self {
        Self::StateChange(s)
    }
}

impl From<&str> for CodecError {
    fn from(s: &str) -> Self {
        Self::StateChange(s.to_string())
    }
}
