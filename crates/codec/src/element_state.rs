// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Element state machine and lifecycle tracking.
//!
//! ## State Machine
//!
//! Elements move one step at a time between four states:
//!
//! ```text
//!     Null ⇄ Ready ⇄ Paused ⇄ Playing
//! ```
//!
//! Codec elements hook two of the transitions: `ReadyToPaused` (before data
//! starts flowing) and `PausedToReady` (after it stopped). The generic
//! bookkeeping is delegated to a [`ParentElement`].

use crate::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Pipeline lifecycle state of an element.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    /// Initial state; no resources allocated.
    #[default]
    Null,
    /// Resources allocated, no stream yet.
    Ready,
    /// Stream state established, data may be prerolled but the clock is stopped.
    Paused,
    /// Data is flowing.
    Playing,
}

impl ElementState {
    /// Adjacent transitions needed to get from `self` to `target`, in order.
    pub fn transition_to(self, target: Self) -> Vec<StateChange> {
        let mut steps = Vec::new();
        let mut current = self;
        while current != target {
            let next = if current < target { current.up() } else { current.down() };
            // Both are adjacent by construction.
            if let Some(step) = StateChange::from_states(current, next) {
                steps.push(step);
            }
            current = next;
        }
        steps
    }

    const fn up(self) -> Self {
        match self {
            Self::Null => Self::Ready,
            Self::Ready => Self::Paused,
            Self::Paused | Self::Playing => Self::Playing,
        }
    }

    const fn down(self) -> Self {
        match self {
            Self::Playing => Self::Paused,
            Self::Paused => Self::Ready,
            Self::Ready | Self::Null => Self::Null,
        }
    }
}

/// A transition between two adjacent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateChange {
    NullToReady,
    ReadyToPaused,
    PausedToPlaying,
    PlayingToPaused,
    PausedToReady,
    ReadyToNull,
}

impl StateChange {
    /// The transition from `current` to `next`, if they are adjacent.
    pub const fn from_states(current: ElementState, next: ElementState) -> Option<Self> {
        use ElementState::{Null, Paused, Playing, Ready};
        match (current, next) {
            (Null, Ready) => Some(Self::NullToReady),
            (Ready, Paused) => Some(Self::ReadyToPaused),
            (Paused, Playing) => Some(Self::PausedToPlaying),
            (Playing, Paused) => Some(Self::PlayingToPaused),
            (Paused, Ready) => Some(Self::PausedToReady),
            (Ready, Null) => Some(Self::ReadyToNull),
            _ => None,
        }
    }

    pub const fn current(self) -> ElementState {
        match self {
            Self::NullToReady => ElementState::Null,
            Self::ReadyToPaused | Self::ReadyToNull => ElementState::Ready,
            Self::PausedToPlaying | Self::PausedToReady => ElementState::Paused,
            Self::PlayingToPaused => ElementState::Playing,
        }
    }

    pub const fn next(self) -> ElementState {
        match self {
            Self::ReadyToNull => ElementState::Null,
            Self::NullToReady | Self::PausedToReady => ElementState::Ready,
            Self::ReadyToPaused | Self::PlayingToPaused => ElementState::Paused,
            Self::PausedToPlaying => ElementState::Playing,
        }
    }

    /// Whether the transition moves towards `Playing`.
    pub const fn is_upward(self) -> bool {
        matches!(self, Self::NullToReady | Self::ReadyToPaused | Self::PausedToPlaying)
    }
}

/// Outcome of a successful state change.
///
/// [`ElementStateTracker`] always settles synchronously and returns `Success`.
/// Other [`ParentElement`] implementations may report `Async` or `NoPreroll`;
/// the codec passes them through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChangeSuccess {
    /// The element is now in the target state.
    Success,
    /// The element will reach the target state later (e.g. after preroll).
    Async,
    /// The element reached the target state but cannot produce preroll data.
    NoPreroll,
}

/// Generic state-change handling a codec element delegates to.
pub trait ParentElement {
    /// Perform the element-agnostic part of `transition`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is refused.
    fn change_state(&mut self, transition: StateChange) -> Result<StateChangeSuccess>;

    /// The state the element has settled in.
    fn current_state(&self) -> ElementState;
}

/// A state update reported by an element.
/// These updates are used for monitoring and debugging.
#[derive(Debug, Clone)]
pub struct ElementStateUpdate {
    /// Name of the element reporting the state
    pub element: String,
    /// The state the element settled in
    pub state: ElementState,
    /// When this state change occurred
    pub timestamp: SystemTime,
}

impl ElementStateUpdate {
    /// Creates a new state update with the current timestamp.
    #[inline]
    pub fn new(element: String, state: ElementState) -> Self {
        Self { element, state, timestamp: SystemTime::now() }
    }
}

/// Default [`ParentElement`]: tracks the current state and reports changes.
#[derive(Debug)]
pub struct ElementStateTracker {
    name: String,
    current: ElementState,
    state_tx: Option<tokio::sync::mpsc::Sender<ElementStateUpdate>>,
}

impl ElementStateTracker {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), current: ElementState::Null, state_tx: None }
    }

    /// Report every settled state on `state_tx`.
    #[must_use]
    pub fn with_updates(mut self, state_tx: tokio::sync::mpsc::Sender<ElementStateUpdate>) -> Self {
        self.state_tx = Some(state_tx);
        self
    }

    pub const fn current(&self) -> ElementState {
        self.current
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ParentElement for ElementStateTracker {
    fn change_state(&mut self, transition: StateChange) -> Result<StateChangeSuccess> {
        if transition.current() != self.current {
            return Err(CodecError::InvalidTransition { current: self.current, transition });
        }

        self.current = transition.next();
        tracing::debug!("{}: {:?} -> {:?}", self.name, transition.current(), self.current);

        if let Some(state_tx) = &self.state_tx {
            state_helpers::emit_state(state_tx, &self.name, self.current);
        }
        Ok(StateChangeSuccess::Success)
    }

    fn current_state(&self) -> ElementState {
        self.current
    }
}

/// Helper functions for emitting element state updates.
pub mod state_helpers {
    use super::{ElementState, ElementStateUpdate};
    use tokio::sync::mpsc;

    /// Emits a state update to the provided channel.
    /// Failures are silently ignored as state tracking is best-effort.
    #[inline]
    pub fn emit_state(
        state_tx: &mpsc::Sender<ElementStateUpdate>,
        element: &str,
        state: ElementState,
    ) {
        let _ = state_tx.try_send(ElementStateUpdate::new(element.to_string(), state));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transitions_between_adjacent_states() {
        assert_eq!(
            StateChange::from_states(ElementState::Ready, ElementState::Paused),
            Some(StateChange::ReadyToPaused)
        );
        assert_eq!(StateChange::from_states(ElementState::Null, ElementState::Paused), None);
        assert_eq!(StateChange::from_states(ElementState::Ready, ElementState::Ready), None);

        for step in [
            StateChange::NullToReady,
            StateChange::ReadyToPaused,
            StateChange::PausedToPlaying,
            StateChange::PlayingToPaused,
            StateChange::PausedToReady,
            StateChange::ReadyToNull,
        ] {
            assert_eq!(StateChange::from_states(step.current(), step.next()), Some(step));
            assert_eq!(step.is_upward(), step.current() < step.next());
        }
    }

    #[test]
    fn transition_path() {
        assert_eq!(
            ElementState::Null.transition_to(ElementState::Playing),
            [StateChange::NullToReady, StateChange::ReadyToPaused, StateChange::PausedToPlaying]
        );
        assert_eq!(
            ElementState::Playing.transition_to(ElementState::Ready),
            [StateChange::PlayingToPaused, StateChange::PausedToReady]
        );
        assert!(ElementState::Paused.transition_to(ElementState::Paused).is_empty());
    }

    #[test]
    fn tracker_rejects_out_of_order_transitions() {
        let mut tracker = ElementStateTracker::new("dec0");
        let err = tracker.change_state(StateChange::ReadyToPaused).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidTransition { current: ElementState::Null, .. }
        ));

        tracker.change_state(StateChange::NullToReady).unwrap();
        assert_eq!(tracker.current(), ElementState::Ready);
    }

    #[tokio::test]
    async fn tracker_reports_updates() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let mut tracker = ElementStateTracker::new("enc0").with_updates(tx);

        tracker.change_state(StateChange::NullToReady).unwrap();
        tracker.change_state(StateChange::ReadyToPaused).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.element, "enc0");
        assert_eq!(first.state, ElementState::Ready);
        assert_eq!(rx.recv().await.unwrap().state, ElementState::Paused);
    }
}
