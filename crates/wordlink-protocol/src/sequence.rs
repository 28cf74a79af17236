// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Keystroke scripts injected into the controller console.
//!
//! A [`KeySequence`] is an ordered, non-empty list of [`KeyAction`]s. The
//! console is single threaded, so actions are replayed strictly in order and
//! each one is followed by its settle delay.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Special keys understood by the keyboard emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Key {
    Enter,
    Esc,
    Tab,
    Space,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

/// Mouse buttons for [`KeyAction::MouseClick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// One atomic UI action.
///
/// Delays are carried in milliseconds on the wire (`delay_after`, `duration`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum KeyAction {
    /// Type literal text into the focused console.
    TypeText {
        text: String,
        #[serde(rename = "delay_after")]
        delay_after_ms: u64,
    },
    /// Press a special key.
    PressKey {
        key: Key,
        #[serde(rename = "delay_after")]
        delay_after_ms: u64,
    },
    /// Pause without input.
    Wait {
        #[serde(rename = "duration")]
        duration_ms: u64,
    },
    /// Click at absolute screen coordinates.
    MouseClick {
        x: i32,
        y: i32,
        #[serde(default)]
        button: MouseButton,
        #[serde(rename = "delay_after")]
        delay_after_ms: u64,
    },
}

impl KeyAction {
    /// Type `text`, then settle for `settle`.
    pub fn type_text(text: impl Into<String>, settle: Duration) -> Self {
        KeyAction::TypeText {
            text: text.into(),
            delay_after_ms: settle.as_millis() as u64,
        }
    }

    /// Press `key`, then settle for `settle`.
    pub fn press(key: Key, settle: Duration) -> Self {
        KeyAction::PressKey {
            key,
            delay_after_ms: settle.as_millis() as u64,
        }
    }

    /// Idle for `duration`.
    pub fn wait(duration: Duration) -> Self {
        KeyAction::Wait {
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Left click at (`x`, `y`), then settle for `settle`.
    pub fn click(x: i32, y: i32, settle: Duration) -> Self {
        KeyAction::MouseClick {
            x,
            y,
            button: MouseButton::Left,
            delay_after_ms: settle.as_millis() as u64,
        }
    }

    /// Time the emulator waits after performing this action.
    pub fn settle_delay(&self) -> Duration {
        let ms = match self {
            KeyAction::TypeText { delay_after_ms, .. }
            | KeyAction::PressKey { delay_after_ms, .. }
            | KeyAction::MouseClick { delay_after_ms, .. } => *delay_after_ms,
            KeyAction::Wait { duration_ms } => *duration_ms,
        };
        Duration::from_millis(ms)
    }

    /// The key pressed by this action, if it is a key press.
    pub fn key(&self) -> Option<Key> {
        match self {
            KeyAction::PressKey { key, .. } => Some(*key),
            _ => None,
        }
    }
}

/// Errors constructing a [`KeySequence`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("key sequence must contain at least one action")]
    Empty,
}

/// Ordered, non-empty keystroke script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<KeyAction>", into = "Vec<KeyAction>")]
pub struct KeySequence(Vec<KeyAction>);

impl KeySequence {
    /// Create a sequence from caller-assembled actions.
    pub fn new(actions: Vec<KeyAction>) -> Result<Self, SequenceError> {
        if actions.is_empty() {
            return Err(SequenceError::Empty);
        }
        Ok(Self(actions))
    }

    /// A sequence whose first action is `first`.
    pub fn starting_with(first: KeyAction) -> Self {
        Self(vec![first])
    }

    /// Append one action.
    pub fn then(mut self, action: KeyAction) -> Self {
        self.0.push(action);
        self
    }

    /// Concatenate sequences, preserving the order of each input.
    ///
    /// Returns `None` when no sequences are given.
    pub fn concat<I>(sequences: I) -> Option<Self>
    where
        I: IntoIterator<Item = KeySequence>,
    {
        let actions: Vec<KeyAction> = sequences.into_iter().flat_map(|s| s.0).collect();
        (!actions.is_empty()).then_some(Self(actions))
    }

    /// Append another sequence to the end of this one.
    pub fn append(mut self, other: KeySequence) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn actions(&self) -> &[KeyAction] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of every action's settle delay.
    pub fn total_settle(&self) -> Duration {
        self.0.iter().map(KeyAction::settle_delay).sum()
    }

    /// The text the console would receive, with keys rendered as `<KEY>`.
    ///
    /// Used for logging; mouse clicks and waits are omitted.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for action in &self.0 {
            match action {
                KeyAction::TypeText { text, .. } => out.push_str(text),
                KeyAction::PressKey { key, .. } => {
                    out.push('<');
                    out.push_str(&format!("{:?}", key).to_uppercase());
                    out.push('>');
                }
                KeyAction::Wait { .. } | KeyAction::MouseClick { .. } => {}
            }
        }
        out
    }
}

impl TryFrom<Vec<KeyAction>> for KeySequence {
    type Error = SequenceError;

    fn try_from(actions: Vec<KeyAction>) -> Result<Self, Self::Error> {
        Self::new(actions)
    }
}

impl From<KeySequence> for Vec<KeyAction> {
    fn from(sequence: KeySequence) -> Self {
        sequence.0
    }
}

impl IntoIterator for KeySequence {
    type Item = KeyAction;
    type IntoIter = std::vec::IntoIter<KeyAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
