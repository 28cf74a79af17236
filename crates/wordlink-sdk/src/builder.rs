// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compiles register assignments into console keystroke scripts.
//!
//! An assignment is typed as `$WORD[` `<address>` `]:=` `<value>` followed by
//! three ENTER presses. The console needs the final ENTER to settle longer
//! before it commits, so its delay is always strictly greater than the
//! intermediate ones.

use std::time::Duration;

use tracing::warn;
use wordlink_protocol::{Key, KeyAction, KeySequence, SequenceError};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::variables::VariableIndex;

/// Number of ENTER presses that close an assignment.
pub const CONFIRMATION_PRESSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySequenceBuilder {
    key_settle: Duration,
    confirm_settle: Duration,
}

impl KeySequenceBuilder {
    /// Builder with the given settle delays.
    ///
    /// A confirmation delay not longer than the key delay is raised to one
    /// millisecond above it.
    pub fn new(key_settle: Duration, confirm_settle: Duration) -> Self {
        let floor = key_settle + Duration::from_millis(1);
        let confirm_settle = if confirm_settle < floor {
            warn!(
                key_settle_ms = key_settle.as_millis() as u64,
                confirm_settle_ms = confirm_settle.as_millis() as u64,
                "confirmation settle must exceed key settle, raising it"
            );
            floor
        } else {
            confirm_settle
        };
        Self {
            key_settle,
            confirm_settle,
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.key_settle(), config.confirm_settle())
    }

    pub fn key_settle(&self) -> Duration {
        self.key_settle
    }

    pub fn confirm_settle(&self) -> Duration {
        self.confirm_settle
    }

    /// `$WORD[address]:=value` followed by the confirmation presses.
    pub fn build_assignment(&self, address: u32, value: &str) -> KeySequence {
        let mut sequence = KeySequence::starting_with(self.text("$WORD["))
            .then(self.text(&address.to_string()))
            .then(self.text("]:="))
            .then(self.text(value));
        for settle in self.confirmation_delays() {
            sequence = sequence.then(KeyAction::press(Key::Enter, settle));
        }
        sequence
    }

    /// Resolve and validate `name`, then compile the assignment.
    pub fn assign(&self, index: &VariableIndex, name: &str, value: &str) -> Result<KeySequence> {
        let variable = index.resolve(name)?;
        variable.validate(value)?;
        Ok(self.build_assignment(variable.address, value))
    }

    /// Pass a caller-assembled script through unchanged.
    pub fn build_literal(&self, actions: Vec<KeyAction>) -> Result<KeySequence> {
        Ok(KeySequence::new(actions)?)
    }

    /// Join sequences in order.
    pub fn concat<I>(&self, sequences: I) -> Result<KeySequence>
    where
        I: IntoIterator<Item = KeySequence>,
    {
        Ok(KeySequence::concat(sequences).ok_or(SequenceError::Empty)?)
    }

    /// Type `text` with the intermediate settle.
    pub fn text(&self, text: &str) -> KeyAction {
        KeyAction::type_text(text, self.key_settle)
    }

    /// Press `key` with the intermediate settle.
    pub fn key(&self, key: Key) -> KeyAction {
        KeyAction::press(key, self.key_settle)
    }

    /// Press `key` with the confirmation settle.
    pub fn confirm(&self, key: Key) -> KeyAction {
        KeyAction::press(key, self.confirm_settle)
    }

    fn confirmation_delays(&self) -> [Duration; CONFIRMATION_PRESSES] {
        [self.key_settle, self.key_settle, self.confirm_settle]
    }
}

impl Default for KeySequenceBuilder {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}
