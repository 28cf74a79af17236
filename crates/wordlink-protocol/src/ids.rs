// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Correlation identifiers echoed back by the controller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of the correlation identifier space. Valid identifiers are `0..CORRELATION_ID_SPACE`.
pub const CORRELATION_ID_SPACE: u16 = 9999;

/// Small integer tag written into the controller's correlation register and
/// echoed back in front of each reply it writes to shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct CorrelationId(u16);

impl CorrelationId {
    /// Create an identifier, returning `None` if the value is outside `0..9999`.
    pub fn new(value: u16) -> Option<Self> {
        (value < CORRELATION_ID_SPACE).then_some(Self(value))
    }

    /// Fold an arbitrary value into the identifier space.
    pub fn fold(value: u64) -> Self {
        Self((value % u64::from(CORRELATION_ID_SPACE)) as u16)
    }

    /// The raw numeric value.
    pub fn get(self) -> u16 {
        self.0
    }

    /// The identifier the controller uses for its next reply.
    ///
    /// After writing a reply the controller increments its register, so a
    /// dispatch tagged `n` may be followed by replies tagged `n + 1`, `n + 2`...
    pub fn next(self) -> Self {
        Self((self.0 + 1) % CORRELATION_ID_SPACE)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for CorrelationId {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!(
                "correlation id {} out of range (max {})",
                value,
                CORRELATION_ID_SPACE - 1
            )
        })
    }
}

impl From<CorrelationId> for u16 {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}
