// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared-memory marker grammar.
//!
//! The controller writes each correlated reply as
//!
//! ```text
//! [ <id>]: <payload>#
//! ```
//!
//! The payload is everything after the first `:` up to the next `#`, with
//! surrounding whitespace trimmed. A missing `#` means the controller has not
//! finished writing yet.

use thiserror::Error;

use crate::ids::CorrelationId;

/// Terminates a payload.
pub const PAYLOAD_TERMINATOR: char = '#';
/// Separates the marker from its payload.
pub const PAYLOAD_SEPARATOR: char = ':';

/// Literal text searched for in shared memory.
pub fn marker(id: CorrelationId) -> String {
    format!("[ {}]:", id.get())
}

/// Failure modes of [`extract_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no ':' found in response context")]
    MissingSeparator,

    #[error("response not terminated with '#' (partial: {partial:?})")]
    MissingTerminator { partial: String },
}

/// Extract the payload between the first `:` and the following `#`.
pub fn extract_payload(context: &str) -> Result<&str, ExtractError> {
    let start = context
        .find(PAYLOAD_SEPARATOR)
        .ok_or(ExtractError::MissingSeparator)?
        + PAYLOAD_SEPARATOR.len_utf8();
    let rest = &context[start..];

    match rest.find(PAYLOAD_TERMINATOR) {
        Some(end) => Ok(rest[..end].trim()),
        None => Err(ExtractError::MissingTerminator {
            partial: rest.trim().to_string(),
        }),
    }
}
