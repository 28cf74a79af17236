// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for bus publications.
//!
//! Each publication carries exactly one JSON document:
//! - commands topic: a serialized [`CommandEnvelope`]
//! - replies topic: a serialized [`Reply`]

use bytes::Bytes;
use thiserror::Error;

use crate::envelope::{CommandEnvelope, Reply};

/// Maximum frame size (1 MB). Key sequences and memory contexts are small.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("empty frame")]
    Empty,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode an envelope for publication on the commands topic.
pub fn encode_envelope(envelope: &CommandEnvelope) -> Result<Bytes, FrameError> {
    let payload = serde_json::to_vec(envelope)?;
    check_size(payload.len())?;
    Ok(Bytes::from(payload))
}

/// Encode a reply, as the console bridge does.
pub fn encode_reply(reply: &Reply) -> Result<Bytes, FrameError> {
    let payload = serde_json::to_vec(reply)?;
    check_size(payload.len())?;
    Ok(Bytes::from(payload))
}

/// Decode a reply received on the replies topic.
pub fn decode_reply(payload: &[u8]) -> Result<Reply, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::Empty);
    }
    check_size(payload.len())?;
    Ok(serde_json::from_slice(payload)?)
}

fn check_size(len: usize) -> Result<(), FrameError> {
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(len));
    }
    Ok(())
}
