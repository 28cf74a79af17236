// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The request/reply capability the core needs from a message bus.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::{CommandEnvelope, Reply};
use crate::frame::FrameError;

/// Errors reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to the message bus")]
    NotConnected,

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("message bus closed")]
    Closed,
}

/// Send one command and wait for its reply.
///
/// Implementations must return `Ok(None)` once `timeout` elapses without a
/// reply, and must not block when disconnected.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the underlying link is currently up.
    fn is_connected(&self) -> bool;

    /// Publish `envelope` and wait up to `timeout` for the reply carrying its
    /// request id.
    async fn send_and_wait(
        &self,
        envelope: &CommandEnvelope,
        timeout: Duration,
    ) -> Result<Option<Reply>, TransportError>;
}
