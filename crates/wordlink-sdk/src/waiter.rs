// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Waits for a correlated reply in the controller's shared memory.
//!
//! The bridge is asked to search the memory block for `[ <id>]:` and return
//! the characters that follow; the payload is then extracted with the marker
//! grammar and compared against the expected text.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use wordlink_protocol::{CommandEnvelope, CorrelationId, ExtractError, Transport, extract_payload, marker};

use crate::channel::ChannelGuard;
use crate::config::LinkConfig;
use crate::exchange::{Exchange, exchange};
use crate::types::{ErrorKind, WaitOutcome};

pub struct ResponseWaiter {
    transport: Arc<dyn Transport>,
    block_id: u32,
    context_length: usize,
    grace: Duration,
}

impl ResponseWaiter {
    pub fn new(transport: Arc<dyn Transport>, config: &LinkConfig) -> Self {
        Self {
            transport,
            block_id: config.block_id,
            context_length: config.context_length,
            grace: config.wait_grace(),
        }
    }

    /// Wait up to `timeout` for the reply tagged `id`.
    ///
    /// `timeout` is the device-side search timeout; the transport waits an
    /// extra grace period on top of it. Always returns an outcome.
    #[instrument(skip_all, fields(correlation_id = %id, expected = expected.unwrap_or(""), timeout_ms = timeout.as_millis() as u64))]
    pub async fn wait_for(
        &self,
        _channel: &ChannelGuard,
        id: CorrelationId,
        expected: Option<&str>,
        timeout: Duration,
    ) -> WaitOutcome {
        if !self.transport.is_connected() {
            warn!("not connected, wait skipped");
            return not_connected();
        }

        let search = marker(id);
        let envelope = CommandEnvelope::find_string(
            "WAIT_RESPONSE",
            self.block_id,
            search.as_str(),
            self.context_length,
            timeout.as_millis() as u64,
        );
        let transport_timeout = timeout + self.grace;

        let outcome = match exchange(&self.transport, envelope, transport_timeout).await {
            Exchange::Reply(reply) if !reply.is_success() => {
                let message = reply
                    .error_message
                    .or(reply.message)
                    .unwrap_or_else(|| "memory search failed".to_string());
                WaitOutcome::failed(ErrorKind::ServerError, false, message)
            }
            Exchange::Reply(reply) => match reply.first_context() {
                Some(context) => classify(context, expected),
                None => id_not_found(&search, timeout),
            },
            Exchange::NoReply | Exchange::Hung => id_not_found(&search, timeout),
            Exchange::NotConnected => not_connected(),
            Exchange::Failed(message) => {
                WaitOutcome::failed(ErrorKind::InternalError, false, message)
            }
        };

        if outcome.success {
            info!(response = %outcome.response_text, "correlated reply received");
        } else {
            warn!(
                error_kind = ?outcome.error_kind,
                id_found = outcome.id_found,
                response = %outcome.response_text,
                "correlated reply not satisfied"
            );
        }
        outcome
    }
}

/// Classify a context string returned for a found marker.
pub fn classify(context: &str, expected: Option<&str>) -> WaitOutcome {
    match extract_payload(context) {
        Ok(text) => {
            debug!(response = text, "payload extracted");
            WaitOutcome::found(text, context, expected)
        }
        Err(ExtractError::MissingSeparator) => WaitOutcome::failed(
            ErrorKind::InvalidFormat,
            true,
            "response context has no ':' separator",
        )
        .with_context(context),
        Err(ExtractError::MissingTerminator { partial }) => WaitOutcome::failed(
            ErrorKind::IncompleteResponse,
            true,
            "response not terminated with '#', controller may still be writing",
        )
        .with_context(context)
        .with_response_text(partial),
    }
}

fn id_not_found(search: &str, timeout: Duration) -> WaitOutcome {
    WaitOutcome::failed(
        ErrorKind::IdNotFound,
        false,
        format!(
            "marker {:?} not found within {}ms",
            search,
            timeout.as_millis()
        ),
    )
}

fn not_connected() -> WaitOutcome {
    WaitOutcome::failed(
        ErrorKind::NotConnected,
        false,
        "cannot reach the robot: message bus disconnected",
    )
}
