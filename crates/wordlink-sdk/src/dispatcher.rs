// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sends a key sequence to the console and waits for the acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use wordlink_protocol::{CommandEnvelope, ExecutionOptions, KeySequence, Precondition, Reply, Transport};

use crate::channel::ChannelGuard;
use crate::exchange::{Exchange, exchange};
use crate::types::DispatchOutcome;

/// Error code reported when the device gives none.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

pub struct CommandDispatcher {
    transport: Arc<dyn Transport>,
    options: ExecutionOptions,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Send `sequence` guarded by `precondition` and wait up to `timeout`
    /// for the console bridge to acknowledge it.
    ///
    /// `label` names the operation in the request id and logs.
    #[instrument(skip_all, fields(label = label, actions = sequence.len(), timeout_ms = timeout.as_millis() as u64))]
    pub async fn dispatch(
        &self,
        _channel: &ChannelGuard,
        label: &str,
        sequence: KeySequence,
        precondition: Option<Precondition>,
        timeout: Duration,
    ) -> DispatchOutcome {
        if !self.transport.is_connected() {
            warn!("not connected, dispatch skipped");
            return DispatchOutcome::NotConnected;
        }

        let precondition_requested = precondition.is_some();
        debug!(transcript = %sequence.transcript(), "dispatching");
        let envelope =
            CommandEnvelope::execute_sequence(label, sequence, precondition, self.options);
        let request_id = envelope.request_id().to_string();

        let outcome = match exchange(&self.transport, envelope, timeout).await {
            Exchange::Reply(reply) => classify_reply(reply, precondition_requested),
            Exchange::NoReply | Exchange::Hung => DispatchOutcome::Timeout {
                request_id: request_id.clone(),
                timeout_ms: timeout.as_millis() as u64,
            },
            Exchange::NotConnected => DispatchOutcome::NotConnected,
            Exchange::Failed(message) => DispatchOutcome::Internal { message },
        };

        match &outcome {
            DispatchOutcome::Acknowledged { .. } => {
                info!(request_id = %request_id, "dispatch acknowledged")
            }
            other => warn!(
                request_id = %request_id,
                error_kind = ?other.error_kind(),
                message = %other.error_message().unwrap_or_default(),
                "dispatch not acknowledged"
            ),
        }
        outcome
    }
}

/// Classify a bridge reply to an execute command.
///
/// A reply without `instr_check_passed` counts as passed only when no
/// precondition was requested.
pub fn classify_reply(reply: Reply, precondition_requested: bool) -> DispatchOutcome {
    if reply.is_success() {
        let passed = reply.instr_check_passed.unwrap_or(!precondition_requested);
        if passed {
            DispatchOutcome::Acknowledged {
                request_id: reply.request_id,
                execution_time: reply.execution_time,
            }
        } else {
            DispatchOutcome::PreconditionFailed {
                request_id: reply.request_id,
                message: reply.message,
            }
        }
    } else {
        DispatchOutcome::DeviceError {
            request_id: reply.request_id,
            code: reply
                .error_code
                .unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
            message: reply
                .error_message
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}
